//! Key-storage backends
//!
//! Three layouts share one interface toward the tree and the index façade:
//!
//! - [`VarLenStore`]: per-slot `{node, offset}` with length-prefixed blobs
//!   in a 4-byte-aligned mempool; duplicate keys alias one blob.
//! - [`FixedBlobStore`]: node array plus a parallel contiguous key array at
//!   `id * key_len`.
//! - [`FixedAlignedStore`]: node and key interleaved per element in one
//!   byte array, for word-aligned scalar keys.
//!
//! The tree algorithms reach node slots and key bytes through [`TreeStore`];
//! the façade dispatches operations through [`KeyStorage`].

pub mod aligned;
pub mod fixed;
pub mod mempool;
pub mod varlen;

pub use aligned::FixedAlignedStore;
pub use fixed::FixedBlobStore;
pub use varlen::VarLenStore;

use crate::compare::KeyCompare;
use crate::tree::{self, Node, TreeRoot};

/// Node-slot and key access required by the tree algorithms.
pub(crate) trait TreeStore {
    fn tree_root(&self) -> &TreeRoot;
    fn tree_root_mut(&mut self) -> &mut TreeRoot;
    /// Node at `id`; the slot must exist (grown), used or tombstoned.
    fn node(&self, id: u32) -> Node;
    fn set_node(&mut self, id: u32, node: Node);
    /// Key bytes at `id`; only valid while the slot is used.
    fn key(&self, id: u32) -> &[u8];
}

/// Which layout the factory selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    VarLen,
    FixedBlob,
    FixedAligned,
}

/// The storage variant chosen at construction, dispatched through the value.
pub(crate) enum KeyStorage {
    VarLen(VarLenStore),
    FixedBlob(FixedBlobStore),
    FixedAligned(FixedAlignedStore),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            KeyStorage::VarLen($inner) => $body,
            KeyStorage::FixedBlob($inner) => $body,
            KeyStorage::FixedAligned($inner) => $body,
        }
    };
}

impl KeyStorage {
    pub fn kind(&self) -> StorageKind {
        match self {
            KeyStorage::VarLen(_) => StorageKind::VarLen,
            KeyStorage::FixedBlob(_) => StorageKind::FixedBlob,
            KeyStorage::FixedAligned(_) => StorageKind::FixedAligned,
        }
    }

    /// Store `key` at `id` enforcing uniqueness; `false` means another id
    /// already holds an equal key.
    pub fn store_check(&mut self, id: u32, key: &[u8], cmp: &KeyCompare) -> bool {
        dispatch!(self, s => s.store_check(id, key, cmp))
    }

    /// Store `key` at `id`, replacing whatever the slot held; duplicates
    /// are linked in descending-id order.
    pub fn store_cover(&mut self, id: u32, key: &[u8], cmp: &KeyCompare) {
        dispatch!(self, s => s.store_cover(id, key, cmp))
    }

    /// Unlink `id` and tombstone its slot. The slot must be used.
    pub fn remove(&mut self, id: u32, cmp: &KeyCompare) {
        dispatch!(self, s => s.remove(id, cmp))
    }

    pub fn node(&self, id: u32) -> Node {
        dispatch!(self, s => TreeStore::node(s, id))
    }

    pub fn key(&self, id: u32) -> &[u8] {
        dispatch!(self, s => TreeStore::key(s, id))
    }

    pub fn tree_root(&self) -> &TreeRoot {
        dispatch!(self, s => TreeStore::tree_root(s))
    }

    /// Live key count.
    pub fn key_count(&self) -> u32 {
        self.tree_root().count()
    }

    /// Logical bytes of stored keys (aliasing not deducted).
    pub fn total_length(&self) -> u64 {
        dispatch!(self, s => s.total_length())
    }

    /// One past the highest slot ever touched, tombstones included.
    pub fn max_index(&self) -> u32 {
        dispatch!(self, s => s.max_index())
    }

    /// Physical bytes held by the slot arrays and key storage.
    pub fn memory_size(&self) -> u64 {
        dispatch!(self, s => s.memory_size())
    }

    pub fn clear(&mut self) {
        dispatch!(self, s => s.clear())
    }

    pub fn shrink_to_fit(&mut self) {
        dispatch!(self, s => s.shrink_to_fit())
    }

    pub fn move_next(&self, id: u32) -> u32 {
        dispatch!(self, s => tree::move_next(s, id))
    }

    pub fn move_prev(&self, id: u32) -> u32 {
        dispatch!(self, s => tree::move_prev(s, id))
    }

    pub fn lower_bound(&self, key: &[u8], cmp: &KeyCompare) -> u32 {
        dispatch!(self, s => tree::lower_bound(s, key, cmp))
    }

    pub fn upper_bound(&self, key: &[u8], cmp: &KeyCompare) -> u32 {
        dispatch!(self, s => tree::upper_bound(s, key, cmp))
    }

    pub fn reverse_lower_bound(&self, key: &[u8], cmp: &KeyCompare) -> u32 {
        dispatch!(self, s => tree::reverse_lower_bound(s, key, cmp))
    }

    pub fn reverse_upper_bound(&self, key: &[u8], cmp: &KeyCompare) -> u32 {
        dispatch!(self, s => tree::reverse_upper_bound(s, key, cmp))
    }

    pub fn equal_range(&self, key: &[u8], cmp: &KeyCompare) -> (u32, u32) {
        dispatch!(self, s => tree::equal_range(s, key, cmp))
    }
}
