//! Var-length key storage
//!
//! Each slot is `{node, offset}`; the offset points at a varint
//! length-prefixed blob in the mempool. Runs of equal keys share one blob:
//! when a freshly linked key equals an in-order neighbor, its own blob is
//! returned to the pool and the slot aliases the neighbor's offset. The
//! removal path frees a blob only when neither neighbor holds an equal key,
//! i.e. when the departing slot is the last member of its alias run.

use super::mempool::MemPool;
use super::TreeStore;
use crate::compare::KeyCompare;
use crate::tree::{self, Node, PathStack, TreeRoot, NIL};
use crate::varint;
use std::cmp::Ordering;

#[derive(Clone, Copy)]
struct Element {
    node: Node,
    offset: u32,
}

impl Element {
    const fn empty() -> Self {
        Element {
            node: Node::empty(),
            offset: u32::MAX,
        }
    }
}

pub struct VarLenStore {
    root: TreeRoot,
    index: Vec<Element>,
    data: MemPool,
    total: u64,
}

impl VarLenStore {
    pub fn new() -> Self {
        VarLenStore {
            root: TreeRoot::default(),
            index: Vec::new(),
            data: MemPool::with_capacity(256),
            total: 0,
        }
    }

    fn grow(&mut self, id: u32) {
        if id as usize >= self.index.len() {
            self.index.resize(id as usize + 1, Element::empty());
        }
    }

    /// Write a length-prefixed blob, returning its offset and chunk size.
    fn write_blob(&mut self, key: &[u8]) -> (u32, usize) {
        let mut len_buf = [0u8; varint::MAX_VARINT_LEN];
        let prefix = varint::encode_u32(key.len() as u32, &mut len_buf);
        let chunk = MemPool::align_to(prefix + key.len());
        let offset = self.data.alloc(chunk);
        self.data.write(offset, &len_buf[..prefix]);
        self.data.write(offset + prefix as u32, key);
        (offset, chunk)
    }

    /// Chunk size of the blob at `offset` (prefix plus key, aligned).
    fn chunk_len(&self, offset: u32) -> (usize, usize) {
        let blob = self.data.from_offset(offset);
        let (len, prefix) = varint::decode_u32(blob);
        (len as usize, MemPool::align_to(prefix + len as usize))
    }

    pub fn store_check(&mut self, id: u32, key: &[u8], cmp: &KeyCompare) -> bool {
        let mut stack = PathStack::new();
        let exists = tree::find_path_for_unique(&*self, &mut stack, key, cmp);
        if exists {
            return stack.top() == id;
        }
        self.grow(id);
        if self.index[id as usize].node.is_used() {
            self.remove(id, cmp);
            tree::find_path_for_unique(&*self, &mut stack, key, cmp);
        }
        debug_assert!(self.index[id as usize].node.is_empty());
        let (offset, _) = self.write_blob(key);
        self.index[id as usize].offset = offset;
        tree::insert(self, &stack, id);
        self.total += key.len() as u64;
        true
    }

    pub fn store_cover(&mut self, id: u32, key: &[u8], cmp: &KeyCompare) {
        self.grow(id);
        if self.index[id as usize].node.is_used() {
            self.remove(id, cmp);
        }
        let (offset, chunk) = self.write_blob(key);
        self.index[id as usize].offset = offset;
        let mut stack = PathStack::new();
        tree::find_path_for_multi(&*self, &mut stack, id, cmp);
        tree::insert(self, &stack, id);

        // A neighbor with an equal key means this id joined an alias run:
        // hand the fresh blob back and share the neighbor's.
        let mut alias = NIL;
        if id != self.root.most_left {
            let prev = tree::move_prev(&*self, id);
            if cmp.compare(TreeStore::key(self, prev), key) == Ordering::Equal {
                alias = prev;
            }
        }
        if alias == NIL && id != self.root.most_right {
            let next = tree::move_next(&*self, id);
            if cmp.compare(key, TreeStore::key(self, next)) == Ordering::Equal {
                alias = next;
            }
        }
        if alias != NIL {
            self.data.sfree(offset, chunk);
            self.index[id as usize].offset = self.index[alias as usize].offset;
        }
        self.total += key.len() as u64;
    }

    pub fn remove(&mut self, id: u32, cmp: &KeyCompare) {
        let mut stack = PathStack::new();
        let exists = tree::find_path_for_remove(&*self, &mut stack, id, cmp);
        debug_assert!(exists);
        let offset = self.index[id as usize].offset;
        let (len, chunk) = self.chunk_len(offset);

        // Free the blob only when both neighbors hold strictly different
        // keys; otherwise another member of the alias run still points at it.
        let isolated = (id == self.root.most_left || {
            let prev = tree::move_prev(&*self, id);
            cmp.compare(TreeStore::key(self, prev), TreeStore::key(self, id)) == Ordering::Less
        }) && (id == self.root.most_right || {
            let next = tree::move_next(&*self, id);
            cmp.compare(TreeStore::key(self, id), TreeStore::key(self, next)) == Ordering::Less
        });
        if isolated {
            self.data.sfree(offset, chunk);
        }
        tree::remove(self, &mut stack);
        self.total -= len as u64;
    }

    pub fn total_length(&self) -> u64 {
        self.total
    }

    pub fn max_index(&self) -> u32 {
        self.index.len() as u32
    }

    pub fn memory_size(&self) -> u64 {
        (std::mem::size_of::<Self>()
            + self.data.size()
            + self.index.len() * std::mem::size_of::<Element>()) as u64
    }

    /// Blob bytes currently allocated in the pool; alias runs count once.
    pub fn live_blob_bytes(&self) -> usize {
        self.data.live_bytes()
    }

    pub fn clear(&mut self) {
        self.root = TreeRoot::default();
        self.index.clear();
        self.data.clear();
        self.total = 0;
    }

    pub fn shrink_to_fit(&mut self) {
        self.index.shrink_to_fit();
        self.data.shrink_to_fit();
    }
}

impl TreeStore for VarLenStore {
    fn tree_root(&self) -> &TreeRoot {
        &self.root
    }

    fn tree_root_mut(&mut self) -> &mut TreeRoot {
        &mut self.root
    }

    fn node(&self, id: u32) -> Node {
        self.index[id as usize].node
    }

    fn set_node(&mut self, id: u32, node: Node) {
        self.index[id as usize].node = node;
    }

    fn key(&self, id: u32) -> &[u8] {
        let blob = self.data.from_offset(self.index[id as usize].offset);
        let (len, prefix) = varint::decode_u32(blob);
        &blob[prefix..prefix + len as usize]
    }
}
