//! The writable ordered secondary index
//!
//! One [`SecondaryIndex`] covers one indexed column set: an in-memory
//! threaded red-black tree over stable row ids, keys held in the layout the
//! schema selects, and an append-only redo log that rebuilds the whole
//! state on open.
//!
//! ## Write path and crash window
//!
//! Every mutator updates memory first and appends one log record second. A
//! crash between the two loses that single mutation; replay then yields the
//! state as of the previous record, and the torn tail (if any) is truncated
//! on the next open. A *failed* log append leaves memory ahead of the log:
//! treat any `Err` from a mutator as "index dirty, reopen before trusting
//! it".
//!
//! ## Concurrency
//!
//! Single writer, no internal locking. Readers (including live iterators)
//! must not overlap a mutator; wrap the index with [`SecondaryIndex::into_shared`]
//! when multiple parties touch it.

mod iter;
mod redo;

pub use iter::{
    IndexIterBackward, IndexIterForward, SeekResult, StoreIterBackward, StoreIterForward,
};

use crate::compare::{KeyCompare, NumericType};
use crate::config::IndexConfig;
use crate::schema::{fix_file_path, ColumnType, IndexSchema};
use crate::store::{
    FixedAlignedStore, FixedBlobStore, KeyStorage, StorageKind, VarLenStore,
};
use crate::tree::MAX_ROW_ID;
use crate::{IndexError, Result};
use parking_lot::RwLock;
use redo::RedoLog;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable 32-bit row identifier; doubles as the tree node handle.
pub type RowId = u32;

pub struct SecondaryIndex {
    storage: KeyStorage,
    cmp: KeyCompare,
    unique: bool,
    fixed_len: Option<usize>,
    log: RedoLog,
    path: PathBuf,
}

fn numeric_type_of(column: ColumnType) -> Option<NumericType> {
    match column {
        ColumnType::Uint8 => Some(NumericType::Uint8),
        ColumnType::Int8 => Some(NumericType::Int8),
        ColumnType::Uint16 => Some(NumericType::Uint16),
        ColumnType::Int16 => Some(NumericType::Int16),
        ColumnType::Uint32 => Some(NumericType::Uint32),
        ColumnType::Int32 => Some(NumericType::Int32),
        ColumnType::Uint64 => Some(NumericType::Uint64),
        ColumnType::Int64 => Some(NumericType::Int64),
        ColumnType::Float32 => Some(NumericType::Float32),
        ColumnType::Float64 => Some(NumericType::Float64),
        ColumnType::Binary(_) | ColumnType::VarBinary => None,
    }
}

impl SecondaryIndex {
    /// Open (or create) the index backing file and rebuild state from it.
    ///
    /// Layout selection: a single arithmetic column compares numerically
    /// and stores inline when its width is word-aligned; any fixed total
    /// row length stores in the parallel-array layout; everything else goes
    /// through the var-length mempool. The file is `<path>` if it already
    /// ends in `.trb`, `<path>.trb` otherwise.
    pub fn open(path: impl AsRef<Path>, schema: &IndexSchema, config: IndexConfig) -> Result<Self> {
        if schema.columns.is_empty() {
            return Err(IndexError::InvalidData("index schema has no columns".into()));
        }

        let (mut storage, cmp, fixed_len) = match schema.columns.as_slice() {
            [single] if single.is_arithmetic() => {
                let numeric = numeric_type_of(*single).unwrap();
                let width = numeric.width();
                let storage = if width % 4 == 0 {
                    KeyStorage::FixedAligned(FixedAlignedStore::new(width))
                } else {
                    KeyStorage::FixedBlob(FixedBlobStore::new(width))
                };
                (storage, KeyCompare::Numeric(numeric), Some(width))
            }
            _ => match schema.fixed_row_len() {
                Some(len) if len > 0 => (
                    KeyStorage::FixedBlob(FixedBlobStore::new(len)),
                    KeyCompare::Lexicographic,
                    Some(len),
                ),
                _ => (
                    KeyStorage::VarLen(VarLenStore::new()),
                    KeyCompare::Lexicographic,
                    None,
                ),
            },
        };

        let path = fix_file_path(path.as_ref());
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let good = redo::replay(&mut file, &mut storage, &cmp, fixed_len)?;
        let file_len = file.metadata()?.len();
        if good < file_len {
            eprintln!(
                "index open: dropping torn log tail of {} bytes in {}",
                file_len - good,
                path.display()
            );
            file.set_len(good)?;
        }
        file.seek(SeekFrom::Start(good))?;

        Ok(SecondaryIndex {
            storage,
            cmp,
            unique: schema.unique,
            fixed_len,
            log: RedoLog::new(file, config.durability),
            path,
        })
    }

    /// Insert `key` at `id`. On a unique index an equal key under another
    /// id rejects the insert with `Ok(false)` and writes nothing.
    pub fn insert(&mut self, key: &[u8], id: RowId) -> Result<bool> {
        self.check_id(id)?;
        self.check_key(key)?;
        if self.unique {
            if !self.storage.store_check(id, key, &self.cmp) {
                return Ok(false);
            }
        } else {
            self.storage.store_cover(id, key, &self.cmp);
        }
        self.log.append_insert(id, key)?;
        Ok(true)
    }

    /// Remove the entry at `id`, which must currently hold `key`.
    pub fn remove(&mut self, key: &[u8], id: RowId) -> Result<()> {
        self.check_id(id)?;
        self.check_used(id)?;
        debug_assert_eq!(self.storage.key(id), key, "removed key mismatch");
        self.storage.remove(id, &self.cmp);
        self.log.append_remove(id)
    }

    /// Move the entry for `key` from `old_id` to `new_id`.
    pub fn replace(&mut self, key: &[u8], old_id: RowId, new_id: RowId) -> Result<()> {
        self.check_id(old_id)?;
        self.check_id(new_id)?;
        self.check_used(old_id)?;
        debug_assert_eq!(self.storage.key(old_id), key, "replaced key mismatch");
        self.storage.store_cover(new_id, key, &self.cmp);
        self.storage.remove(old_id, &self.cmp);
        self.log.append_replace(new_id, old_id)
    }

    /// Store `row` under a freshly allocated id (`num_data_rows`) and
    /// return it.
    pub fn append(&mut self, row: &[u8]) -> Result<RowId> {
        let id = self.storage.max_index();
        if id > MAX_ROW_ID {
            return Err(IndexError::ResourceExhausted(format!(
                "row id space exhausted at {}",
                id
            )));
        }
        self.check_key(row)?;
        if self.unique {
            let fresh = self.storage.store_check(id, row, &self.cmp);
            debug_assert!(fresh, "append of duplicate key on unique index");
        } else {
            self.storage.store_cover(id, row, &self.cmp);
        }
        self.log.append_insert(id, row)?;
        Ok(id)
    }

    /// Re-key slot `id` to `row`. Unlike [`SecondaryIndex::insert`], a
    /// unique index accepts the write (the caller asserts no conflict).
    pub fn update(&mut self, id: RowId, row: &[u8]) -> Result<()> {
        self.check_id(id)?;
        self.check_key(row)?;
        if self.unique {
            let fresh = self.storage.store_check(id, row, &self.cmp);
            debug_assert!(fresh, "update to a key held by another row");
        } else {
            self.storage.store_cover(id, row, &self.cmp);
        }
        self.log.append_insert(id, row)
    }

    /// Remove the entry at `id` without naming its key.
    pub fn remove_row(&mut self, id: RowId) -> Result<()> {
        self.check_id(id)?;
        self.check_used(id)?;
        self.storage.remove(id, &self.cmp);
        self.log.append_remove(id)
    }

    /// Append every id whose key equals `key`, in tree order (descending
    /// id within the run).
    pub fn search_exact_append(&self, key: &[u8], out: &mut Vec<RowId>) {
        let (mut lower, upper) = self.storage.equal_range(key, &self.cmp);
        while lower != upper {
            out.push(lower);
            lower = self.storage.move_next(lower);
        }
    }

    /// Append the key bytes stored at `id`. The slot must be used.
    pub fn get_value_append(&self, id: RowId, out: &mut Vec<u8>) {
        debug_assert!(id < self.storage.max_index());
        out.extend_from_slice(self.storage.key(id));
    }

    /// Slot capacity including tombstones; the next id `append` would use.
    pub fn num_data_rows(&self) -> u64 {
        self.storage.max_index() as u64
    }

    /// Logical bytes of all stored keys (aliasing not deducted).
    pub fn data_inflate_size(&self) -> u64 {
        self.storage.total_length()
    }

    /// Physical bytes held by key storage and slot arrays.
    pub fn data_storage_size(&self) -> u64 {
        self.storage.memory_size()
    }

    /// Physical bytes of the index structure; same backing as
    /// [`SecondaryIndex::data_storage_size`] since keys are the index.
    pub fn index_storage_size(&self) -> u64 {
        self.storage.memory_size()
    }

    /// Live key count.
    pub fn key_count(&self) -> u32 {
        self.storage.key_count()
    }

    pub fn is_empty(&self) -> bool {
        self.key_count() == 0
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Layout the factory selected for this schema.
    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// Path of the backing log file.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Release slack capacity in the slot arrays and key storage.
    pub fn shrink_to_fit(&mut self) {
        self.storage.shrink_to_fit();
    }

    /// Drop all in-memory state. The log keeps its records: reopening
    /// replays them, so pair this with [`SecondaryIndex::truncate_log`]
    /// when the reset should survive a restart.
    pub fn clear(&mut self) {
        self.storage.clear();
    }

    /// Drop all in-memory state and every log record.
    pub fn truncate_log(&mut self) -> Result<()> {
        self.storage.clear();
        self.log.truncate()
    }

    pub fn iter_forward(&self) -> IndexIterForward<'_> {
        IndexIterForward::new(self)
    }

    pub fn iter_backward(&self) -> IndexIterBackward<'_> {
        IndexIterBackward::new(self)
    }

    pub fn store_iter_forward(&self) -> StoreIterForward<'_> {
        StoreIterForward::new(self)
    }

    pub fn store_iter_backward(&self) -> StoreIterBackward<'_> {
        StoreIterBackward::new(self)
    }

    /// Wrap for shared access; all callers then serialize through the lock.
    pub fn into_shared(self) -> Arc<RwLock<SecondaryIndex>> {
        Arc::new(RwLock::new(self))
    }

    fn check_id(&self, id: RowId) -> Result<()> {
        if id > MAX_ROW_ID {
            return Err(IndexError::InvalidData(format!(
                "row id {} beyond maximum {}",
                id, MAX_ROW_ID
            )));
        }
        Ok(())
    }

    fn check_used(&self, id: RowId) -> Result<()> {
        if id >= self.storage.max_index() || self.storage.node(id).is_empty() {
            return Err(IndexError::InvalidData(format!(
                "row id {} holds no entry",
                id
            )));
        }
        Ok(())
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if let Some(expect) = self.fixed_len {
            if key.len() != expect {
                return Err(IndexError::InvalidData(format!(
                    "key of {} bytes where schema fixes {}",
                    key.len(),
                    expect
                )));
            }
        }
        Ok(())
    }
}

/// Ordered read access: equal-range lookups and in-order iteration.
pub trait ReadableIndex {
    fn search_exact_append(&self, key: &[u8], out: &mut Vec<RowId>);
    fn iter_forward(&self) -> IndexIterForward<'_>;
    fn iter_backward(&self) -> IndexIterBackward<'_>;
    fn index_storage_size(&self) -> u64;
}

/// Keyed mutation.
pub trait WritableIndex {
    fn insert(&mut self, key: &[u8], id: RowId) -> Result<bool>;
    fn remove(&mut self, key: &[u8], id: RowId) -> Result<()>;
    fn replace(&mut self, key: &[u8], old_id: RowId, new_id: RowId) -> Result<()>;
    fn clear(&mut self);
}

/// Row-store read access by physical slot.
pub trait ReadableStore {
    fn get_value_append(&self, id: RowId, out: &mut Vec<u8>);
    fn num_data_rows(&self) -> u64;
    fn data_inflate_size(&self) -> u64;
    fn data_storage_size(&self) -> u64;
    fn store_iter_forward(&self) -> StoreIterForward<'_>;
    fn store_iter_backward(&self) -> StoreIterBackward<'_>;
}

/// Row allocation at the tail of the id space.
pub trait AppendableStore {
    fn append(&mut self, row: &[u8]) -> Result<RowId>;
}

/// In-place row re-keying.
pub trait UpdatableStore {
    fn update(&mut self, id: RowId, row: &[u8]) -> Result<()>;
}

/// Row removal by slot.
pub trait WritableStore {
    fn remove_row(&mut self, id: RowId) -> Result<()>;
}

impl ReadableIndex for SecondaryIndex {
    fn search_exact_append(&self, key: &[u8], out: &mut Vec<RowId>) {
        SecondaryIndex::search_exact_append(self, key, out)
    }
    fn iter_forward(&self) -> IndexIterForward<'_> {
        SecondaryIndex::iter_forward(self)
    }
    fn iter_backward(&self) -> IndexIterBackward<'_> {
        SecondaryIndex::iter_backward(self)
    }
    fn index_storage_size(&self) -> u64 {
        SecondaryIndex::index_storage_size(self)
    }
}

impl WritableIndex for SecondaryIndex {
    fn insert(&mut self, key: &[u8], id: RowId) -> Result<bool> {
        SecondaryIndex::insert(self, key, id)
    }
    fn remove(&mut self, key: &[u8], id: RowId) -> Result<()> {
        SecondaryIndex::remove(self, key, id)
    }
    fn replace(&mut self, key: &[u8], old_id: RowId, new_id: RowId) -> Result<()> {
        SecondaryIndex::replace(self, key, old_id, new_id)
    }
    fn clear(&mut self) {
        SecondaryIndex::clear(self)
    }
}

impl ReadableStore for SecondaryIndex {
    fn get_value_append(&self, id: RowId, out: &mut Vec<u8>) {
        SecondaryIndex::get_value_append(self, id, out)
    }
    fn num_data_rows(&self) -> u64 {
        SecondaryIndex::num_data_rows(self)
    }
    fn data_inflate_size(&self) -> u64 {
        SecondaryIndex::data_inflate_size(self)
    }
    fn data_storage_size(&self) -> u64 {
        SecondaryIndex::data_storage_size(self)
    }
    fn store_iter_forward(&self) -> StoreIterForward<'_> {
        SecondaryIndex::store_iter_forward(self)
    }
    fn store_iter_backward(&self) -> StoreIterBackward<'_> {
        SecondaryIndex::store_iter_backward(self)
    }
}

impl AppendableStore for SecondaryIndex {
    fn append(&mut self, row: &[u8]) -> Result<RowId> {
        SecondaryIndex::append(self, row)
    }
}

impl UpdatableStore for SecondaryIndex {
    fn update(&mut self, id: RowId, row: &[u8]) -> Result<()> {
        SecondaryIndex::update(self, id, row)
    }
}

impl WritableStore for SecondaryIndex {
    fn remove_row(&mut self, id: RowId) -> Result<()> {
        SecondaryIndex::remove_row(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn var_index(dir: &TempDir, name: &str, unique: bool) -> SecondaryIndex {
        let schema = IndexSchema::single(ColumnType::VarBinary, unique);
        SecondaryIndex::open(dir.path().join(name), &schema, IndexConfig::default()).unwrap()
    }

    fn collect_forward(index: &SecondaryIndex) -> Vec<(RowId, Vec<u8>)> {
        let mut iter = index.iter_forward();
        let mut out = Vec::new();
        while let Some((id, key)) = iter.next() {
            out.push((id, key.to_vec()));
        }
        out
    }

    fn collect_backward(index: &SecondaryIndex) -> Vec<(RowId, Vec<u8>)> {
        let mut iter = index.iter_backward();
        let mut out = Vec::new();
        while let Some((id, key)) = iter.next() {
            out.push((id, key.to_vec()));
        }
        out
    }

    fn search(index: &SecondaryIndex, key: &[u8]) -> Vec<RowId> {
        let mut ids = Vec::new();
        index.search_exact_append(key, &mut ids);
        ids
    }

    fn live_blob_bytes(index: &SecondaryIndex) -> usize {
        match &index.storage {
            KeyStorage::VarLen(s) => s.live_blob_bytes(),
            _ => panic!("not a var-length index"),
        }
    }

    #[test]
    fn test_unique_insert_and_lookup() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "fruit", true);
        assert!(index.insert(b"banana", 5).unwrap());
        assert!(index.insert(b"apple", 3).unwrap());
        assert!(index.insert(b"cherry", 9).unwrap());

        assert_eq!(
            collect_forward(&index),
            vec![
                (3, b"apple".to_vec()),
                (5, b"banana".to_vec()),
                (9, b"cherry".to_vec())
            ]
        );
        assert_eq!(search(&index, b"banana"), vec![5]);
        assert_eq!(index.key_count(), 3);
        assert_eq!(index.num_data_rows(), 10);
        assert_eq!(index.data_inflate_size(), 17);
    }

    #[test]
    fn test_duplicate_rejection_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        {
            let mut index = var_index(&dir, "fruit", true);
            index.insert(b"banana", 5).unwrap();
            index.insert(b"apple", 3).unwrap();
            index.insert(b"cherry", 9).unwrap();
            assert!(!index.insert(b"apple", 7).unwrap());
            assert_eq!(
                collect_forward(&index),
                vec![
                    (3, b"apple".to_vec()),
                    (5, b"banana".to_vec()),
                    (9, b"cherry".to_vec())
                ]
            );
        }
        // The rejected insert never reached the log either.
        let index = var_index(&dir, "fruit", true);
        assert_eq!(index.key_count(), 3);
        assert_eq!(search(&index, b"apple"), vec![3]);
    }

    #[test]
    fn test_multi_aliasing_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "tags", false);
        index.insert(b"x", 1).unwrap();
        index.insert(b"x", 2).unwrap();
        index.insert(b"x", 3).unwrap();
        assert_eq!(search(&index, b"x"), vec![3, 2, 1]);
        assert_eq!(live_blob_bytes(&index), 4);

        index.remove(b"x", 2).unwrap();
        assert_eq!(search(&index, b"x"), vec![3, 1]);
        assert_eq!(live_blob_bytes(&index), 4);

        index.remove(b"x", 1).unwrap();
        index.remove(b"x", 3).unwrap();
        assert_eq!(search(&index, b"x"), Vec::<RowId>::new());
        assert_eq!(live_blob_bytes(&index), 0);
    }

    #[test]
    fn test_thousand_duplicates_share_one_blob() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "bulk", false);
        for id in 0..1000 {
            index.insert(b"dup", id).unwrap();
        }
        let expect: Vec<RowId> = (0..1000).rev().collect();
        assert_eq!(search(&index, b"dup"), expect);
        let forward: Vec<RowId> = collect_forward(&index).into_iter().map(|(id, _)| id).collect();
        assert_eq!(forward, expect);
        // One chunk of align4(varint(3) + 3) bytes backs the whole run.
        assert_eq!(live_blob_bytes(&index), 4);
        assert_eq!(index.data_inflate_size(), 3000);
    }

    #[test]
    fn test_replace() {
        let dir = TempDir::new().unwrap();
        {
            let mut index = var_index(&dir, "move", false);
            index.insert(b"a", 1).unwrap();
            index.insert(b"b", 2).unwrap();
            index.replace(b"a", 1, 10).unwrap();
            assert_eq!(
                collect_forward(&index),
                vec![(10, b"a".to_vec()), (2, b"b".to_vec())]
            );
        }
        // Final record on disk is the replace pair.
        let bytes = std::fs::read(dir.path().join("move.trb")).unwrap();
        let tail = &bytes[bytes.len() - 8..];
        assert_eq!(tail[..4], (10u32 | 0x4000_0000).to_le_bytes());
        assert_eq!(tail[4..], 1u32.to_le_bytes());

        let index = var_index(&dir, "move", false);
        assert_eq!(
            collect_forward(&index),
            vec![(10, b"a".to_vec()), (2, b"b".to_vec())]
        );
    }

    #[test]
    fn test_numeric_float64_order() {
        let dir = TempDir::new().unwrap();
        let schema = IndexSchema::single(ColumnType::Float64, false);
        let mut index =
            SecondaryIndex::open(dir.path().join("f64"), &schema, IndexConfig::default()).unwrap();
        assert_eq!(index.storage_kind(), StorageKind::FixedAligned);

        index.insert(&1.5f64.to_ne_bytes(), 0).unwrap();
        index.insert(&(-3.0f64).to_ne_bytes(), 1).unwrap();
        index.insert(&2.25f64.to_ne_bytes(), 2).unwrap();
        let ids: Vec<RowId> = collect_forward(&index).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
    }

    #[test]
    fn test_reopen_round_trip() {
        let dir = TempDir::new().unwrap();
        {
            let mut index = var_index(&dir, "mixed", false);
            index.insert(b"banana", 5).unwrap();
            index.insert(b"apple", 3).unwrap();
            index.insert(b"cherry", 9).unwrap();
            index.insert(b"apple", 7).unwrap();
            index.replace(b"cherry", 9, 12).unwrap();
            index.remove(b"banana", 5).unwrap();
        }
        let index = var_index(&dir, "mixed", false);
        assert_eq!(
            collect_forward(&index),
            vec![
                (7, b"apple".to_vec()),
                (3, b"apple".to_vec()),
                (12, b"cherry".to_vec())
            ]
        );
        assert_eq!(search(&index, b"apple"), vec![7, 3]);
        assert_eq!(search(&index, b"banana"), Vec::<RowId>::new());
        assert_eq!(index.num_data_rows(), 13);
    }

    #[test]
    fn test_append_allocates_tail_ids() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "append", false);
        assert_eq!(index.append(b"one").unwrap(), 0);
        assert_eq!(index.append(b"two").unwrap(), 1);
        index.remove_row(1).unwrap();
        // Tombstones are re-usable by id, but append always takes the tail.
        assert_eq!(index.append(b"three").unwrap(), 2);
        assert_eq!(index.num_data_rows(), 3);
        assert_eq!(index.key_count(), 2);
    }

    #[test]
    fn test_update_rekeys_in_place() {
        let dir = TempDir::new().unwrap();
        {
            let mut index = var_index(&dir, "upd", true);
            index.insert(b"old", 4).unwrap();
            index.update(4, b"new").unwrap();
            // Updating to the key the row already holds is a no-op success.
            index.update(4, b"new").unwrap();
            assert_eq!(collect_forward(&index), vec![(4, b"new".to_vec())]);
        }
        let index = var_index(&dir, "upd", true);
        assert_eq!(collect_forward(&index), vec![(4, b"new".to_vec())]);
    }

    #[test]
    fn test_get_value_append() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "val", false);
        index.insert(b"payload", 2).unwrap();
        let mut out = b"prefix:".to_vec();
        index.get_value_append(2, &mut out);
        assert_eq!(out, b"prefix:payload");
    }

    #[test]
    fn test_empty_key() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "empty", false);
        index.insert(b"", 0).unwrap();
        index.insert(b"a", 1).unwrap();
        assert_eq!(search(&index, b""), vec![0]);
        assert_eq!(
            collect_forward(&index),
            vec![(0, b"".to_vec()), (1, b"a".to_vec())]
        );
    }

    #[test]
    fn test_factory_selection() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::default;

        let byte = IndexSchema::single(ColumnType::Uint8, false);
        let index = SecondaryIndex::open(dir.path().join("u8"), &byte, config()).unwrap();
        // One-byte scalars cannot satisfy the aligned layout's stride rule.
        assert_eq!(index.storage_kind(), StorageKind::FixedBlob);

        let word = IndexSchema::single(ColumnType::Int32, false);
        let index = SecondaryIndex::open(dir.path().join("i32"), &word, config()).unwrap();
        assert_eq!(index.storage_kind(), StorageKind::FixedAligned);

        let pair = IndexSchema::multi(vec![ColumnType::Uint32, ColumnType::Binary(4)], false);
        let index = SecondaryIndex::open(dir.path().join("pair"), &pair, config()).unwrap();
        assert_eq!(index.storage_kind(), StorageKind::FixedBlob);

        let var = IndexSchema::multi(vec![ColumnType::Uint32, ColumnType::VarBinary], false);
        let index = SecondaryIndex::open(dir.path().join("var"), &var, config()).unwrap();
        assert_eq!(index.storage_kind(), StorageKind::VarLen);

        assert!(index.file_path().to_string_lossy().ends_with(".trb"));
    }

    #[test]
    fn test_fixed_length_key_validation() {
        let dir = TempDir::new().unwrap();
        let schema = IndexSchema::multi(vec![ColumnType::Uint32, ColumnType::Binary(4)], false);
        let mut index =
            SecondaryIndex::open(dir.path().join("fixed"), &schema, IndexConfig::default())
                .unwrap();
        assert!(matches!(
            index.insert(b"short", 0),
            Err(IndexError::InvalidData(_))
        ));
        assert!(index.insert(b"12345678", 0).unwrap());
    }

    #[test]
    fn test_precondition_errors() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "pre", false);
        index.insert(b"k", 1).unwrap();
        assert!(matches!(
            index.remove_row(5),
            Err(IndexError::InvalidData(_))
        ));
        assert!(matches!(
            index.insert(b"k", MAX_ROW_ID + 1),
            Err(IndexError::InvalidData(_))
        ));
        assert!(matches!(
            index.replace(b"k", 9, 10),
            Err(IndexError::InvalidData(_))
        ));
    }

    #[test]
    fn test_clear_keeps_log() {
        let dir = TempDir::new().unwrap();
        {
            let mut index = var_index(&dir, "clr", false);
            index.insert(b"kept", 0).unwrap();
            index.clear();
            assert!(index.is_empty());
            assert_eq!(index.num_data_rows(), 0);
        }
        // The records survive the in-memory reset and replay on reopen.
        let index = var_index(&dir, "clr", false);
        assert_eq!(collect_forward(&index), vec![(0, b"kept".to_vec())]);
    }

    #[test]
    fn test_truncate_log_resets_everything() {
        let dir = TempDir::new().unwrap();
        {
            let mut index = var_index(&dir, "trunc", false);
            index.insert(b"gone", 0).unwrap();
            index.truncate_log().unwrap();
            assert!(index.is_empty());
            index.insert(b"fresh", 1).unwrap();
        }
        let index = var_index(&dir, "trunc", false);
        assert_eq!(collect_forward(&index), vec![(1, b"fresh".to_vec())]);
    }

    #[test]
    fn test_torn_tail_is_dropped_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let mut index = var_index(&dir, "torn", false);
            index.insert(b"whole", 0).unwrap();
        }
        let path = dir.path().join("torn.trb");
        let whole_len = std::fs::metadata(&path).unwrap().len();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend(7u32.to_le_bytes());
        bytes.push(200);
        std::fs::write(&path, &bytes).unwrap();

        let index = var_index(&dir, "torn", false);
        assert_eq!(collect_forward(&index), vec![(0, b"whole".to_vec())]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), whole_len);
    }

    #[test]
    fn test_corrupt_log_aborts_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.trb");
        std::fs::write(&path, 0xF000_0001u32.to_le_bytes()).unwrap();
        let schema = IndexSchema::single(ColumnType::VarBinary, false);
        assert!(matches!(
            SecondaryIndex::open(&path, &schema, IndexConfig::default()),
            Err(IndexError::Corruption(_))
        ));
    }

    #[test]
    fn test_forward_seeks() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "seekf", false);
        for (key, id) in [("b", 1u32), ("b", 2), ("d", 3), ("f", 4)] {
            index.insert(key.as_bytes(), id).unwrap();
        }
        let mut iter = index.iter_forward();

        let (id, key, outcome) = iter.seek_lower_bound(b"b").unwrap();
        assert_eq!((id, key, outcome), (2, &b"b"[..], SeekResult::Exact));
        assert_eq!(iter.next().unwrap().0, 1);

        let (id, _, outcome) = iter.seek_lower_bound(b"c").unwrap();
        assert_eq!((id, outcome), (3, SeekResult::Nearest));

        assert!(iter.seek_lower_bound(b"g").is_none());
        assert!(iter.next().is_none());

        let (id, key) = iter.seek_upper_bound(b"b").unwrap();
        assert_eq!((id, key), (3, &b"d"[..]));
        assert!(iter.seek_upper_bound(b"f").is_none());
    }

    #[test]
    fn test_backward_seeks_and_reset() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "seekb", false);
        for (key, id) in [("b", 1u32), ("d", 2), ("f", 3)] {
            index.insert(key.as_bytes(), id).unwrap();
        }
        assert_eq!(
            collect_backward(&index),
            vec![(3, b"f".to_vec()), (2, b"d".to_vec()), (1, b"b".to_vec())]
        );

        let mut iter = index.iter_backward();
        iter.next();
        iter.reset();
        // Reset lands on the largest key.
        assert_eq!(iter.next().unwrap(), (3, &b"f"[..]));

        let (id, _, outcome) = iter.seek_lower_bound(b"e").unwrap();
        assert_eq!((id, outcome), (2, SeekResult::Nearest));
        assert_eq!(iter.next().unwrap().0, 1);

        let (id, _, outcome) = iter.seek_lower_bound(b"d").unwrap();
        assert_eq!((id, outcome), (2, SeekResult::Exact));

        let (id, key) = iter.seek_upper_bound(b"d").unwrap();
        assert_eq!((id, key), (1, &b"b"[..]));
        assert!(iter.seek_upper_bound(b"b").is_none());
        assert!(iter.seek_lower_bound(b"a").is_none());
    }

    #[test]
    fn test_store_iterators() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "slots", false);
        index.insert(b"c", 0).unwrap();
        index.insert(b"a", 2).unwrap();
        index.insert(b"b", 4).unwrap();
        index.remove(b"a", 2).unwrap();

        let mut fwd = index.store_iter_forward();
        let mut seen = Vec::new();
        while let Some((id, key)) = fwd.next() {
            seen.push((id, key.to_vec()));
        }
        // Physical order, tombstones skipped.
        assert_eq!(seen, vec![(0, b"c".to_vec()), (4, b"b".to_vec())]);

        let mut bwd = index.store_iter_backward();
        let mut seen = Vec::new();
        while let Some((id, _)) = bwd.next() {
            seen.push(id);
        }
        assert_eq!(seen, vec![4, 0]);

        assert_eq!(fwd.seek_exact(0).unwrap(), Some(&b"c"[..]));
        assert_eq!(fwd.seek_exact(2).unwrap(), None);
        assert!(matches!(
            fwd.seek_exact(99),
            Err(IndexError::IdOutOfRange { id: 99, rows: 5 })
        ));
    }

    #[test]
    fn test_synchronous_durability_round_trip() {
        let dir = TempDir::new().unwrap();
        let schema = IndexSchema::single(ColumnType::Uint64, true);
        {
            let mut index =
                SecondaryIndex::open(dir.path().join("sync"), &schema, IndexConfig::for_durable())
                    .unwrap();
            for v in [30u64, 10, 20] {
                index.append(&v.to_ne_bytes()).unwrap();
            }
        }
        let index =
            SecondaryIndex::open(dir.path().join("sync"), &schema, IndexConfig::for_durable())
                .unwrap();
        let ids: Vec<RowId> = collect_forward(&index).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[test]
    fn test_shared_wrapper() {
        let dir = TempDir::new().unwrap();
        let index = var_index(&dir, "shared", false).into_shared();
        index.write().insert(b"k", 0).unwrap();
        assert_eq!(index.read().key_count(), 1);
    }

    #[test]
    fn test_stats_and_shrink() {
        let dir = TempDir::new().unwrap();
        let mut index = var_index(&dir, "stats", false);
        for id in 0..16 {
            index.insert(format!("key-{:02}", id).as_bytes(), id).unwrap();
        }
        assert!(index.num_data_rows() >= index.key_count() as u64);
        assert_eq!(index.data_inflate_size(), 16 * 6);
        assert!(index.data_storage_size() > 0);
        assert_eq!(index.index_storage_size(), index.data_storage_size());
        index.remove_row(3).unwrap();
        index.shrink_to_fit();
        assert_eq!(index.key_count(), 15);
        assert_eq!(index.num_data_rows(), 16);
    }
}
