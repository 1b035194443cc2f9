//! Index and store iterators
//!
//! All four kinds hold a shared borrow of the index and a cursor. Index
//! iterators walk tree order through the threads; store iterators scan
//! physical slots and skip tombstones. None of them see a consistent view
//! across concurrent mutation — the single-writer contract of the index
//! applies to readers holding these as well.

use super::{RowId, SecondaryIndex};
use crate::tree::NIL;
use crate::Result;
use std::cmp::Ordering;

/// Outcome of a bound seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekResult {
    /// Positioned on a key equal to the query
    Exact,
    /// Positioned on the nearest key in walk direction (greater for the
    /// forward iterator, less for the backward one)
    Nearest,
}

/// In-order walk from smallest to largest key.
pub struct IndexIterForward<'a> {
    index: &'a SecondaryIndex,
    at: u32,
}

impl<'a> IndexIterForward<'a> {
    pub(crate) fn new(index: &'a SecondaryIndex) -> Self {
        IndexIterForward {
            index,
            at: index.storage.tree_root().most_left(),
        }
    }

    /// Back to the first key in order.
    pub fn reset(&mut self) {
        self.at = self.index.storage.tree_root().most_left();
    }

    /// Row and key under the cursor, advancing past them.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<(RowId, &'a [u8])> {
        if self.at == NIL {
            return None;
        }
        let id = self.at;
        let key = self.index.storage.key(id);
        self.at = self.index.storage.move_next(id);
        Some((id, key))
    }

    /// Position on the first entry whose key is `>= key` and consume it.
    pub fn seek_lower_bound(&mut self, key: &[u8]) -> Option<(RowId, &'a [u8], SeekResult)> {
        let found = self.index.storage.lower_bound(key, &self.index.cmp);
        if found == NIL {
            self.at = NIL;
            return None;
        }
        let found_key = self.index.storage.key(found);
        self.at = self.index.storage.move_next(found);
        let outcome = if self.index.cmp.compare(found_key, key) == Ordering::Equal {
            SeekResult::Exact
        } else {
            SeekResult::Nearest
        };
        Some((found, found_key, outcome))
    }

    /// Position on the first entry whose key is `> key` and consume it.
    pub fn seek_upper_bound(&mut self, key: &[u8]) -> Option<(RowId, &'a [u8])> {
        let found = self.index.storage.upper_bound(key, &self.index.cmp);
        if found == NIL {
            self.at = NIL;
            return None;
        }
        let found_key = self.index.storage.key(found);
        self.at = self.index.storage.move_next(found);
        Some((found, found_key))
    }
}

/// In-order walk from largest to smallest key.
pub struct IndexIterBackward<'a> {
    index: &'a SecondaryIndex,
    at: u32,
}

impl<'a> IndexIterBackward<'a> {
    pub(crate) fn new(index: &'a SecondaryIndex) -> Self {
        IndexIterBackward {
            index,
            at: index.storage.tree_root().most_right(),
        }
    }

    /// Back to the last key in order.
    pub fn reset(&mut self) {
        self.at = self.index.storage.tree_root().most_right();
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<(RowId, &'a [u8])> {
        if self.at == NIL {
            return None;
        }
        let id = self.at;
        let key = self.index.storage.key(id);
        self.at = self.index.storage.move_prev(id);
        Some((id, key))
    }

    /// Position on the last entry whose key is `<= key` and consume it.
    pub fn seek_lower_bound(&mut self, key: &[u8]) -> Option<(RowId, &'a [u8], SeekResult)> {
        let found = self.index.storage.reverse_lower_bound(key, &self.index.cmp);
        if found == NIL {
            self.at = NIL;
            return None;
        }
        let found_key = self.index.storage.key(found);
        self.at = self.index.storage.move_prev(found);
        let outcome = if self.index.cmp.compare(found_key, key) == Ordering::Equal {
            SeekResult::Exact
        } else {
            SeekResult::Nearest
        };
        Some((found, found_key, outcome))
    }

    /// Position on the last entry whose key is `< key` and consume it.
    pub fn seek_upper_bound(&mut self, key: &[u8]) -> Option<(RowId, &'a [u8])> {
        let found = self.index.storage.reverse_upper_bound(key, &self.index.cmp);
        if found == NIL {
            self.at = NIL;
            return None;
        }
        let found_key = self.index.storage.key(found);
        self.at = self.index.storage.move_prev(found);
        Some((found, found_key))
    }
}

/// Physical slot scan, ascending ids, tombstones skipped.
pub struct StoreIterForward<'a> {
    index: &'a SecondaryIndex,
    at: u32,
}

impl<'a> StoreIterForward<'a> {
    pub(crate) fn new(index: &'a SecondaryIndex) -> Self {
        StoreIterForward { index, at: 0 }
    }

    pub fn reset(&mut self) {
        self.at = 0;
    }

    pub fn next(&mut self) -> Option<(RowId, &'a [u8])> {
        let max = self.index.storage.max_index();
        while self.at < max {
            let id = self.at;
            self.at += 1;
            if self.index.storage.node(id).is_used() {
                return Some((id, self.index.storage.key(id)));
            }
        }
        None
    }

    /// Key at slot `id`, `None` when tombstoned, error when out of range.
    pub fn seek_exact(&self, id: RowId) -> Result<Option<&'a [u8]>> {
        seek_exact(self.index, id)
    }
}

/// Physical slot scan, descending ids, tombstones skipped.
pub struct StoreIterBackward<'a> {
    index: &'a SecondaryIndex,
    at: u32,
}

impl<'a> StoreIterBackward<'a> {
    pub(crate) fn new(index: &'a SecondaryIndex) -> Self {
        StoreIterBackward {
            index,
            at: index.storage.max_index(),
        }
    }

    pub fn reset(&mut self) {
        self.at = self.index.storage.max_index();
    }

    pub fn next(&mut self) -> Option<(RowId, &'a [u8])> {
        while self.at > 0 {
            self.at -= 1;
            let id = self.at;
            if self.index.storage.node(id).is_used() {
                return Some((id, self.index.storage.key(id)));
            }
        }
        None
    }

    /// Key at slot `id`, `None` when tombstoned, error when out of range.
    pub fn seek_exact(&self, id: RowId) -> Result<Option<&'a [u8]>> {
        seek_exact(self.index, id)
    }
}

fn seek_exact(index: &SecondaryIndex, id: RowId) -> Result<Option<&[u8]>> {
    let rows = index.storage.max_index();
    if id >= rows {
        return Err(crate::IndexError::IdOutOfRange {
            id: id as u64,
            rows: rows as u64,
        });
    }
    if index.storage.node(id).is_used() {
        Ok(Some(index.storage.key(id)))
    } else {
        Ok(None)
    }
}
