//! colidx — writable ordered secondary index for column stores
//!
//! A per-column index mapping keys to stable 32-bit row ids, built for
//! workloads that mutate in place and recover by log replay:
//!
//! - **Threaded red-black tree**: node slots are the row ids themselves,
//!   eight bytes each; unused child pointers double as in-order threads, so
//!   stepping to a neighbor is O(1) amortized with no parent pointers.
//! - **Three key layouts**: var-length keys in a mempool with duplicate
//!   aliasing, fixed-length keys in a parallel array, and word-aligned
//!   scalars inline next to their nodes. The schema picks one at open.
//! - **Redo log**: every mutation appends one record to a `.trb` file;
//!   opening the index replays the log and reconstructs the exact key→id
//!   multiset.
//!
//! ## Example
//!
//! ```no_run
//! use colidx::{ColumnType, IndexConfig, IndexSchema, SecondaryIndex};
//!
//! # fn main() -> colidx::Result<()> {
//! let schema = IndexSchema::single(ColumnType::VarBinary, false);
//! let mut index = SecondaryIndex::open("users.email", &schema, IndexConfig::default())?;
//! index.insert(b"ada@example.com", 7)?;
//! let mut ids = Vec::new();
//! index.search_exact_append(b"ada@example.com", &mut ids);
//! assert_eq!(ids, vec![7]);
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod config;
pub mod index;
pub mod schema;
pub mod store;
pub mod tree;

mod error;
mod varint;

pub use config::{DurabilityLevel, IndexConfig};
pub use error::{IndexError, Result};
pub use index::{
    AppendableStore, IndexIterBackward, IndexIterForward, ReadableIndex, ReadableStore, RowId,
    SecondaryIndex, SeekResult, StoreIterBackward, StoreIterForward, UpdatableStore,
    WritableIndex, WritableStore,
};
pub use schema::{ColumnType, IndexSchema};
pub use store::StorageKind;
pub use tree::MAX_ROW_ID;
