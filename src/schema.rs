//! Index schema: the catalog-facing description of what a column index holds
//!
//! The schema drives the factory in two ways: it selects the key-storage
//! layout (var-length, fixed blob, or fixed aligned) and the comparator
//! (lexicographic or numeric). See [`crate::SecondaryIndex::open`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Column value type, as declared by the catalog layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float32,
    Float64,
    /// Fixed-length byte string of the given width
    Binary(usize),
    /// Variable-length byte string
    VarBinary,
}

impl ColumnType {
    /// Fixed width in bytes, or `None` for variable-length columns.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            ColumnType::Uint8 | ColumnType::Int8 => Some(1),
            ColumnType::Uint16 | ColumnType::Int16 => Some(2),
            ColumnType::Uint32 | ColumnType::Int32 | ColumnType::Float32 => Some(4),
            ColumnType::Uint64 | ColumnType::Int64 | ColumnType::Float64 => Some(8),
            ColumnType::Binary(len) => Some(*len),
            ColumnType::VarBinary => None,
        }
    }

    /// Whether this is an arithmetic scalar type (numeric comparator territory).
    pub fn is_arithmetic(&self) -> bool {
        !matches!(self, ColumnType::Binary(_) | ColumnType::VarBinary)
    }
}

/// Schema for one secondary index: the indexed columns and the uniqueness
/// constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Indexed columns, in key order
    pub columns: Vec<ColumnType>,

    /// Reject rows whose key equals an already-indexed key
    pub unique: bool,
}

impl IndexSchema {
    /// Single-column schema.
    pub fn single(column: ColumnType, unique: bool) -> Self {
        Self {
            columns: vec![column],
            unique,
        }
    }

    /// Multi-column schema.
    pub fn multi(columns: Vec<ColumnType>, unique: bool) -> Self {
        Self { columns, unique }
    }

    /// Total fixed row length, or `None` if any column is variable-length.
    pub fn fixed_row_len(&self) -> Option<usize> {
        self.columns
            .iter()
            .map(|c| c.fixed_len())
            .sum::<Option<usize>>()
    }
}

/// Index files carry the `.trb` extension; append it unless already present.
pub(crate) fn fix_file_path(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == "trb" => path.to_path_buf(),
        _ => {
            let mut s = path.as_os_str().to_os_string();
            s.push(".trb");
            PathBuf::from(s)
        }
    }
}
