//! Key comparators
//!
//! Two comparison modes share one enum, chosen at construction from the
//! schema and dispatched through the value: lexicographic byte order for
//! blob keys, native scalar order for single arithmetic columns.
//!
//! Slot-vs-slot comparisons (ids standing in for their stored keys) break
//! key ties by *higher id first*. Runs of duplicate keys therefore sit in
//! descending-id order in the tree, which is what the var-length aliasing
//! protocol relies on: the neighbor of a freshly linked duplicate is always
//! another member of its run.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Scalar type of a numeric key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericType {
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
}

impl NumericType {
    /// Width of the scalar in bytes.
    pub fn width(&self) -> usize {
        match self {
            NumericType::Uint8 | NumericType::Int8 => 1,
            NumericType::Uint16 | NumericType::Int16 => 2,
            NumericType::Uint32 | NumericType::Int32 | NumericType::Float32 => 4,
            NumericType::Uint64 | NumericType::Int64 | NumericType::Float64 => 8,
        }
    }
}

/// Key comparator: raw bytes in, three-way order out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCompare {
    /// Byte-wise lexicographic order over the full key
    Lexicographic,
    /// Native-endian scalar order
    Numeric(NumericType),
}

macro_rules! cmp_scalar {
    ($ty:ty, $a:expr, $b:expr) => {{
        debug_assert_eq!($a.len(), std::mem::size_of::<$ty>());
        debug_assert_eq!($b.len(), std::mem::size_of::<$ty>());
        let left = <$ty>::from_ne_bytes($a.try_into().unwrap());
        let right = <$ty>::from_ne_bytes($b.try_into().unwrap());
        left.partial_cmp(&right).unwrap_or(Ordering::Equal)
    }};
}

impl KeyCompare {
    /// Three-way comparison of two raw keys.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            KeyCompare::Lexicographic => a.cmp(b),
            KeyCompare::Numeric(NumericType::Uint8) => cmp_scalar!(u8, a, b),
            KeyCompare::Numeric(NumericType::Int8) => cmp_scalar!(i8, a, b),
            KeyCompare::Numeric(NumericType::Uint16) => cmp_scalar!(u16, a, b),
            KeyCompare::Numeric(NumericType::Int16) => cmp_scalar!(i16, a, b),
            KeyCompare::Numeric(NumericType::Uint32) => cmp_scalar!(u32, a, b),
            KeyCompare::Numeric(NumericType::Int32) => cmp_scalar!(i32, a, b),
            KeyCompare::Numeric(NumericType::Uint64) => cmp_scalar!(u64, a, b),
            KeyCompare::Numeric(NumericType::Int64) => cmp_scalar!(i64, a, b),
            KeyCompare::Numeric(NumericType::Float32) => cmp_scalar!(f32, a, b),
            KeyCompare::Numeric(NumericType::Float64) => cmp_scalar!(f64, a, b),
        }
    }

    /// Strict "orders before" over slots: key order first, then higher id
    /// first on equal keys.
    pub fn slot_less(&self, a_key: &[u8], a_id: u32, b_key: &[u8], b_id: u32) -> bool {
        match self.compare(a_key, b_key) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => a_id > b_id,
        }
    }
}
