//! Index configuration and durability levels
//!
//! Balances write performance against crash safety on the redo-log append
//! path.

use serde::{Deserialize, Serialize};

/// Durability level for redo-log appends.
///
/// Every successful mutation appends exactly one record; this setting decides
/// how far that record travels before the mutator returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurabilityLevel {
    /// Flush the write buffer to the OS after each record (default).
    ///
    /// A process crash loses at most the record being written; an OS crash
    /// may lose records still in the page cache.
    OsBuffered,

    /// Flush and `fdatasync` after each record.
    ///
    /// Slowest option; survives OS crashes and power loss.
    Synchronous,

    /// Leave records in the write buffer until it fills or the index closes.
    ///
    /// Fastest option; only suitable for tests and benchmarks.
    NoSync,
}

impl Default for DurabilityLevel {
    fn default() -> Self {
        DurabilityLevel::OsBuffered
    }
}

impl DurabilityLevel {
    /// Whether every append must reach the disk before returning.
    pub fn requires_immediate_sync(&self) -> bool {
        matches!(self, Self::Synchronous)
    }

    /// Whether appends may stay in the process write buffer.
    pub fn is_no_sync(&self) -> bool {
        matches!(self, Self::NoSync)
    }
}

/// Index configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Durability level for redo-log appends
    pub durability: DurabilityLevel,
}

impl IndexConfig {
    /// Configuration matching the default write path (flush to OS per record)
    pub fn for_general() -> Self {
        Self {
            durability: DurabilityLevel::OsBuffered,
        }
    }

    /// Configuration for crash-critical data (fsync per record)
    pub fn for_durable() -> Self {
        Self {
            durability: DurabilityLevel::Synchronous,
        }
    }

    /// Configuration for tests and benchmarks (no flushing)
    pub fn for_testing() -> Self {
        Self {
            durability: DurabilityLevel::NoSync,
        }
    }
}
