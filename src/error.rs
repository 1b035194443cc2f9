//! Error types for the index engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data corruption: {0}")]
    Corruption(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Row id {id} out of range (rows = {rows})")]
    IdOutOfRange { id: u64, rows: u64 },
}
