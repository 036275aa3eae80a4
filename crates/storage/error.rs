//! Storage-layer errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("blob I/O error: {0}")]
    BlobIo(#[from] std::io::Error),
    #[error("corrupt record in table {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    pub(crate) fn corrupt(table: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Corrupt {
            table,
            reason: err.to_string(),
        }
    }
}
