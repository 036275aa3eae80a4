//! Core error taxonomy.
//!
//! Variants correspond to the stable wire error kinds; the HTTP layer maps
//! them onto status codes without inspecting messages.

use casfa_codec::CodecError;
use casfa_storage::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("credential expired")]
    Expired,
    #[error("delegate has been revoked")]
    DelegateRevoked,
    #[error("no root delegate exists for this realm")]
    RootDelegateNotFound,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("hash mismatch: body hashes to {actual}, path names {declared}")]
    HashMismatch { declared: String, actual: String },
    #[error("node is {size} bytes, over the {limit}-byte limit")]
    NodeTooLarge { size: usize, limit: usize },
    #[error("malformed node: {0}")]
    MalformedNode(String),
    #[error("invalid scope: {0}")]
    InvalidScope(String),
    #[error("delegation depth {depth} exceeds the maximum of {max}")]
    DepthExceeded { depth: u8, max: u8 },
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::NodeTooLarge { size, limit } => CoreError::NodeTooLarge { size, limit },
            other => CoreError::MalformedNode(other.to_string()),
        }
    }
}
