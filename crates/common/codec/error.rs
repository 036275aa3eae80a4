//! Codec failure modes.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The encoded form would exceed the configured node limit. The
    /// encoder refuses rather than letting an oversized blob acquire a key.
    #[error("encoded node is {size} bytes, over the {limit}-byte limit")]
    NodeTooLarge { size: usize, limit: usize },
    #[error("directory entry name is {size} bytes, over the {limit}-byte limit")]
    NameTooLong { size: usize, limit: usize },
    #[error("unknown node kind tag {0:#04x}")]
    UnknownTag(u8),
    #[error("malformed node: {0}")]
    Malformed(&'static str),
    #[error("token length {0} matches neither token layout")]
    BadTokenLength(usize),
    #[error("token is not valid base64url")]
    BadTokenEncoding,
}
