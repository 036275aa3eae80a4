//! # CASFA common types
//!
//! Shared value types for the CASFA content-addressed storage service:
//! node keys and kinds, realm/delegate/depot identifiers, capability
//! tokens, and the persisted record shapes exchanged between the storage
//! ports and the core services.
//!
//! This crate is deliberately free of I/O and cryptography; the canonical
//! byte encodings (and NodeKey derivation) live in `casfa-codec`.

pub mod base32;
pub mod config;
pub mod types;

use std::time::{SystemTime, UNIX_EPOCH};

pub use config::CoreConfig;

/// Milliseconds since the Unix epoch.
///
/// Clock regressions saturate to zero rather than panicking.
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
