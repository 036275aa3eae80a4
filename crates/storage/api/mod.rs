//! Port traits the core is polymorphic over.
//!
//! `StorageBackend` is a tabled key-value store with a compare-and-swap
//! primitive (the serialization point for ref-count, ownership and depot
//! head updates) and batched writes (revocation cascades). `BlobStore`
//! owns physical node bytes, realm-scoped. Concrete backends are selected
//! at startup; the core never sees past these traits.

pub mod tables;

use async_trait::async_trait;
use casfa_common::types::{NodeKey, Realm};
use std::fmt::Debug;

use crate::error::StoreError;

/// One write in a batch: `(table, key, value)`.
pub type BatchEntry = (&'static str, Vec<u8>, Vec<u8>);

#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    async fn get(&self, table: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, table: &'static str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    async fn delete(&self, table: &'static str, key: &[u8]) -> Result<(), StoreError>;

    /// Atomically replaces `expected` (None = absent) with `new`.
    /// Returns false when the current value did not match `expected`.
    async fn compare_and_swap(
        &self,
        table: &'static str,
        key: &[u8],
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StoreError>;

    /// Applies all writes; concurrent readers never observe a prefix
    /// interleaved with their own writes to the same keys.
    async fn put_batch(&self, entries: Vec<BatchEntry>) -> Result<(), StoreError>;

    /// Key-ordered scan of every entry whose key starts with `prefix`.
    async fn iter_prefix(
        &self,
        table: &'static str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    async fn contains(&self, realm: &Realm, key: &NodeKey) -> Result<bool, StoreError>;

    async fn get(&self, realm: &Realm, key: &NodeKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Persists the blob. Returns true when this was the first physical
    /// write for (realm, key). Implementations must publish atomically:
    /// a concurrent reader sees either nothing or the whole blob.
    async fn put(&self, realm: &Realm, key: &NodeKey, bytes: &[u8]) -> Result<bool, StoreError>;
}
