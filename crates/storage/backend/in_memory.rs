//! In-memory backends, used by tests and `--datadir memory` deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use casfa_common::types::{NodeKey, Realm};

use crate::api::{BatchEntry, BlobStore, StorageBackend};
use crate::error::StoreError;

/// Tabled KV store over `BTreeMap`s behind one `RwLock`; the lock scope
/// makes `compare_and_swap` and `put_batch` trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: RwLock<HashMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
    ) -> Result<
        std::sync::RwLockReadGuard<'_, HashMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>>,
        StoreError,
    > {
        self.tables
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(
        &self,
    ) -> Result<
        std::sync::RwLockWriteGuard<'_, HashMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>>,
        StoreError,
    > {
        self.tables
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, table: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .read()?
            .get(table)
            .and_then(|t| t.get(key))
            .cloned())
    }

    async fn put(&self, table: &'static str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write()?
            .entry(table)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, table: &'static str, key: &[u8]) -> Result<(), StoreError> {
        if let Some(t) = self.write()?.get_mut(table) {
            t.remove(key);
        }
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        table: &'static str,
        key: &[u8],
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let t = tables.entry(table).or_default();
        let current = t.get(key).map(|v| v.as_slice());
        if current != expected {
            return Ok(false);
        }
        t.insert(key.to_vec(), new.to_vec());
        Ok(true)
    }

    async fn put_batch(&self, entries: Vec<BatchEntry>) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        for (table, key, value) in entries {
            tables.entry(table).or_default().insert(key, value);
        }
        Ok(())
    }

    async fn iter_prefix(
        &self,
        table: &'static str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let tables = self.read()?;
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(t.range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Blob store backed by a map of `(realm, key)` → bytes.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<([u8; 16], NodeKey), Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn contains(&self, realm: &Realm, key: &NodeKey) -> Result<bool, StoreError> {
        Ok(self
            .blobs
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?
            .contains_key(&(*realm.as_bytes(), *key)))
    }

    async fn get(&self, realm: &Realm, key: &NodeKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .blobs
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?
            .get(&(*realm.as_bytes(), *key))
            .cloned())
    }

    async fn put(&self, realm: &Realm, key: &NodeKey, bytes: &[u8]) -> Result<bool, StoreError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let first = blobs
            .insert((*realm.as_bytes(), *key), bytes.to_vec())
            .is_none();
        Ok(first)
    }
}
