//! Local-filesystem blob store.
//!
//! Layout: `<root>/<realm-base32>/<key-base32>`. Writes go to a temporary
//! name in the same directory and are published with an atomic rename, so
//! a cancelled upload never leaves a half-written blob readable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use casfa_common::base32;
use casfa_common::types::{NodeKey, Realm};
use rand::RngCore;
use tracing::debug;

use crate::api::BlobStore;
use crate::error::StoreError;

#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(FsBlobStore { root })
    }

    fn blob_path(&self, realm: &Realm, key: &NodeKey) -> PathBuf {
        self.root
            .join(base32::encode(realm.as_bytes()))
            .join(base32::encode(key.as_bytes()))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn contains(&self, realm: &Realm, key: &NodeKey) -> Result<bool, StoreError> {
        Ok(self.blob_path(realm, key).is_file())
    }

    async fn get(&self, realm: &Realm, key: &NodeKey) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.blob_path(realm, key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, realm: &Realm, key: &NodeKey, bytes: &[u8]) -> Result<bool, StoreError> {
        let path = self.blob_path(realm, key);
        if path.is_file() {
            return Ok(false);
        }
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Backend("blob path has no parent".to_string()))?;
        fs::create_dir_all(dir)?;

        // Write-then-publish: unique temp name, fsync, rename.
        let tmp = dir.join(format!(".tmp-{:016x}", rand::thread_rng().next_u64()));
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        debug!(realm = %realm, key = %key, size = bytes.len(), "blob persisted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Realm, NodeKey) {
        (Realm::from_raw([1; 16]), NodeKey::from_raw([2; 16]))
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path()).expect("store");
        let (realm, key) = ids();

        assert!(!store.contains(&realm, &key).await.expect("contains"));
        assert!(store.put(&realm, &key, b"payload").await.expect("put"));
        assert!(store.contains(&realm, &key).await.expect("contains"));
        assert_eq!(
            store.get(&realm, &key).await.expect("get"),
            Some(b"payload".to_vec())
        );
        // second write of the same key is not a first write
        assert!(!store.put(&realm, &key, b"payload").await.expect("put"));
    }

    #[tokio::test]
    async fn realms_are_physically_separate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path()).expect("store");
        let (realm, key) = ids();
        let other = Realm::from_raw([9; 16]);

        store.put(&realm, &key, b"data").await.expect("put");
        assert_eq!(store.get(&other, &key).await.expect("get"), None);
    }
}
