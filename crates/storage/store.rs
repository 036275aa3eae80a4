//! Main storage interface for the CASFA core.
//!
//! [`Store`] wraps the two port traits ([`api::StorageBackend`],
//! [`api::BlobStore`]) with typed accessors per concern: delegates,
//! ownership, ref-counts, depots, usage, user roles, scope sets, node
//! metadata and local IdP accounts. All cross-request serialization
//! happens here through compare-and-swap loops; callers never touch raw
//! table bytes.
//!
//! `Store` is `Clone` and thread-safe; clones share the same backends
//! via `Arc`.

pub mod api;
pub mod backend;
pub mod error;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use casfa_common::types::{
    Delegate, DelegateId, Depot, DepotId, LocalUser, NodeKey, NodeMeta, Realm, RealmUsage,
    UserRole,
};

use crate::api::{BatchEntry, BlobStore, StorageBackend, tables};
use crate::backend::fs_blob::FsBlobStore;
use crate::backend::in_memory::{InMemoryBackend, InMemoryBlobStore};
use crate::error::StoreError;

/// Selects the physical engines at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    /// Everything in memory; state dies with the process.
    InMemory,
    /// In-memory metadata, blobs on the local filesystem.
    LocalFs,
}

#[derive(Debug, Clone)]
pub struct Store {
    engine: Arc<dyn StorageBackend>,
    blobs: Arc<dyn BlobStore>,
}

fn composite(realm: &Realm, tail: &[u8; 16]) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(realm.as_bytes());
    key.extend_from_slice(tail);
    key
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn from_json<T: DeserializeOwned>(table: &'static str, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::corrupt(table, e))
}

impl Store {
    pub fn new(datadir: impl AsRef<Path>, engine_type: EngineType) -> Result<Self, StoreError> {
        info!("Opening storage engine: {engine_type:?}");
        let blobs: Arc<dyn BlobStore> = match engine_type {
            EngineType::InMemory => Arc::new(InMemoryBlobStore::new()),
            EngineType::LocalFs => Arc::new(FsBlobStore::new(datadir.as_ref().join("blobs"))?),
        };
        Ok(Store {
            engine: Arc::new(InMemoryBackend::new()),
            blobs,
        })
    }

    /// Store over explicit backends, for tests and embedders.
    pub fn with_backends(engine: Arc<dyn StorageBackend>, blobs: Arc<dyn BlobStore>) -> Self {
        Store { engine, blobs }
    }

    pub fn in_memory() -> Self {
        Store {
            engine: Arc::new(InMemoryBackend::new()),
            blobs: Arc::new(InMemoryBlobStore::new()),
        }
    }

    // ---- blobs ----

    pub async fn blob_contains(&self, realm: &Realm, key: &NodeKey) -> Result<bool, StoreError> {
        self.blobs.contains(realm, key).await
    }

    pub async fn blob_get(&self, realm: &Realm, key: &NodeKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.blobs.get(realm, key).await
    }

    /// Returns true when this was the realm's first physical write of `key`.
    pub async fn blob_put(
        &self,
        realm: &Realm,
        key: &NodeKey,
        bytes: &[u8],
    ) -> Result<bool, StoreError> {
        self.blobs.put(realm, key, bytes).await
    }

    // ---- delegates ----

    pub async fn get_delegate(&self, id: &DelegateId) -> Result<Option<Delegate>, StoreError> {
        match self.engine.get(tables::DELEGATES, id.as_bytes()).await? {
            Some(bytes) => Ok(Some(from_json(tables::DELEGATES, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_delegate(&self, delegate: &Delegate) -> Result<(), StoreError> {
        let entries = vec![
            (
                tables::DELEGATES,
                delegate.id.as_bytes().to_vec(),
                to_json(delegate)?,
            ),
            (
                tables::REALM_DELEGATES,
                composite(&delegate.realm, delegate.id.as_bytes()),
                delegate.id.as_bytes().to_vec(),
            ),
        ];
        self.engine.put_batch(entries).await
    }

    /// Idempotent create: returns false when the id was already present.
    pub async fn put_delegate_if_absent(&self, delegate: &Delegate) -> Result<bool, StoreError> {
        let created = self
            .engine
            .compare_and_swap(
                tables::DELEGATES,
                delegate.id.as_bytes(),
                None,
                &to_json(delegate)?,
            )
            .await?;
        if created {
            self.engine
                .put(
                    tables::REALM_DELEGATES,
                    &composite(&delegate.realm, delegate.id.as_bytes()),
                    delegate.id.as_bytes(),
                )
                .await?;
        }
        Ok(created)
    }

    /// Writes a revocation closure in one batch.
    pub async fn put_delegates_batch(&self, delegates: &[Delegate]) -> Result<(), StoreError> {
        let mut entries: Vec<BatchEntry> = Vec::with_capacity(delegates.len() * 2);
        for delegate in delegates {
            entries.push((
                tables::DELEGATES,
                delegate.id.as_bytes().to_vec(),
                to_json(delegate)?,
            ));
            entries.push((
                tables::REALM_DELEGATES,
                composite(&delegate.realm, delegate.id.as_bytes()),
                delegate.id.as_bytes().to_vec(),
            ));
        }
        self.engine.put_batch(entries).await
    }

    pub async fn realm_delegates(&self, realm: &Realm) -> Result<Vec<Delegate>, StoreError> {
        let index = self
            .engine
            .iter_prefix(tables::REALM_DELEGATES, realm.as_bytes())
            .await?;
        let mut delegates = Vec::with_capacity(index.len());
        for (_, id_bytes) in index {
            let Some(id) = DelegateId::from_slice(&id_bytes) else {
                return Err(StoreError::corrupt(
                    tables::REALM_DELEGATES,
                    "index value is not a delegate id",
                ));
            };
            if let Some(delegate) = self.get_delegate(&id).await? {
                delegates.push(delegate);
            }
        }
        Ok(delegates)
    }

    // ---- ownership ----

    pub async fn owners(&self, realm: &Realm, key: &NodeKey) -> Result<Vec<DelegateId>, StoreError> {
        match self
            .engine
            .get(tables::OWNERSHIP, &composite(realm, key.as_bytes()))
            .await?
        {
            Some(bytes) => from_json(tables::OWNERSHIP, &bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Unions `owner` into the ownership set. Returns false when the
    /// delegate already owned the node.
    pub async fn add_owner(
        &self,
        realm: &Realm,
        key: &NodeKey,
        owner: DelegateId,
    ) -> Result<bool, StoreError> {
        let table_key = composite(realm, key.as_bytes());
        loop {
            let current = self.engine.get(tables::OWNERSHIP, &table_key).await?;
            let mut owners: Vec<DelegateId> = match &current {
                Some(bytes) => from_json(tables::OWNERSHIP, bytes)?,
                None => Vec::new(),
            };
            if owners.contains(&owner) {
                return Ok(false);
            }
            owners.push(owner);
            let swapped = self
                .engine
                .compare_and_swap(
                    tables::OWNERSHIP,
                    &table_key,
                    current.as_deref(),
                    &to_json(&owners)?,
                )
                .await?;
            if swapped {
                return Ok(true);
            }
        }
    }

    // ---- ref counts ----

    pub async fn ref_count(&self, realm: &Realm, key: &NodeKey) -> Result<u64, StoreError> {
        match self
            .engine
            .get(tables::REF_COUNT, &composite(realm, key.as_bytes()))
            .await?
        {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::corrupt(tables::REF_COUNT, "count is not 8 bytes")
                })?;
                Ok(u64::from_le_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Adds `by` to the realm-local count; serialized by compare-and-swap.
    pub async fn bump_ref_count(
        &self,
        realm: &Realm,
        key: &NodeKey,
        by: u64,
    ) -> Result<u64, StoreError> {
        let table_key = composite(realm, key.as_bytes());
        loop {
            let current = self.engine.get(tables::REF_COUNT, &table_key).await?;
            let count = match &current {
                Some(bytes) => {
                    let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                        StoreError::corrupt(tables::REF_COUNT, "count is not 8 bytes")
                    })?;
                    u64::from_le_bytes(raw)
                }
                None => 0,
            };
            let next = count.saturating_add(by);
            let swapped = self
                .engine
                .compare_and_swap(
                    tables::REF_COUNT,
                    &table_key,
                    current.as_deref(),
                    &next.to_le_bytes(),
                )
                .await?;
            if swapped {
                return Ok(next);
            }
        }
    }

    // ---- depots ----

    pub async fn get_depot(
        &self,
        realm: &Realm,
        id: &DepotId,
    ) -> Result<Option<Depot>, StoreError> {
        match self
            .engine
            .get(tables::DEPOTS, &composite(realm, id.as_bytes()))
            .await?
        {
            Some(bytes) => Ok(Some(from_json(tables::DEPOTS, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_depot(&self, depot: &Depot) -> Result<(), StoreError> {
        self.engine
            .put(
                tables::DEPOTS,
                &composite(&depot.realm, depot.id.as_bytes()),
                &to_json(depot)?,
            )
            .await
    }

    pub async fn put_depot_if_absent(&self, depot: &Depot) -> Result<bool, StoreError> {
        self.engine
            .compare_and_swap(
                tables::DEPOTS,
                &composite(&depot.realm, depot.id.as_bytes()),
                None,
                &to_json(depot)?,
            )
            .await
    }

    pub async fn delete_depot(&self, realm: &Realm, id: &DepotId) -> Result<(), StoreError> {
        self.engine
            .delete(tables::DEPOTS, &composite(realm, id.as_bytes()))
            .await
    }

    pub async fn realm_depots(&self, realm: &Realm) -> Result<Vec<Depot>, StoreError> {
        let rows = self
            .engine
            .iter_prefix(tables::DEPOTS, realm.as_bytes())
            .await?;
        rows.into_iter()
            .map(|(_, bytes)| from_json(tables::DEPOTS, &bytes))
            .collect()
    }

    /// Read-modify-write on one depot record. `mutate` returning false
    /// aborts without writing. Retries on concurrent writers, so the
    /// closure must be pure; the head advance is last-writer-wins only in
    /// the sense that interleaved commits each apply atomically.
    pub async fn update_depot<F>(
        &self,
        realm: &Realm,
        id: &DepotId,
        mutate: F,
    ) -> Result<Option<Depot>, StoreError>
    where
        F: Fn(&mut Depot) -> bool,
    {
        let table_key = composite(realm, id.as_bytes());
        loop {
            let current = self.engine.get(tables::DEPOTS, &table_key).await?;
            let Some(bytes) = current else {
                return Ok(None);
            };
            let mut depot: Depot = from_json(tables::DEPOTS, &bytes)?;
            if !mutate(&mut depot) {
                return Ok(Some(depot));
            }
            let swapped = self
                .engine
                .compare_and_swap(tables::DEPOTS, &table_key, Some(&bytes), &to_json(&depot)?)
                .await?;
            if swapped {
                return Ok(Some(depot));
            }
        }
    }

    // ---- usage ----

    pub async fn usage(&self, realm: &Realm) -> Result<RealmUsage, StoreError> {
        match self.engine.get(tables::USAGE, realm.as_bytes()).await? {
            Some(bytes) => from_json(tables::USAGE, &bytes),
            None => Ok(RealmUsage::default()),
        }
    }

    pub async fn add_usage(
        &self,
        realm: &Realm,
        physical_bytes: u64,
        node_count: u64,
    ) -> Result<(), StoreError> {
        loop {
            let current = self.engine.get(tables::USAGE, realm.as_bytes()).await?;
            let mut usage: RealmUsage = match &current {
                Some(bytes) => from_json(tables::USAGE, bytes)?,
                None => RealmUsage::default(),
            };
            usage.physical_bytes = usage.physical_bytes.saturating_add(physical_bytes);
            usage.node_count = usage.node_count.saturating_add(node_count);
            let swapped = self
                .engine
                .compare_and_swap(
                    tables::USAGE,
                    realm.as_bytes(),
                    current.as_deref(),
                    &to_json(&usage)?,
                )
                .await?;
            if swapped {
                return Ok(());
            }
        }
    }

    // ---- user roles ----

    pub async fn user_role(&self, user_id: &str) -> Result<Option<UserRole>, StoreError> {
        match self
            .engine
            .get(tables::USER_ROLES, user_id.as_bytes())
            .await?
        {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| StoreError::corrupt(tables::USER_ROLES, e))?;
                text.parse()
                    .map(Some)
                    .map_err(|e| StoreError::corrupt(tables::USER_ROLES, e))
            }
            None => Ok(None),
        }
    }

    pub async fn set_user_role(&self, user_id: &str, role: UserRole) -> Result<(), StoreError> {
        self.engine
            .put(
                tables::USER_ROLES,
                user_id.as_bytes(),
                role.as_str().as_bytes(),
            )
            .await
    }

    pub async fn list_user_roles(&self) -> Result<Vec<(String, UserRole)>, StoreError> {
        let rows = self.engine.iter_prefix(tables::USER_ROLES, &[]).await?;
        rows.into_iter()
            .map(|(k, v)| {
                let user = String::from_utf8(k)
                    .map_err(|e| StoreError::corrupt(tables::USER_ROLES, e))?;
                let role = String::from_utf8(v)
                    .map_err(|e| StoreError::corrupt(tables::USER_ROLES, e))?
                    .parse()
                    .map_err(|e: String| StoreError::corrupt(tables::USER_ROLES, e))?;
                Ok((user, role))
            })
            .collect()
    }

    // ---- scope sets ----

    pub async fn scope_set(
        &self,
        realm: &Realm,
        key: &NodeKey,
    ) -> Result<Option<Vec<NodeKey>>, StoreError> {
        match self
            .engine
            .get(tables::SCOPE_SETS, &composite(realm, key.as_bytes()))
            .await?
        {
            Some(bytes) => Ok(Some(from_json(tables::SCOPE_SETS, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_scope_set(
        &self,
        realm: &Realm,
        key: &NodeKey,
        members: &[NodeKey],
    ) -> Result<(), StoreError> {
        self.engine
            .put(
                tables::SCOPE_SETS,
                &composite(realm, key.as_bytes()),
                &to_json(&members)?,
            )
            .await
    }

    // ---- node metadata ----

    pub async fn node_meta(
        &self,
        realm: &Realm,
        key: &NodeKey,
    ) -> Result<Option<NodeMeta>, StoreError> {
        match self
            .engine
            .get(tables::NODE_META, &composite(realm, key.as_bytes()))
            .await?
        {
            Some(bytes) => Ok(Some(from_json(tables::NODE_META, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_node_meta(
        &self,
        realm: &Realm,
        key: &NodeKey,
        meta: &NodeMeta,
    ) -> Result<(), StoreError> {
        self.engine
            .put(
                tables::NODE_META,
                &composite(realm, key.as_bytes()),
                &to_json(meta)?,
            )
            .await
    }

    // ---- local IdP accounts ----

    pub async fn local_user(&self, username: &str) -> Result<Option<LocalUser>, StoreError> {
        match self
            .engine
            .get(tables::LOCAL_USERS, username.as_bytes())
            .await?
        {
            Some(bytes) => Ok(Some(from_json(tables::LOCAL_USERS, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Registers an account; returns false when the username is taken.
    pub async fn put_local_user_if_absent(&self, user: &LocalUser) -> Result<bool, StoreError> {
        self.engine
            .compare_and_swap(
                tables::LOCAL_USERS,
                user.username.as_bytes(),
                None,
                &to_json(user)?,
            )
            .await
    }

    pub async fn has_local_users(&self) -> Result<bool, StoreError> {
        Ok(!self
            .engine
            .iter_prefix(tables::LOCAL_USERS, &[])
            .await?
            .is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Realm, NodeKey) {
        (Realm::from_raw([1; 16]), NodeKey::from_raw([2; 16]))
    }

    #[tokio::test]
    async fn ref_counts_accumulate_per_realm() {
        let store = Store::in_memory();
        let (realm, key) = ids();
        let other = Realm::from_raw([7; 16]);

        assert_eq!(store.ref_count(&realm, &key).await.expect("count"), 0);
        assert_eq!(store.bump_ref_count(&realm, &key, 1).await.expect("bump"), 1);
        assert_eq!(store.bump_ref_count(&realm, &key, 3).await.expect("bump"), 4);
        // realms are independent
        assert_eq!(store.ref_count(&other, &key).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn ownership_is_additive_and_deduplicated() {
        let store = Store::in_memory();
        let (realm, key) = ids();
        let a = DelegateId::from_raw([10; 16]);
        let b = DelegateId::from_raw([11; 16]);

        assert!(store.add_owner(&realm, &key, a).await.expect("add"));
        assert!(!store.add_owner(&realm, &key, a).await.expect("add"));
        assert!(store.add_owner(&realm, &key, b).await.expect("add"));
        assert_eq!(store.owners(&realm, &key).await.expect("owners"), vec![a, b]);
    }

    #[tokio::test]
    async fn usage_accumulates() {
        let store = Store::in_memory();
        let realm = Realm::from_raw([3; 16]);
        store.add_usage(&realm, 100, 1).await.expect("usage");
        store.add_usage(&realm, 50, 1).await.expect("usage");
        let usage = store.usage(&realm).await.expect("usage");
        assert_eq!(usage.physical_bytes, 150);
        assert_eq!(usage.node_count, 2);
    }

    #[tokio::test]
    async fn local_user_registration_is_first_writer_wins() {
        let store = Store::in_memory();
        let user = LocalUser {
            user_id: "u-1".into(),
            username: "alice".into(),
            password_hash: "00".into(),
            salt: "01".into(),
            created_at_ms: 0,
        };
        assert!(!store.has_local_users().await.expect("has"));
        assert!(store.put_local_user_if_absent(&user).await.expect("put"));
        assert!(!store.put_local_user_if_absent(&user).await.expect("put"));
        assert!(store.has_local_users().await.expect("has"));
    }
}
