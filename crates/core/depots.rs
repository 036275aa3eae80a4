//! Depot management: named heads with bounded history.

use casfa_codec::node::Node;
use casfa_codec::well_known::EMPTY_DICT_KEY;
use casfa_common::types::{Depot, DepotId, NodeKey, NodeKind, Realm};
use casfa_common::{CoreConfig, now_unix_ms};
use casfa_storage::Store;
use tracing::info;
use uuid::Uuid;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct DepotService {
    store: Store,
    config: CoreConfig,
}

impl DepotService {
    pub fn new(store: Store, config: CoreConfig) -> Self {
        DepotService { store, config }
    }

    /// Deterministic id of the realm's guaranteed "main" depot.
    pub fn main_depot_id(realm: &Realm) -> DepotId {
        let digest = blake3::derive_key("casfa main depot v1", realm.as_bytes());
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&digest[..16]);
        DepotId::from_raw(raw)
    }

    /// Materializes the main depot on first touch; idempotent.
    pub async fn ensure_main(&self, realm: &Realm) -> Result<Depot, CoreError> {
        let id = Self::main_depot_id(realm);
        if let Some(existing) = self.store.get_depot(realm, &id).await? {
            return Ok(existing);
        }
        let now = now_unix_ms();
        let main = Depot {
            id,
            realm: *realm,
            title: "main".to_string(),
            root: *EMPTY_DICT_KEY,
            history: Vec::new(),
            max_history: self.config.default_max_history,
            created_at_ms: now,
            updated_at_ms: now,
        };
        if self.store.put_depot_if_absent(&main).await? {
            info!(realm = %realm, depot = %main.id, "main depot created");
            return Ok(main);
        }
        self.store
            .get_depot(realm, &id)
            .await?
            .ok_or_else(|| CoreError::NotFound("main depot".to_string()))
    }

    pub async fn create(
        &self,
        realm: &Realm,
        title: String,
        max_history: Option<usize>,
    ) -> Result<Depot, CoreError> {
        let now = now_unix_ms();
        let depot = Depot {
            id: DepotId::from_raw(Uuid::now_v7().into_bytes()),
            realm: *realm,
            title,
            root: *EMPTY_DICT_KEY,
            history: Vec::new(),
            max_history: self.clamp_history(max_history),
            created_at_ms: now,
            updated_at_ms: now,
        };
        self.store.put_depot(&depot).await?;
        info!(realm = %realm, depot = %depot.id, "depot created");
        Ok(depot)
    }

    fn clamp_history(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.default_max_history)
            .clamp(1, self.config.max_max_history)
    }

    pub async fn list(&self, realm: &Realm) -> Result<Vec<Depot>, CoreError> {
        Ok(self.store.realm_depots(realm).await?)
    }

    pub async fn get(&self, realm: &Realm, id: &DepotId) -> Result<Depot, CoreError> {
        self.store
            .get_depot(realm, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("depot {id}")))
    }

    pub async fn update(
        &self,
        realm: &Realm,
        id: &DepotId,
        title: Option<String>,
        max_history: Option<usize>,
    ) -> Result<Depot, CoreError> {
        let clamped = max_history.map(|h| self.clamp_history(Some(h)));
        let now = now_unix_ms();
        self.store
            .update_depot(realm, id, |depot| {
                if let Some(title) = &title {
                    depot.title = title.clone();
                }
                if let Some(max) = clamped {
                    depot.max_history = max;
                    depot.clamp_history();
                }
                depot.updated_at_ms = now;
                true
            })
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("depot {id}")))
    }

    /// Deletes a depot. The main depot is permanent.
    pub async fn delete(&self, realm: &Realm, id: &DepotId) -> Result<(), CoreError> {
        if *id == Self::main_depot_id(realm) {
            return Err(CoreError::Forbidden(
                "the main depot cannot be deleted".to_string(),
            ));
        }
        // Report a missing depot instead of silently succeeding.
        self.get(realm, id).await?;
        Ok(self.store.delete_depot(realm, id).await?)
    }

    /// Advances the head to `new_root`, pushing the previous root into
    /// bounded history. All subtree nodes must already be persisted; the
    /// record update itself is atomic and last-writer-wins.
    pub async fn commit(
        &self,
        realm: &Realm,
        id: &DepotId,
        new_root: NodeKey,
    ) -> Result<Depot, CoreError> {
        self.require_dict(realm, &new_root).await?;
        let now = now_unix_ms();
        let updated = self
            .store
            .update_depot(realm, id, |depot| {
                if depot.root == new_root {
                    return false;
                }
                depot.advance(new_root, now);
                true
            })
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("depot {id}")))?;
        info!(realm = %realm, depot = %id, root = %new_root, "depot head advanced");
        Ok(updated)
    }

    async fn require_dict(&self, realm: &Realm, key: &NodeKey) -> Result<(), CoreError> {
        if *key == *EMPTY_DICT_KEY {
            return Ok(());
        }
        let Some(bytes) = self.store.blob_get(realm, key).await? else {
            return Err(CoreError::NotFound(format!("node {key}")));
        };
        let node = Node::decode(&bytes).map_err(|e| CoreError::MalformedNode(e.to_string()))?;
        if node.kind() != NodeKind::Dict {
            return Err(CoreError::Conflict(format!(
                "depot roots must be dict nodes, {key} is a {}",
                node.kind().as_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use casfa_codec::node::node_key_for;

    fn service() -> (DepotService, Realm) {
        (
            DepotService::new(Store::in_memory(), CoreConfig::default()),
            Realm::for_subject("carol"),
        )
    }

    async fn persist_dict(service: &DepotService, realm: &Realm, name: &str) -> NodeKey {
        let node = Node::Dict {
            entries: vec![casfa_codec::node::DictEntry {
                key: *EMPTY_DICT_KEY,
                name: name.to_string(),
            }],
        };
        let bytes = node.encode(1 << 20, 255).expect("encode");
        let key = node_key_for(&bytes);
        service
            .store
            .blob_put(realm, &key, &bytes)
            .await
            .expect("blob");
        key
    }

    #[tokio::test]
    async fn main_depot_is_idempotent_and_undeletable() {
        let (service, realm) = service();
        let main = service.ensure_main(&realm).await.expect("main");
        let again = service.ensure_main(&realm).await.expect("main");
        assert_eq!(main.id, again.id);
        assert_eq!(main.root, *EMPTY_DICT_KEY);
        assert!(matches!(
            service.delete(&realm, &main.id).await,
            Err(CoreError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn commit_pushes_bounded_history() {
        let (service, realm) = service();
        let depot = service
            .create(&realm, "work".to_string(), Some(2))
            .await
            .expect("create");

        let mut roots = Vec::new();
        for i in 0..3 {
            let root = persist_dict(&service, &realm, &format!("gen-{i}")).await;
            roots.push(root);
            service
                .commit(&realm, &depot.id, root)
                .await
                .expect("commit");
        }
        let current = service.get(&realm, &depot.id).await.expect("get");
        assert_eq!(current.root, roots[2]);
        assert_eq!(current.history, vec![roots[1], roots[0]]);
    }

    #[tokio::test]
    async fn commit_rejects_non_dict_roots() {
        let (service, realm) = service();
        let depot = service
            .create(&realm, "work".to_string(), None)
            .await
            .expect("create");

        let file = Node::File {
            content_type: "text/plain".into(),
            data: Bytes::from_static(b"not a dict"),
        };
        let bytes = file.encode(1 << 20, 255).expect("encode");
        let key = node_key_for(&bytes);
        service
            .store
            .blob_put(&realm, &key, &bytes)
            .await
            .expect("blob");

        assert!(matches!(
            service.commit(&realm, &depot.id, key).await,
            Err(CoreError::Conflict(_))
        ));
        let missing = NodeKey::from_raw([0x42; 16]);
        assert!(matches!(
            service.commit(&realm, &depot.id, missing).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_clamps_history() {
        let (service, realm) = service();
        let depot = service
            .create(&realm, "work".to_string(), Some(1000))
            .await
            .expect("create");
        assert_eq!(depot.max_history, 100);

        let updated = service
            .update(&realm, &depot.id, Some("renamed".to_string()), Some(0))
            .await
            .expect("update");
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.max_history, 1);
    }
}
