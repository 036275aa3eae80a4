//! The node service: content-addressed ingest and retrieval.
//!
//! Every mutation here is per-(realm, key) and idempotent from the
//! caller's side; ref-count and ownership updates are serialized by the
//! store's compare-and-swap. Blob writes happen before any bookkeeping,
//! so a reader that observes ownership also observes the bytes.

use std::collections::HashMap;

use bytes::Bytes;
use casfa_codec::node::{Node, node_key_for};
use casfa_codec::well_known::{EMPTY_SET_KEY, is_well_known, well_known_bytes};
use casfa_codec::{pop, CodecError};
use casfa_common::CoreConfig;
use casfa_common::types::{DelegateId, NodeKey, NodeKind, NodeMeta, Realm};
use casfa_storage::Store;
use tracing::debug;

use crate::auth::Principal;
use crate::error::CoreError;

/// Classification of a batch of keys against the caller's holdings.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// Never uploaded in this realm; the caller must PUT bytes.
    pub missing: Vec<NodeKey>,
    /// Owned by the caller or a delegate in its issuer chain.
    pub owned: Vec<NodeKey>,
    /// Present in the realm but foreign to the caller's chain; a claim
    /// with proof-of-possession adds ownership without re-upload.
    pub present_unowned: Vec<NodeKey>,
}

/// What a successful PUT did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutReceipt {
    pub key: NodeKey,
    /// True when this was the realm's first physical write of the blob.
    pub first_write: bool,
}

/// Metadata view of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMetadata {
    pub kind: NodeKind,
    pub size: u64,
    pub ref_count: u64,
    pub children: Vec<NodeKey>,
}

#[derive(Debug, Clone)]
pub struct NodeService {
    store: Store,
    config: CoreConfig,
}

impl NodeService {
    pub fn new(store: Store, config: CoreConfig) -> Self {
        NodeService { store, config }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The caller plus its ancestors, nearest first. Ownership by any of
    /// them counts as ownership for reads and `check`.
    async fn issuer_chain(&self, principal: &Principal) -> Result<Vec<DelegateId>, CoreError> {
        let mut chain = vec![principal.delegate_id];
        let mut cursor = principal.delegate_id;
        // Depth is bounded by configuration, so so is this walk.
        for _ in 0..self.config.max_delegation_depth {
            let Some(delegate) = self.store.get_delegate(&cursor).await? else {
                break;
            };
            match delegate.parent {
                Some(parent) => {
                    chain.push(parent);
                    cursor = parent;
                }
                None => break,
            }
        }
        Ok(chain)
    }

    async fn chain_owns(
        &self,
        realm: &Realm,
        key: &NodeKey,
        chain: &[DelegateId],
    ) -> Result<bool, CoreError> {
        let owners = self.store.owners(realm, key).await?;
        Ok(owners.iter().any(|owner| chain.contains(owner)))
    }

    pub(crate) async fn can_read(
        &self,
        principal: &Principal,
        realm: &Realm,
        key: &NodeKey,
    ) -> Result<bool, CoreError> {
        if principal.is_root() || is_well_known(key) {
            return Ok(true);
        }
        let chain = self.issuer_chain(principal).await?;
        self.chain_owns(realm, key, &chain).await
    }

    /// Upload scope rule: the delegate's scope set contains the key, or
    /// the scope is the well-known empty set (whole realm).
    pub(crate) async fn check_scope(
        &self,
        principal: &Principal,
        realm: &Realm,
        key: &NodeKey,
    ) -> Result<(), CoreError> {
        if principal.scope == *EMPTY_SET_KEY {
            return Ok(());
        }
        let members = self
            .store
            .scope_set(realm, &principal.scope)
            .await?
            .ok_or_else(|| CoreError::InvalidScope("scope set is not registered".to_string()))?;
        if members.contains(key) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!("{key} is outside the delegate scope")))
        }
    }

    /// Loads canonical bytes, synthesizing well-known nodes.
    pub(crate) async fn load_bytes(
        &self,
        realm: &Realm,
        key: &NodeKey,
    ) -> Result<Option<Vec<u8>>, CoreError> {
        if let Some(bytes) = well_known_bytes(key) {
            return Ok(Some(bytes.to_vec()));
        }
        Ok(self.store.blob_get(realm, key).await?)
    }

    pub(crate) async fn load_node(
        &self,
        realm: &Realm,
        key: &NodeKey,
    ) -> Result<Option<(Vec<u8>, Node)>, CoreError> {
        let Some(bytes) = self.load_bytes(realm, key).await? else {
            return Ok(None);
        };
        let node = Node::decode(&bytes)
            .map_err(|e: CodecError| CoreError::MalformedNode(e.to_string()))?;
        Ok(Some((bytes, node)))
    }

    pub async fn check(
        &self,
        principal: &Principal,
        realm: &Realm,
        keys: &[NodeKey],
    ) -> Result<CheckReport, CoreError> {
        principal.check_realm(realm)?;
        let chain = self.issuer_chain(principal).await?;
        let mut report = CheckReport::default();
        for key in keys {
            if is_well_known(key) {
                report.owned.push(*key);
                continue;
            }
            if !self.store.blob_contains(realm, key).await? {
                report.missing.push(*key);
            } else if self.chain_owns(realm, key, &chain).await? {
                report.owned.push(*key);
            } else {
                report.present_unowned.push(*key);
            }
        }
        Ok(report)
    }

    /// Ingests one node. See the module docs for the ordering contract.
    pub async fn put(
        &self,
        principal: &Principal,
        realm: &Realm,
        key: &NodeKey,
        bytes: Bytes,
    ) -> Result<PutReceipt, CoreError> {
        principal.check_realm(realm)?;
        if !principal.permissions.can_upload {
            return Err(CoreError::Forbidden("delegate cannot upload".to_string()));
        }
        if bytes.len() > self.config.node_limit {
            return Err(CoreError::NodeTooLarge {
                size: bytes.len(),
                limit: self.config.node_limit,
            });
        }
        let derived = node_key_for(&bytes);
        if derived != *key {
            return Err(CoreError::HashMismatch {
                declared: key.to_string(),
                actual: derived.to_string(),
            });
        }
        self.check_scope(principal, realm, key).await?;

        // Structure comes from the bytes, never from the client.
        let node = Node::decode(&bytes)
            .map_err(|e: CodecError| CoreError::MalformedNode(e.to_string()))?;

        if is_well_known(key) {
            // Synthesizable content: nothing to persist, nothing to count.
            return Ok(PutReceipt {
                key: *key,
                first_write: false,
            });
        }

        let first_write = self
            .persist_counted(realm, principal.delegate_id, key, &bytes, &node)
            .await?;
        Ok(PutReceipt {
            key: *key,
            first_write,
        })
    }

    /// Shared persistence path for PUT and mutator-built nodes: blob,
    /// self ref-count, per-occurrence child ref-counts, ownership, then
    /// first-write metadata and usage.
    async fn persist_counted(
        &self,
        realm: &Realm,
        owner: DelegateId,
        key: &NodeKey,
        bytes: &[u8],
        node: &Node,
    ) -> Result<bool, CoreError> {
        let first_write = self.store.blob_put(realm, key, bytes).await?;

        self.store.bump_ref_count(realm, key, 1).await?;
        let mut occurrences: HashMap<NodeKey, u64> = HashMap::new();
        for child in node.counted_children() {
            *occurrences.entry(child).or_default() += 1;
        }
        for (child, count) in occurrences {
            self.store.bump_ref_count(realm, &child, count).await?;
        }

        self.store.add_owner(realm, key, owner).await?;

        if first_write {
            let meta = NodeMeta {
                kind: node.kind(),
                size: bytes.len() as u64,
                child_count: node.children().len() as u32,
            };
            self.store.put_node_meta(realm, key, &meta).await?;
            self.store.add_usage(realm, bytes.len() as u64, 1).await?;
            debug!(realm = %realm, key = %key, size = bytes.len(), "node persisted");
        }
        Ok(first_write)
    }

    /// Persists a node the server itself constructed (mutator splices).
    /// Scope is checked against the operation's root, not each interior
    /// node, so this skips the per-key scope test.
    pub(crate) async fn persist_node(
        &self,
        realm: &Realm,
        owner: DelegateId,
        node: &Node,
    ) -> Result<NodeKey, CoreError> {
        let bytes = node.encode(self.config.node_limit, self.config.max_name_bytes)?;
        let key = node_key_for(&bytes);
        if is_well_known(&key) {
            return Ok(key);
        }
        self.persist_counted(realm, owner, &key, &bytes, node)
            .await?;
        Ok(key)
    }

    pub async fn get(
        &self,
        principal: &Principal,
        realm: &Realm,
        key: &NodeKey,
    ) -> Result<Vec<u8>, CoreError> {
        principal.check_realm(realm)?;
        if !self.can_read(principal, realm, key).await? {
            return Err(CoreError::Forbidden(
                "node is not owned by the caller".to_string(),
            ));
        }
        self.load_bytes(realm, key)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {key}")))
    }

    pub async fn metadata(
        &self,
        principal: &Principal,
        realm: &Realm,
        key: &NodeKey,
    ) -> Result<NodeMetadata, CoreError> {
        principal.check_realm(realm)?;
        if !self.can_read(principal, realm, key).await? {
            return Err(CoreError::Forbidden(
                "node is not owned by the caller".to_string(),
            ));
        }
        let Some((bytes, node)) = self.load_node(realm, key).await? else {
            return Err(CoreError::NotFound(format!("node {key}")));
        };
        let ref_count = self.store.ref_count(realm, key).await?;
        Ok(NodeMetadata {
            kind: node.kind(),
            size: bytes.len() as u64,
            ref_count,
            children: node.children(),
        })
    }

    /// Adds the caller to the ownership set after verifying possession.
    /// Returns true when the caller already owned the node.
    pub async fn claim(
        &self,
        principal: &Principal,
        realm: &Realm,
        key: &NodeKey,
        presented_pop: &str,
    ) -> Result<bool, CoreError> {
        principal.check_realm(realm)?;
        let Some(bytes) = self.load_bytes(realm, key).await? else {
            return Err(CoreError::NotFound(format!("node {key}")));
        };
        // Realm ownership implies possession for roots; everyone else
        // proves they hold the bytes, keyed by their own access token.
        if !principal.is_root()
            && !pop::verify_pop(&principal.token_bytes, &bytes, presented_pop)
        {
            return Err(CoreError::Forbidden(
                "proof of possession does not verify".to_string(),
            ));
        }
        let newly_added = self
            .store
            .add_owner(realm, key, principal.delegate_id)
            .await?;
        Ok(!newly_added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casfa_codec::node::DictEntry;
    use casfa_codec::token::{encode_access_token, mint_access_token};
    use casfa_codec::well_known::EMPTY_DICT_KEY;
    use casfa_common::now_unix_ms;
    use casfa_common::types::{Delegate, DelegatePermissions};

    async fn setup() -> (NodeService, Principal, Realm) {
        let store = Store::in_memory();
        let service = NodeService::new(store.clone(), CoreConfig::default());
        let realm = Realm::from_raw([1; 16]);
        let delegate = root_delegate(realm, [10; 16]);
        store.put_delegate(&delegate).await.expect("put delegate");
        let principal = Principal::from_delegate(&delegate, Vec::new());
        (service, principal, realm)
    }

    fn root_delegate(realm: Realm, id: [u8; 16]) -> Delegate {
        Delegate {
            id: DelegateId::from_raw(id),
            realm,
            parent: None,
            depth: 0,
            name: "root".into(),
            permissions: DelegatePermissions {
                can_upload: true,
                can_manage_depot: true,
            },
            scope: *EMPTY_SET_KEY,
            access_ttl_ms: 3_600_000,
            refresh_ttl_ms: 86_400_000,
            revoked: false,
            revoked_at_ms: None,
            revoke_reason: None,
            created_at_ms: now_unix_ms(),
        }
    }

    fn file(data: &'static [u8]) -> (NodeKey, Bytes) {
        let node = Node::File {
            content_type: "text/plain".into(),
            data: Bytes::from_static(data),
        };
        let bytes = node.encode(4 * 1024 * 1024, 255).expect("encode");
        (node_key_for(&bytes), Bytes::from(bytes))
    }

    #[tokio::test]
    async fn upload_and_dedup() {
        let (service, principal, realm) = setup().await;
        let (key, bytes) = file(b"hello\n");

        let receipt = service
            .put(&principal, &realm, &key, bytes.clone())
            .await
            .expect("put");
        assert!(receipt.first_write);
        assert_eq!(
            service.metadata(&principal, &realm, &key).await.expect("meta").ref_count,
            1
        );

        // identical re-upload: ok, not a first write, self ref bumps again
        let receipt = service
            .put(&principal, &realm, &key, bytes)
            .await
            .expect("put");
        assert!(!receipt.first_write);
        assert_eq!(
            service.metadata(&principal, &realm, &key).await.expect("meta").ref_count,
            2
        );
    }

    #[tokio::test]
    async fn dict_children_count_per_occurrence() {
        let (service, principal, realm) = setup().await;
        let (file_key, file_bytes) = file(b"hello\n");
        service
            .put(&principal, &realm, &file_key, file_bytes)
            .await
            .expect("put file");

        let dict = Node::Dict {
            entries: ["a.txt", "b.txt", "c.txt"]
                .into_iter()
                .map(|name| DictEntry {
                    key: file_key,
                    name: name.into(),
                })
                .collect(),
        };
        let dict_bytes = dict.encode(4 * 1024 * 1024, 255).expect("encode");
        let dict_key = node_key_for(&dict_bytes);
        service
            .put(&principal, &realm, &dict_key, Bytes::from(dict_bytes))
            .await
            .expect("put dict");

        let dict_meta = service
            .metadata(&principal, &realm, &dict_key)
            .await
            .expect("meta");
        assert_eq!(dict_meta.ref_count, 1);
        assert_eq!(dict_meta.children.len(), 3);
        // 1 self-upload + 3 occurrences in the dict
        let file_meta = service
            .metadata(&principal, &realm, &file_key)
            .await
            .expect("meta");
        assert_eq!(file_meta.ref_count, 4);
    }

    #[tokio::test]
    async fn well_known_dict_is_readable_and_countable() {
        let (service, principal, realm) = setup().await;

        let meta = service
            .metadata(&principal, &realm, &EMPTY_DICT_KEY)
            .await
            .expect("meta");
        assert_eq!(meta.kind, NodeKind::Dict);
        assert_eq!(meta.ref_count, 0);

        let dict = Node::Dict {
            entries: vec![
                DictEntry {
                    key: *EMPTY_DICT_KEY,
                    name: "x".into(),
                },
                DictEntry {
                    key: *EMPTY_DICT_KEY,
                    name: "y".into(),
                },
            ],
        };
        let bytes = dict.encode(4 * 1024 * 1024, 255).expect("encode");
        let key = node_key_for(&bytes);
        service
            .put(&principal, &realm, &key, Bytes::from(bytes))
            .await
            .expect("put");

        let meta = service
            .metadata(&principal, &realm, &EMPTY_DICT_KEY)
            .await
            .expect("meta");
        assert_eq!(meta.ref_count, 2);
    }

    #[tokio::test]
    async fn hash_mismatch_and_size_limit() {
        let (service, principal, realm) = setup().await;
        let (_, bytes) = file(b"hello\n");
        let wrong_key = NodeKey::from_raw([0xee; 16]);
        assert!(matches!(
            service.put(&principal, &realm, &wrong_key, bytes).await,
            Err(CoreError::HashMismatch { .. })
        ));

        let mut small = NodeService::new(Store::in_memory(), CoreConfig {
            node_limit: 8,
            ..CoreConfig::default()
        });
        // keep the same principal; the realm check happens first, so reuse realm
        small.store = service.store.clone();
        let (key, bytes) = file(b"this body is longer than eight bytes");
        assert!(matches!(
            small.put(&principal, &realm, &key, bytes).await,
            Err(CoreError::NodeTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn claim_with_pop() {
        let (service, principal, realm) = setup().await;
        let (key, bytes) = file(b"shared bytes");
        service
            .put(&principal, &realm, &key, bytes.clone())
            .await
            .expect("put");

        // second delegate in the same realm, non-root so PoP is enforced
        let mut other = root_delegate(realm, [20; 16]);
        other.depth = 3;
        service.store.put_delegate(&other).await.expect("put delegate");
        let at = encode_access_token(&mint_access_token(other.id, now_unix_ms() + 60_000));
        let claimer = Principal::from_delegate(&other, at.to_vec());

        let report = service
            .check(&claimer, &realm, &[key])
            .await
            .expect("check");
        assert_eq!(report.present_unowned, vec![key]);

        let wrong = pop::compute_pop(&[9u8; 32], &bytes).expect("pop");
        assert!(matches!(
            service.claim(&claimer, &realm, &key, &wrong).await,
            Err(CoreError::Forbidden(_))
        ));

        let proof = pop::compute_pop(&claimer.token_bytes, &bytes).expect("pop");
        let already = service
            .claim(&claimer, &realm, &key, &proof)
            .await
            .expect("claim");
        assert!(!already);

        let report = service
            .check(&claimer, &realm, &[key])
            .await
            .expect("check");
        assert_eq!(report.owned, vec![key]);
    }

    #[tokio::test]
    async fn ref_counts_are_realm_local() {
        let (service, principal, realm) = setup().await;
        let (key, bytes) = file(b"hello\n");
        service
            .put(&principal, &realm, &key, bytes)
            .await
            .expect("put");

        let other_realm = Realm::from_raw([2; 16]);
        let other_root = root_delegate(other_realm, [30; 16]);
        service
            .store
            .put_delegate(&other_root)
            .await
            .expect("put delegate");
        let other_principal = Principal::from_delegate(&other_root, Vec::new());
        let report = service
            .check(&other_principal, &other_realm, &[key])
            .await
            .expect("check");
        assert_eq!(report.missing, vec![key]);
    }
}
