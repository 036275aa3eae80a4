//! The delegate engine: capability principals and their tokens.
//!
//! Delegates form a per-realm tree. Authority only ever narrows along an
//! edge: permissions, scope and TTLs of a child are bounded by its
//! parent, and revocation cascades down the whole subtree in one batch.

use casfa_codec::node::Node;
use casfa_codec::token::{
    decode_access_token, decode_refresh_token, encode_access_token, encode_refresh_token,
    mint_access_token, mint_refresh_token, to_wire,
};
use casfa_codec::well_known::EMPTY_SET_KEY;
use casfa_common::types::{Delegate, DelegateId, DelegatePermissions, NodeKey, Realm};
use casfa_common::{CoreConfig, now_unix_ms};
use casfa_storage::Store;
use tracing::info;

use crate::auth::Principal;
use crate::error::CoreError;

/// Requested shape of a child delegate.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub name: String,
    pub can_upload: bool,
    pub can_manage_depot: bool,
    /// Key of an uploaded Set node; `None` inherits the parent's scope.
    pub scope: Option<NodeKey>,
    pub access_ttl_ms: Option<u64>,
    pub refresh_ttl_ms: Option<u64>,
}

/// Wire-form tokens handed out at minting and refresh time.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub access_expires_at_ms: u64,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct DelegateEngine {
    store: Store,
    config: CoreConfig,
}

impl DelegateEngine {
    pub fn new(store: Store, config: CoreConfig) -> Self {
        DelegateEngine { store, config }
    }

    /// Deterministic root-delegate id for a realm; makes bootstrap an
    /// idempotent put-if-absent instead of needing a realm→root index.
    pub fn root_delegate_id(realm: &Realm) -> DelegateId {
        let digest = blake3::derive_key("casfa root delegate v1", realm.as_bytes());
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&digest[..16]);
        DelegateId::from_raw(raw)
    }

    /// Creates the realm's root delegate on first touch; later calls are
    /// no-ops returning the existing row.
    pub async fn ensure_root(&self, realm: &Realm) -> Result<Delegate, CoreError> {
        let id = Self::root_delegate_id(realm);
        if let Some(existing) = self.store.get_delegate(&id).await? {
            return Ok(existing);
        }
        let root = Delegate {
            id,
            realm: *realm,
            parent: None,
            depth: 0,
            name: "root".to_string(),
            permissions: DelegatePermissions {
                can_upload: true,
                can_manage_depot: true,
            },
            scope: *EMPTY_SET_KEY,
            access_ttl_ms: self.config.root_access_ttl.as_millis() as u64,
            refresh_ttl_ms: self.config.root_refresh_ttl.as_millis() as u64,
            revoked: false,
            revoked_at_ms: None,
            revoke_reason: None,
            created_at_ms: now_unix_ms(),
        };
        if self.store.put_delegate_if_absent(&root).await? {
            info!(realm = %realm, delegate = %root.id, "root delegate created");
            return Ok(root);
        }
        // Lost the race; the winner's row is equivalent.
        self.store
            .get_delegate(&id)
            .await?
            .ok_or(CoreError::RootDelegateNotFound)
    }

    /// Resolves a binary access token into a request principal.
    pub async fn authenticate_access(&self, at_bytes: &[u8]) -> Result<Principal, CoreError> {
        let token = decode_access_token(at_bytes)
            .map_err(|_| CoreError::Unauthorized("malformed access token".to_string()))?;
        if token.expires_at_ms <= now_unix_ms() {
            return Err(CoreError::Expired);
        }
        let delegate = self
            .store
            .get_delegate(&token.delegate_id)
            .await?
            .ok_or_else(|| CoreError::Unauthorized("unknown delegate".to_string()))?;
        if delegate.revoked {
            return Err(CoreError::DelegateRevoked);
        }
        Ok(Principal::from_delegate(&delegate, at_bytes.to_vec()))
    }

    /// Exchanges a refresh token for a fresh access token. Refresh tokens
    /// are not rotated; they die with the delegate.
    pub async fn refresh(&self, rt_bytes: &[u8]) -> Result<IssuedTokens, CoreError> {
        let token = decode_refresh_token(rt_bytes)
            .map_err(|_| CoreError::Unauthorized("malformed refresh token".to_string()))?;
        let delegate = self
            .store
            .get_delegate(&token.delegate_id)
            .await?
            .ok_or_else(|| CoreError::Unauthorized("unknown delegate".to_string()))?;
        if delegate.revoked {
            return Err(CoreError::DelegateRevoked);
        }
        let (access_token, access_expires_at_ms) = self.issue_access(&delegate);
        Ok(IssuedTokens {
            access_token,
            access_expires_at_ms,
            refresh_token: to_wire(rt_bytes),
        })
    }

    /// Mints a wire-form access token within the delegate's TTL policy.
    pub fn issue_access(&self, delegate: &Delegate) -> (String, u64) {
        let expires_at_ms = now_unix_ms() + delegate.access_ttl_ms;
        let token = mint_access_token(delegate.id, expires_at_ms);
        (to_wire(&encode_access_token(&token)), expires_at_ms)
    }

    fn issue_pair(&self, delegate: &Delegate) -> IssuedTokens {
        let (access_token, access_expires_at_ms) = self.issue_access(delegate);
        let refresh = mint_refresh_token(delegate.id);
        IssuedTokens {
            access_token,
            access_expires_at_ms,
            refresh_token: to_wire(&encode_refresh_token(&refresh)),
        }
    }

    /// Mints a child delegate with strictly non-expanding authority.
    pub async fn create_child(
        &self,
        parent: &Principal,
        spec: ChildSpec,
    ) -> Result<(Delegate, IssuedTokens), CoreError> {
        let parent_row = self
            .store
            .get_delegate(&parent.delegate_id)
            .await?
            .ok_or_else(|| CoreError::Unauthorized("unknown delegate".to_string()))?;
        if parent_row.revoked {
            return Err(CoreError::DelegateRevoked);
        }

        let depth = parent_row.depth + 1;
        if depth > self.config.max_delegation_depth {
            return Err(CoreError::DepthExceeded {
                depth,
                max: self.config.max_delegation_depth,
            });
        }

        let permissions = DelegatePermissions {
            can_upload: spec.can_upload,
            can_manage_depot: spec.can_manage_depot,
        };
        if !permissions.subset_of(&parent_row.permissions) {
            return Err(CoreError::InvalidScope(
                "child permissions exceed the parent's".to_string(),
            ));
        }

        let scope = self.resolve_child_scope(&parent_row, spec.scope).await?;

        let access_ttl_ms = spec.access_ttl_ms.unwrap_or(parent_row.access_ttl_ms);
        let refresh_ttl_ms = spec.refresh_ttl_ms.unwrap_or(parent_row.refresh_ttl_ms);
        if access_ttl_ms > parent_row.access_ttl_ms || refresh_ttl_ms > parent_row.refresh_ttl_ms {
            return Err(CoreError::InvalidScope(
                "child token lifetime exceeds the parent's".to_string(),
            ));
        }

        let child = Delegate {
            id: DelegateId::generate(),
            realm: parent_row.realm,
            parent: Some(parent_row.id),
            depth,
            name: spec.name,
            permissions,
            scope,
            access_ttl_ms,
            refresh_ttl_ms,
            revoked: false,
            revoked_at_ms: None,
            revoke_reason: None,
            created_at_ms: now_unix_ms(),
        };
        self.store.put_delegate(&child).await?;
        info!(realm = %child.realm, delegate = %child.id, depth, "child delegate minted");
        let tokens = self.issue_pair(&child);
        Ok((child, tokens))
    }

    /// Scope containment: omitted (or well-known empty) scopes inherit the
    /// parent's; anything else must be an uploaded Set node whose members
    /// are contained in the parent's scope.
    async fn resolve_child_scope(
        &self,
        parent: &Delegate,
        requested: Option<NodeKey>,
    ) -> Result<NodeKey, CoreError> {
        let scope_key = match requested {
            None => return Ok(parent.scope),
            Some(key) if key == *EMPTY_SET_KEY => return Ok(parent.scope),
            Some(key) => key,
        };

        let blob = self
            .store
            .blob_get(&parent.realm, &scope_key)
            .await?
            .ok_or_else(|| {
                CoreError::InvalidScope("scope set has not been uploaded".to_string())
            })?;
        let members = match Node::decode(&blob) {
            Ok(Node::Set { keys }) => keys,
            Ok(_) => {
                return Err(CoreError::InvalidScope(
                    "scope key does not name a set node".to_string(),
                ));
            }
            Err(err) => return Err(CoreError::MalformedNode(err.to_string())),
        };

        if parent.scope != *EMPTY_SET_KEY {
            let parent_members = self
                .store
                .scope_set(&parent.realm, &parent.scope)
                .await?
                .ok_or_else(|| {
                    CoreError::InvalidScope("parent scope set is not registered".to_string())
                })?;
            if let Some(outside) = members.iter().find(|m| !parent_members.contains(m)) {
                return Err(CoreError::InvalidScope(format!(
                    "{outside} is outside the parent scope"
                )));
            }
        }

        self.store
            .put_scope_set(&parent.realm, &scope_key, &members)
            .await?;
        Ok(scope_key)
    }

    /// Revokes a delegate and every transitive descendant in one batch.
    /// The caller must be the target itself, one of its ancestors, or the
    /// realm root.
    pub async fn revoke(
        &self,
        caller: &Principal,
        target: DelegateId,
        reason: Option<String>,
    ) -> Result<usize, CoreError> {
        let target_row = self
            .store
            .get_delegate(&target)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("delegate {target}")))?;
        caller.check_realm(&target_row.realm)?;
        if !caller.is_root() && !self.is_self_or_ancestor(caller.delegate_id, &target_row).await? {
            return Err(CoreError::Forbidden(
                "only an ancestor may revoke a delegate".to_string(),
            ));
        }

        let realm_delegates = self.store.realm_delegates(&target_row.realm).await?;
        let now = now_unix_ms();
        let mut closure: Vec<Delegate> = Vec::new();
        let mut frontier = vec![target];
        while let Some(current) = frontier.pop() {
            for delegate in &realm_delegates {
                if delegate.parent == Some(current) {
                    frontier.push(delegate.id);
                }
            }
            if let Some(row) = realm_delegates.iter().find(|d| d.id == current) {
                let mut revoked = row.clone();
                if !revoked.revoked {
                    revoked.revoked = true;
                    revoked.revoked_at_ms = Some(now);
                    revoked.revoke_reason = reason.clone();
                }
                closure.push(revoked);
            }
        }
        let count = closure.len();
        self.store.put_delegates_batch(&closure).await?;
        info!(realm = %target_row.realm, delegate = %target, count, "revocation cascade applied");
        Ok(count)
    }

    async fn is_self_or_ancestor(
        &self,
        caller: DelegateId,
        target: &Delegate,
    ) -> Result<bool, CoreError> {
        if caller == target.id {
            return Ok(true);
        }
        let mut cursor = target.parent;
        for _ in 0..=self.config.max_delegation_depth {
            let Some(id) = cursor else {
                return Ok(false);
            };
            if id == caller {
                return Ok(true);
            }
            cursor = self
                .store
                .get_delegate(&id)
                .await?
                .and_then(|d| d.parent);
        }
        Ok(false)
    }

    pub async fn list(&self, realm: &Realm) -> Result<Vec<Delegate>, CoreError> {
        Ok(self.store.realm_delegates(realm).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casfa_codec::token::from_wire;

    fn spec(name: &str, can_upload: bool, can_manage_depot: bool) -> ChildSpec {
        ChildSpec {
            name: name.to_string(),
            can_upload,
            can_manage_depot,
            scope: None,
            access_ttl_ms: None,
            refresh_ttl_ms: None,
        }
    }

    async fn setup() -> (DelegateEngine, Realm, Principal) {
        let engine = DelegateEngine::new(Store::in_memory(), CoreConfig::default());
        let realm = Realm::for_subject("alice");
        let root = engine.ensure_root(&realm).await.expect("root");
        (engine, realm, Principal::from_delegate(&root, Vec::new()))
    }

    #[tokio::test]
    async fn root_bootstrap_is_idempotent() {
        let (engine, realm, _) = setup().await;
        let again = engine.ensure_root(&realm).await.expect("root");
        assert_eq!(again.id, DelegateEngine::root_delegate_id(&realm));
        assert_eq!(engine.list(&realm).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn narrowing_is_enforced() {
        let (engine, _realm, root) = setup().await;
        let (child, _tokens) = engine
            .create_child(&root, spec("worker", false, true))
            .await
            .expect("mint");
        assert_eq!(child.depth, 1);

        // a child without upload cannot mint an uploading grandchild
        let child_principal = Principal::from_delegate(&child, Vec::new());
        assert!(matches!(
            engine
                .create_child(&child_principal, spec("grandchild", true, false))
                .await,
            Err(CoreError::InvalidScope(_))
        ));
    }

    #[tokio::test]
    async fn ttls_cannot_grow() {
        let (engine, _realm, root) = setup().await;
        let mut request = spec("long-lived", true, true);
        request.access_ttl_ms = Some(u64::MAX);
        assert!(matches!(
            engine.create_child(&root, request).await,
            Err(CoreError::InvalidScope(_))
        ));
    }

    #[tokio::test]
    async fn depth_is_capped() {
        let config = CoreConfig {
            max_delegation_depth: 2,
            ..CoreConfig::default()
        };
        let engine = DelegateEngine::new(Store::in_memory(), config);
        let realm = Realm::for_subject("bob");
        let root = engine.ensure_root(&realm).await.expect("root");

        let mut principal = Principal::from_delegate(&root, Vec::new());
        for depth in 1..=2u8 {
            let (child, _) = engine
                .create_child(&principal, spec("chain", true, true))
                .await
                .expect("mint");
            assert_eq!(child.depth, depth);
            principal = Principal::from_delegate(&child, Vec::new());
        }
        assert!(matches!(
            engine.create_child(&principal, spec("too deep", true, true)).await,
            Err(CoreError::DepthExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn revocation_cascades_to_descendants() {
        let (engine, _realm, root) = setup().await;
        let (child, child_tokens) = engine
            .create_child(&root, spec("child", true, true))
            .await
            .expect("mint");
        let child_principal = Principal::from_delegate(&child, Vec::new());
        let (grandchild, grandchild_tokens) = engine
            .create_child(&child_principal, spec("grandchild", true, false))
            .await
            .expect("mint");

        let count = engine
            .revoke(&root, child.id, Some("compromised".to_string()))
            .await
            .expect("revoke");
        assert_eq!(count, 2);

        for wire in [&child_tokens.access_token, &grandchild_tokens.access_token] {
            let bytes = from_wire(wire).expect("wire");
            assert!(matches!(
                engine.authenticate_access(&bytes).await,
                Err(CoreError::DelegateRevoked)
            ));
        }
        // refresh observes the revocation too
        let rt = from_wire(&grandchild_tokens.refresh_token).expect("wire");
        assert!(matches!(
            engine.refresh(&rt).await,
            Err(CoreError::DelegateRevoked)
        ));
        let _ = grandchild;
    }

    #[tokio::test]
    async fn siblings_cannot_revoke_each_other() {
        let (engine, _realm, root) = setup().await;
        let (a, _) = engine
            .create_child(&root, spec("a", true, false))
            .await
            .expect("mint");
        let (b, _) = engine
            .create_child(&root, spec("b", true, false))
            .await
            .expect("mint");
        let a_principal = Principal::from_delegate(&a, Vec::new());
        assert!(matches!(
            engine.revoke(&a_principal, b.id, None).await,
            Err(CoreError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn refresh_issues_a_usable_access_token() {
        let (engine, _realm, root) = setup().await;
        let (_, tokens) = engine
            .create_child(&root, spec("worker", true, true))
            .await
            .expect("mint");
        let rt = from_wire(&tokens.refresh_token).expect("wire");
        let refreshed = engine.refresh(&rt).await.expect("refresh");
        let at = from_wire(&refreshed.access_token).expect("wire");
        let principal = engine.authenticate_access(&at).await.expect("auth");
        assert_eq!(principal.depth, 1);
    }

    #[tokio::test]
    async fn expired_access_tokens_are_rejected() {
        let (engine, _realm, root) = setup().await;
        let expired = mint_access_token(root.delegate_id, now_unix_ms().saturating_sub(1));
        let bytes = encode_access_token(&expired);
        assert!(matches!(
            engine.authenticate_access(&bytes).await,
            Err(CoreError::Expired)
        ));
    }
}
