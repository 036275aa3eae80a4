//! Request principals, policies and the identity-verifier port.

use casfa_common::types::{Delegate, DelegateId, DelegatePermissions, NodeKey, Realm};

use crate::error::CoreError;

/// What an endpoint demands of its caller before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    ReadNode,
    WriteNode,
    ManageDepot,
    ManageDelegate,
}

/// The capability a request acts with, derived once per request from the
/// bearer credential.
#[derive(Debug, Clone)]
pub struct Principal {
    pub delegate_id: DelegateId,
    pub realm: Realm,
    pub permissions: DelegatePermissions,
    /// Scope set key; the well-known empty set means the whole realm.
    pub scope: NodeKey,
    pub depth: u8,
    /// Raw binary access token, kept for proof-of-possession checks.
    /// Empty for JWT-derived root principals.
    pub token_bytes: Vec<u8>,
}

impl Principal {
    pub fn from_delegate(delegate: &Delegate, token_bytes: Vec<u8>) -> Self {
        Principal {
            delegate_id: delegate.id,
            realm: delegate.realm,
            permissions: delegate.permissions,
            scope: delegate.scope,
            depth: delegate.depth,
            token_bytes,
        }
    }

    /// Root delegates see the whole realm.
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Realms never interleave: the path realm must be the token's.
    pub fn check_realm(&self, realm: &Realm) -> Result<(), CoreError> {
        if self.realm == *realm {
            Ok(())
        } else {
            Err(CoreError::Forbidden("realm mismatch".to_string()))
        }
    }

    pub fn require(&self, policy: Policy) -> Result<(), CoreError> {
        let allowed = match policy {
            Policy::ReadNode => true,
            Policy::WriteNode => self.permissions.can_upload,
            Policy::ManageDepot => self.permissions.can_manage_depot,
            // Any active delegate may mint; narrowing rules bound what it
            // can hand out.
            Policy::ManageDelegate => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "missing permission for {policy:?}"
            )))
        }
    }
}

/// An identity the JWT verifier vouched for.
#[derive(Debug, Clone)]
pub struct VerifiedUser {
    /// The `sub` claim; realms derive from it.
    pub user_id: String,
}

/// Pluggable verifier for user JWTs. The built-in local IdP implements it
/// with HS256; deployments may swap in an OAuth provider.
pub trait JwtVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedUser, CoreError>;
}
