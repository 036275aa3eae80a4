//! Node kinds, per-realm node metadata, delegates and usage records.

use serde::{Deserialize, Serialize};

use super::ids::{DelegateId, Realm};
use super::keys::NodeKey;

/// The four immutable node shapes of the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Content-typed payload bytes.
    File,
    /// Ordered (key, name) directory entries.
    Dict,
    /// Pointer to an immediately-preceding node, chains large files.
    Successor,
    /// Sorted key set, used as a delegate scope manifest.
    Set,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Dict => "dict",
            NodeKind::Successor => "successor",
            NodeKind::Set => "set",
        }
    }
}

/// Persisted per-(realm, key) node metadata, written on first persist so
/// `metadata` lookups never re-parse blob bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub kind: NodeKind,
    /// Size of the canonical encoding in bytes.
    pub size: u64,
    /// Number of child references carried in the body (0 for files).
    pub child_count: u32,
}

/// The two grantable capabilities of a delegate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatePermissions {
    pub can_upload: bool,
    pub can_manage_depot: bool,
}

impl DelegatePermissions {
    /// True when every permission of `self` is also held by `other`.
    pub fn subset_of(&self, other: &DelegatePermissions) -> bool {
        (!self.can_upload || other.can_upload)
            && (!self.can_manage_depot || other.can_manage_depot)
    }
}

/// A persistent capability principal.
///
/// Delegates form a per-realm tree rooted at the depth-0 root delegate;
/// every child carries a strict subset of its parent's authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegate {
    pub id: DelegateId,
    pub realm: Realm,
    pub parent: Option<DelegateId>,
    /// Root = 0; children are parent depth + 1, capped by configuration.
    pub depth: u8,
    pub name: String,
    pub permissions: DelegatePermissions,
    /// Key of the Set node bounding what this delegate may touch; the
    /// well-known empty set means the whole realm.
    pub scope: NodeKey,
    pub access_ttl_ms: u64,
    pub refresh_ttl_ms: u64,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoke_reason: Option<String>,
    pub created_at_ms: u64,
}

impl Delegate {
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }
}

/// Per-realm aggregate advanced on first-time physical persistence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmUsage {
    pub physical_bytes: u64,
    pub node_count: u64,
}
