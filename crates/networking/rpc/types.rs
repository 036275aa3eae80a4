//! Request and response DTOs for the HTTP surface.

use casfa_common::types::{Delegate, NodeKey, NodeKind, Realm, RealmUsage, UserRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
}

// ---- local IdP ----

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtResponse {
    pub token: String,
    pub expires_at_ms: u64,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub realm: Realm,
    pub role: UserRole,
}

// ---- admin ----

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleEntry {
    pub user_id: String,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchUserRequest {
    pub user_id: String,
    pub role: UserRole,
}

// ---- delegates & tokens ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootDelegateResponse {
    pub delegate: Delegate,
    pub access_token: String,
    pub access_expires_at_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDelegateRequest {
    pub name: String,
    #[serde(default)]
    pub can_upload: bool,
    #[serde(default)]
    pub can_manage_depot: bool,
    /// Textual key of an uploaded Set node; omitted inherits the parent.
    pub scope: Option<String>,
    /// Access-token TTL in seconds.
    pub expires_in: Option<u64>,
    /// Refresh-token TTL in seconds.
    pub refresh_expires_in: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDelegateResponse {
    pub delegate: Delegate,
    pub access_token: String,
    pub access_expires_at_ms: u64,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub access_expires_at_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: usize,
}

// ---- depots ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDepotRequest {
    pub title: String,
    pub max_history: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchDepotRequest {
    pub title: Option<String>,
    pub max_history: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub new_root: NodeKey,
}

// ---- nodes ----

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub keys: Vec<NodeKey>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub missing: Vec<NodeKey>,
    pub owned: Vec<NodeKey>,
    pub present_unowned: Vec<NodeKey>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutResponse {
    pub key: NodeKey,
    pub first_write: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub kind: NodeKind,
    pub size: u64,
    pub ref_count: u64,
    pub children: Vec<NodeKey>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub pop: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub already_owned: bool,
}

pub type UsageResponse = RealmUsage;

// ---- filesystem façade ----

#[derive(Debug, Default, Deserialize)]
pub struct FsQuery {
    pub path: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FsMutateRequest {
    pub path: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsMutationResponse {
    pub new_root: NodeKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeKey>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FsStatResponse {
    pub kind: NodeKind,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLsEntry {
    pub name: String,
    pub key: NodeKey,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLsResponse {
    pub entries: Vec<FsLsEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}
