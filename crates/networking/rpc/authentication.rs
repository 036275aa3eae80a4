//! Bearer classification and per-request principal derivation.
//!
//! A bearer value is, in order: a binary access token (decodes to 32
//! bytes), a refresh token (24 bytes, only the refresh endpoint takes
//! it), or a user JWT for the configured verifier. JWT principals are
//! root delegates with no token bytes, so they skip proof-of-possession.

use casfa_codec::token::from_wire;
use casfa_common::types::{
    ACCESS_TOKEN_LEN, REFRESH_TOKEN_LEN, Realm, UserRole,
};
use casfa_core::auth::{Policy, Principal};
use casfa_core::CoreError;

use crate::rpc::ApiContext;
use crate::utils::RpcErr;

/// Outcome of classifying the raw bearer string.
enum Bearer {
    Access(Vec<u8>),
    Refresh(Vec<u8>),
    Jwt(String),
}

fn classify(bearer: &str) -> Bearer {
    if let Ok(bytes) = from_wire(bearer) {
        match bytes.len() {
            ACCESS_TOKEN_LEN => return Bearer::Access(bytes),
            REFRESH_TOKEN_LEN => return Bearer::Refresh(bytes),
            _ => {}
        }
    }
    Bearer::Jwt(bearer.to_string())
}

/// Resolves a verified user into a root-delegate principal, creating the
/// root delegate and main depot on first touch.
async fn principal_for_user(ctx: &ApiContext, user_id: &str) -> Result<Principal, RpcErr> {
    let role = ctx
        .store
        .user_role(user_id)
        .await
        .map_err(|e| RpcErr::Internal(e.to_string()))?
        .unwrap_or(UserRole::Unauthorized);
    if !role.may_access_realm() {
        return Err(RpcErr::Forbidden("user is not authorized".to_string()));
    }
    let realm = Realm::for_subject(user_id);
    let root = ctx.delegates.ensure_root(&realm).await.map_err(RpcErr::from)?;
    ctx.depots.ensure_main(&realm).await.map_err(RpcErr::from)?;
    Ok(Principal::from_delegate(&root, Vec::new()))
}

/// Derives the request principal from an `Authorization: Bearer` value.
pub async fn authenticate(ctx: &ApiContext, bearer: Option<&str>) -> Result<Principal, RpcErr> {
    let Some(bearer) = bearer else {
        return Err(RpcErr::Unauthorized(
            "missing authorization header".to_string(),
        ));
    };
    match classify(bearer) {
        Bearer::Access(bytes) => ctx
            .delegates
            .authenticate_access(&bytes)
            .await
            .map_err(RpcErr::from),
        Bearer::Refresh(_) => Err(RpcErr::Unauthorized(
            "refresh tokens are only valid on the refresh endpoint".to_string(),
        )),
        Bearer::Jwt(token) => {
            let user = ctx.verifier.verify(&token).map_err(RpcErr::from)?;
            principal_for_user(ctx, &user.user_id).await
        }
    }
}

/// JWT-only authentication for user-level endpoints (`/api/oauth/me`,
/// `/api/admin/*`, `/api/tokens/root`).
pub async fn authenticate_user(
    ctx: &ApiContext,
    bearer: Option<&str>,
) -> Result<(String, UserRole), RpcErr> {
    let Some(bearer) = bearer else {
        return Err(RpcErr::Unauthorized(
            "missing authorization header".to_string(),
        ));
    };
    let Bearer::Jwt(token) = classify(bearer) else {
        return Err(RpcErr::Unauthorized(
            "a user JWT is required here".to_string(),
        ));
    };
    let user = ctx.verifier.verify(&token).map_err(RpcErr::from)?;
    let role = ctx
        .store
        .user_role(&user.user_id)
        .await
        .map_err(|e| RpcErr::Internal(e.to_string()))?
        .unwrap_or(UserRole::Unauthorized);
    Ok((user.user_id, role))
}

/// The 24-byte bearer the refresh endpoint consumes.
pub fn refresh_bytes(bearer: Option<&str>) -> Result<Vec<u8>, RpcErr> {
    let Some(bearer) = bearer else {
        return Err(RpcErr::Unauthorized(
            "missing authorization header".to_string(),
        ));
    };
    match classify(bearer) {
        Bearer::Refresh(bytes) => Ok(bytes),
        _ => Err(RpcErr::Unauthorized(
            "a refresh token is required here".to_string(),
        )),
    }
}

/// Shared prologue of realm-scoped handlers: parse the realm, derive the
/// principal, check the realm matches and the endpoint policy holds.
pub async fn realm_principal(
    ctx: &ApiContext,
    bearer: Option<&str>,
    realm_text: &str,
    policy: Policy,
) -> Result<(Principal, Realm), RpcErr> {
    let realm: Realm = realm_text
        .parse()
        .map_err(|_| RpcErr::NotFound(format!("realm {realm_text}")))?;
    let principal = authenticate(ctx, bearer).await?;
    principal
        .check_realm(&realm)
        .map_err(|e: CoreError| RpcErr::from(e))?;
    principal.require(policy).map_err(RpcErr::from)?;
    Ok((principal, realm))
}
