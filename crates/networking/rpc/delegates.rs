//! Delegate and token endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use casfa_common::types::{Delegate, DelegateId, NodeKey, Realm};
use casfa_core::auth::Policy;
use casfa_core::delegates::ChildSpec;

use crate::authentication::{authenticate_user, realm_principal, refresh_bytes};
use crate::rpc::ApiContext;
use crate::types::{
    CreateDelegateRequest, CreateDelegateResponse, RefreshResponse, RevokeRequest,
    RevokeResponse, RootDelegateResponse,
};
use crate::utils::RpcErr;

type Auth = Option<TypedHeader<Authorization<Bearer>>>;

fn bearer(auth: &Auth) -> Option<&str> {
    auth.as_ref().map(|header| header.token())
}

/// `POST /api/tokens/root` — idempotently materializes the realm for the
/// authenticated user and hands back the root delegate with a fresh AT.
pub async fn ensure_root(
    State(ctx): State<ApiContext>,
    auth: Auth,
) -> Result<Json<RootDelegateResponse>, RpcErr> {
    let (user_id, role) = authenticate_user(&ctx, bearer(&auth)).await?;
    if !role.may_access_realm() {
        return Err(RpcErr::Forbidden("user is not authorized".to_string()));
    }
    let realm = Realm::for_subject(&user_id);
    let delegate = ctx.delegates.ensure_root(&realm).await?;
    ctx.depots.ensure_main(&realm).await?;
    let (access_token, access_expires_at_ms) = ctx.delegates.issue_access(&delegate);
    Ok(Json(RootDelegateResponse {
        delegate,
        access_token,
        access_expires_at_ms,
    }))
}

/// `POST /api/tokens/refresh` — the only endpoint that accepts a 24-byte
/// bearer.
pub async fn refresh(
    State(ctx): State<ApiContext>,
    auth: Auth,
) -> Result<Json<RefreshResponse>, RpcErr> {
    let rt = refresh_bytes(bearer(&auth))?;
    let issued = ctx.delegates.refresh(&rt).await?;
    Ok(Json(RefreshResponse {
        access_token: issued.access_token,
        access_expires_at_ms: issued.access_expires_at_ms,
    }))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Path(realm): Path<String>,
    auth: Auth,
    Json(request): Json<CreateDelegateRequest>,
) -> Result<Json<CreateDelegateResponse>, RpcErr> {
    let (principal, _realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ManageDelegate).await?;

    let scope = match &request.scope {
        None => None,
        Some(text) => Some(
            text.parse::<NodeKey>()
                .map_err(|_| RpcErr::InvalidScope(format!("{text} is not a node key")))?,
        ),
    };
    let spec = ChildSpec {
        name: request.name,
        can_upload: request.can_upload,
        can_manage_depot: request.can_manage_depot,
        scope,
        access_ttl_ms: request.expires_in.map(|secs| secs * 1000),
        refresh_ttl_ms: request.refresh_expires_in.map(|secs| secs * 1000),
    };
    let (delegate, tokens) = ctx.delegates.create_child(&principal, spec).await?;
    Ok(Json(CreateDelegateResponse {
        delegate,
        access_token: tokens.access_token,
        access_expires_at_ms: tokens.access_expires_at_ms,
        refresh_token: tokens.refresh_token,
    }))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Path(realm): Path<String>,
    auth: Auth,
) -> Result<Json<Vec<Delegate>>, RpcErr> {
    let (_principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ManageDelegate).await?;
    Ok(Json(ctx.delegates.list(&realm).await?))
}

pub async fn revoke(
    State(ctx): State<ApiContext>,
    Path((realm, id)): Path<(String, String)>,
    auth: Auth,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<RevokeResponse>, RpcErr> {
    let (principal, _realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ManageDelegate).await?;
    let target: DelegateId = id
        .parse()
        .map_err(|_| RpcErr::NotFound(format!("delegate {id}")))?;
    let revoked = ctx
        .delegates
        .revoke(&principal, target, request.reason)
        .await?;
    Ok(Json(RevokeResponse { revoked }))
}
