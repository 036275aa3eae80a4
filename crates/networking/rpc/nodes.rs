//! Node endpoints: check, raw upload/download, metadata, claim, usage.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use bytes::Bytes;
use casfa_common::types::NodeKey;
use casfa_core::auth::Policy;

use crate::authentication::realm_principal;
use crate::rpc::ApiContext;
use crate::types::{
    CheckRequest, CheckResponse, ClaimRequest, ClaimResponse, MetadataResponse, PutResponse,
    UsageResponse,
};
use crate::utils::RpcErr;

type Auth = Option<TypedHeader<Authorization<Bearer>>>;

fn bearer(auth: &Auth) -> Option<&str> {
    auth.as_ref().map(|header| header.token())
}

fn parse_key(text: &str) -> Result<NodeKey, RpcErr> {
    text.parse()
        .map_err(|_| RpcErr::NotFound(format!("node {text}")))
}

pub async fn check(
    State(ctx): State<ApiContext>,
    Path(realm): Path<String>,
    auth: Auth,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, RpcErr> {
    let (principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ReadNode).await?;
    let report = ctx.nodes.check(&principal, &realm, &request.keys).await?;
    Ok(Json(CheckResponse {
        missing: report.missing,
        owned: report.owned,
        present_unowned: report.present_unowned,
    }))
}

pub async fn put_raw(
    State(ctx): State<ApiContext>,
    Path((realm, key)): Path<(String, String)>,
    auth: Auth,
    body: Bytes,
) -> Result<Json<PutResponse>, RpcErr> {
    let (principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::WriteNode).await?;
    let key = parse_key(&key)?;
    let receipt = ctx.nodes.put(&principal, &realm, &key, body).await?;
    Ok(Json(PutResponse {
        key: receipt.key,
        first_write: receipt.first_write,
    }))
}

pub async fn get_raw(
    State(ctx): State<ApiContext>,
    Path((realm, key)): Path<(String, String)>,
    auth: Auth,
) -> Result<impl IntoResponse, RpcErr> {
    let (principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ReadNode).await?;
    let key = parse_key(&key)?;
    let bytes = ctx.nodes.get(&principal, &realm, &key).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Bytes::from(bytes),
    ))
}

pub async fn metadata(
    State(ctx): State<ApiContext>,
    Path((realm, key)): Path<(String, String)>,
    auth: Auth,
) -> Result<Json<MetadataResponse>, RpcErr> {
    let (principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ReadNode).await?;
    let key = parse_key(&key)?;
    let meta = ctx.nodes.metadata(&principal, &realm, &key).await?;
    Ok(Json(MetadataResponse {
        kind: meta.kind,
        size: meta.size,
        ref_count: meta.ref_count,
        children: meta.children,
    }))
}

pub async fn claim(
    State(ctx): State<ApiContext>,
    Path((realm, key)): Path<(String, String)>,
    auth: Auth,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, RpcErr> {
    let (principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ReadNode).await?;
    let key = parse_key(&key)?;
    let already_owned = ctx
        .nodes
        .claim(&principal, &realm, &key, &request.pop)
        .await?;
    Ok(Json(ClaimResponse { already_owned }))
}

pub async fn usage(
    State(ctx): State<ApiContext>,
    Path(realm): Path<String>,
    auth: Auth,
) -> Result<Json<UsageResponse>, RpcErr> {
    let (_principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ReadNode).await?;
    let usage = ctx
        .store
        .usage(&realm)
        .await
        .map_err(|e| RpcErr::Internal(e.to_string()))?;
    Ok(Json(usage))
}
