//! The depot-mutator façade:
//! `/api/realm/{realm}/nodes/{key}/fs/{op}`.
//!
//! Read operations (`stat`, `ls`, `read`) go over GET with query
//! parameters; `write` is a PUT whose body is the file payload; the
//! structural mutations (`mkdir`, `rm`, `mv`, `cp`) are POSTs with a JSON
//! body. Mutations answer with the rewritten root.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use bytes::Bytes;
use casfa_common::types::NodeKey;
use casfa_core::auth::Policy;
use casfa_core::fs::Mutation;

use crate::authentication::realm_principal;
use crate::rpc::ApiContext;
use crate::types::{FsLsEntry, FsLsResponse, FsMutateRequest, FsMutationResponse, FsQuery, FsStatResponse};
use crate::utils::RpcErr;

type Auth = Option<TypedHeader<Authorization<Bearer>>>;

fn bearer(auth: &Auth) -> Option<&str> {
    auth.as_ref().map(|header| header.token())
}

fn parse_key(text: &str) -> Result<NodeKey, RpcErr> {
    text.parse()
        .map_err(|_| RpcErr::NotFound(format!("node {text}")))
}

fn query_path(query: &FsQuery) -> String {
    query.path.clone().unwrap_or_else(|| "/".to_string())
}

fn body_path(request: &FsMutateRequest) -> Result<&str, RpcErr> {
    request
        .path
        .as_deref()
        .ok_or_else(|| RpcErr::NotFound("missing path".to_string()))
}

fn mutation_response(mutation: Mutation) -> Json<FsMutationResponse> {
    Json(FsMutationResponse {
        new_root: mutation.new_root,
        node: mutation.node,
    })
}

/// `stat`, `ls` and `read`.
pub async fn fs_get(
    State(ctx): State<ApiContext>,
    Path((realm, key, op)): Path<(String, String, String)>,
    Query(query): Query<FsQuery>,
    auth: Auth,
) -> Result<Response, RpcErr> {
    let (principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ReadNode).await?;
    let root = parse_key(&key)?;
    let path = query_path(&query);
    match op.as_str() {
        "stat" => {
            let stat = ctx.fs.stat(&principal, &realm, &root, &path).await?;
            Ok(Json(FsStatResponse {
                kind: stat.kind,
                size: stat.size,
                content_type: stat.content_type,
                name: stat.name,
            })
            .into_response())
        }
        "ls" => {
            let page = ctx
                .fs
                .ls(
                    &principal,
                    &realm,
                    &root,
                    &path,
                    query.cursor.as_deref(),
                    query.limit,
                )
                .await?;
            Ok(Json(FsLsResponse {
                entries: page
                    .entries
                    .into_iter()
                    .map(|e| FsLsEntry {
                        name: e.name,
                        key: e.key,
                    })
                    .collect(),
                next_cursor: page.next_cursor,
            })
            .into_response())
        }
        "read" => {
            let (content_type, data) = ctx.fs.read(&principal, &realm, &root, &path).await?;
            Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
        }
        other => Err(RpcErr::NotFound(format!("fs operation {other}"))),
    }
}

/// `write` — PUT with the file payload as the body.
pub async fn fs_put(
    State(ctx): State<ApiContext>,
    Path((realm, key, op)): Path<(String, String, String)>,
    Query(query): Query<FsQuery>,
    auth: Auth,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<FsMutationResponse>, RpcErr> {
    if op != "write" {
        return Err(RpcErr::NotFound(format!("fs operation {op}")));
    }
    let (principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::WriteNode).await?;
    let root = parse_key(&key)?;
    let path = query
        .path
        .ok_or_else(|| RpcErr::NotFound("missing path".to_string()))?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let mutation = ctx
        .fs
        .write(&principal, &realm, &root, &path, body, content_type)
        .await?;
    Ok(mutation_response(mutation))
}

/// `mkdir`, `rm`, `mv` and `cp`.
pub async fn fs_post(
    State(ctx): State<ApiContext>,
    Path((realm, key, op)): Path<(String, String, String)>,
    auth: Auth,
    Json(request): Json<FsMutateRequest>,
) -> Result<Json<FsMutationResponse>, RpcErr> {
    let (principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::WriteNode).await?;
    let root = parse_key(&key)?;
    let mutation = match op.as_str() {
        "mkdir" => {
            ctx.fs
                .mkdir(&principal, &realm, &root, body_path(&request)?)
                .await?
        }
        "rm" => {
            ctx.fs
                .rm(&principal, &realm, &root, body_path(&request)?)
                .await?
        }
        "mv" | "cp" => {
            let from = request
                .from
                .as_deref()
                .ok_or_else(|| RpcErr::NotFound("missing from".to_string()))?;
            let to = request
                .to
                .as_deref()
                .ok_or_else(|| RpcErr::NotFound("missing to".to_string()))?;
            if op == "mv" {
                ctx.fs.mv(&principal, &realm, &root, from, to).await?
            } else {
                ctx.fs.cp(&principal, &realm, &root, from, to).await?
            }
        }
        other => return Err(RpcErr::NotFound(format!("fs operation {other}"))),
    };
    Ok(mutation_response(mutation))
}
