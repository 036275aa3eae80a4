//! Depot endpoints: listing, lifecycle and commits.

use axum::Json;
use axum::extract::{Path, State};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use casfa_common::types::{Depot, DepotId};
use casfa_core::auth::Policy;

use crate::authentication::realm_principal;
use crate::rpc::ApiContext;
use crate::types::{CommitRequest, CreateDepotRequest, PatchDepotRequest};
use crate::utils::RpcErr;

type Auth = Option<TypedHeader<Authorization<Bearer>>>;

fn bearer(auth: &Auth) -> Option<&str> {
    auth.as_ref().map(|header| header.token())
}

fn parse_depot_id(text: &str) -> Result<DepotId, RpcErr> {
    text.parse()
        .map_err(|_| RpcErr::NotFound(format!("depot {text}")))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Path(realm): Path<String>,
    auth: Auth,
) -> Result<Json<Vec<Depot>>, RpcErr> {
    let (_principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ReadNode).await?;
    Ok(Json(ctx.depots.list(&realm).await?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Path(realm): Path<String>,
    auth: Auth,
    Json(request): Json<CreateDepotRequest>,
) -> Result<Json<Depot>, RpcErr> {
    let (_principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ManageDepot).await?;
    let depot = ctx
        .depots
        .create(&realm, request.title, request.max_history)
        .await?;
    Ok(Json(depot))
}

pub async fn get_depot(
    State(ctx): State<ApiContext>,
    Path((realm, id)): Path<(String, String)>,
    auth: Auth,
) -> Result<Json<Depot>, RpcErr> {
    let (_principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ReadNode).await?;
    let id = parse_depot_id(&id)?;
    Ok(Json(ctx.depots.get(&realm, &id).await?))
}

pub async fn patch(
    State(ctx): State<ApiContext>,
    Path((realm, id)): Path<(String, String)>,
    auth: Auth,
    Json(request): Json<PatchDepotRequest>,
) -> Result<Json<Depot>, RpcErr> {
    let (_principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ManageDepot).await?;
    let id = parse_depot_id(&id)?;
    let depot = ctx
        .depots
        .update(&realm, &id, request.title, request.max_history)
        .await?;
    Ok(Json(depot))
}

pub async fn delete(
    State(ctx): State<ApiContext>,
    Path((realm, id)): Path<(String, String)>,
    auth: Auth,
) -> Result<Json<serde_json::Value>, RpcErr> {
    let (_principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ManageDepot).await?;
    let id = parse_depot_id(&id)?;
    ctx.depots.delete(&realm, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn commit(
    State(ctx): State<ApiContext>,
    Path((realm, id)): Path<(String, String)>,
    auth: Auth,
    Json(request): Json<CommitRequest>,
) -> Result<Json<Depot>, RpcErr> {
    let (_principal, realm) =
        realm_principal(&ctx, bearer(&auth), &realm, Policy::ManageDepot).await?;
    let id = parse_depot_id(&id)?;
    let depot = ctx.depots.commit(&realm, &id, request.new_root).await?;
    Ok(Json(depot))
}
