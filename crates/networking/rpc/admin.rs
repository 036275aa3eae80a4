//! User-level and administrative endpoints.

use axum::Json;
use axum::extract::State;
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use casfa_common::types::{Realm, UserRole};

use crate::authentication::authenticate_user;
use crate::rpc::ApiContext;
use crate::types::{MeResponse, PatchUserRequest, UserRoleEntry};
use crate::utils::RpcErr;

type Auth = Option<TypedHeader<Authorization<Bearer>>>;

fn bearer(auth: &Auth) -> Option<&str> {
    auth.as_ref().map(|header| header.token())
}

/// `GET /api/oauth/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    auth: Auth,
) -> Result<Json<MeResponse>, RpcErr> {
    let (user_id, role) = authenticate_user(&ctx, bearer(&auth)).await?;
    let realm = Realm::for_subject(&user_id);
    Ok(Json(MeResponse {
        user_id,
        realm,
        role,
    }))
}

async fn require_admin(ctx: &ApiContext, auth: &Auth) -> Result<(), RpcErr> {
    let (_user, role) = authenticate_user(ctx, bearer(auth)).await?;
    if role != UserRole::Admin {
        return Err(RpcErr::Forbidden("admin role required".to_string()));
    }
    Ok(())
}

/// `GET /api/admin/users`
pub async fn list_users(
    State(ctx): State<ApiContext>,
    auth: Auth,
) -> Result<Json<Vec<UserRoleEntry>>, RpcErr> {
    require_admin(&ctx, &auth).await?;
    let users = ctx
        .store
        .list_user_roles()
        .await
        .map_err(|e| RpcErr::Internal(e.to_string()))?
        .into_iter()
        .map(|(user_id, role)| UserRoleEntry { user_id, role })
        .collect();
    Ok(Json(users))
}

/// `PATCH /api/admin/users`
pub async fn patch_user(
    State(ctx): State<ApiContext>,
    auth: Auth,
    Json(request): Json<PatchUserRequest>,
) -> Result<Json<UserRoleEntry>, RpcErr> {
    require_admin(&ctx, &auth).await?;
    ctx.store
        .set_user_role(&request.user_id, request.role)
        .await
        .map_err(|e| RpcErr::Internal(e.to_string()))?;
    Ok(Json(UserRoleEntry {
        user_id: request.user_id,
        role: request.role,
    }))
}
