//! Router assembly and server startup.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use casfa_common::CoreConfig;
use casfa_core::auth::JwtVerifier;
use casfa_core::delegates::DelegateEngine;
use casfa_core::depots::DepotService;
use casfa_core::fs::FsService;
use casfa_core::nodes::NodeService;
use casfa_storage::Store;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::local_idp::LocalIdp;
use crate::types::{HealthResponse, InfoResponse};
use crate::utils::RpcErr;
use crate::{admin, delegates, depots, fs, local_idp, nodes};

pub const SERVICE_NAME: &str = "casfa";

/// Everything the handlers need; cloned per request, all fields are
/// cheap `Arc`-backed handles.
#[derive(Clone)]
pub struct ApiContext {
    pub store: Store,
    pub nodes: NodeService,
    pub fs: FsService,
    pub depots: DepotService,
    pub delegates: DelegateEngine,
    pub idp: Arc<LocalIdp>,
    pub verifier: Arc<dyn JwtVerifier>,
    pub config: CoreConfig,
}

impl ApiContext {
    pub fn new(store: Store, config: CoreConfig, jwt_secret: &[u8]) -> Self {
        let nodes = NodeService::new(store.clone(), config.clone());
        let idp = Arc::new(LocalIdp::new(store.clone(), jwt_secret));
        ApiContext {
            fs: FsService::new(nodes.clone()),
            depots: DepotService::new(store.clone(), config.clone()),
            delegates: DelegateEngine::new(store.clone(), config.clone()),
            verifier: idp.clone(),
            idp,
            nodes,
            store,
            config,
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn service_info(State(_ctx): State<ApiContext>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Builds the full route table over a shared context.
pub fn build_router(ctx: ApiContext) -> Router {
    // Octet-stream uploads carry one node; leave headroom for framing.
    let body_limit = ctx.config.node_limit + 64 * 1024;
    Router::new()
        .route("/api/health", get(health))
        .route("/api/info", get(service_info))
        .route("/api/local/register", post(local_idp::register))
        .route("/api/local/login", post(local_idp::login))
        .route("/api/local/refresh", post(local_idp::refresh))
        .route("/api/oauth/me", get(admin::me))
        .route(
            "/api/admin/users",
            get(admin::list_users).patch(admin::patch_user),
        )
        .route("/api/tokens/root", post(delegates::ensure_root))
        .route("/api/tokens/refresh", post(delegates::refresh))
        .route(
            "/api/realm/{realm}/delegates",
            get(delegates::list).post(delegates::create),
        )
        .route(
            "/api/realm/{realm}/delegates/{id}/revoke",
            post(delegates::revoke),
        )
        .route(
            "/api/realm/{realm}/depots",
            get(depots::list).post(depots::create),
        )
        .route(
            "/api/realm/{realm}/depots/{id}",
            get(depots::get_depot)
                .patch(depots::patch)
                .delete(depots::delete),
        )
        .route("/api/realm/{realm}/depots/{id}/commit", post(depots::commit))
        .route("/api/realm/{realm}/nodes/check", post(nodes::check))
        .route(
            "/api/realm/{realm}/nodes/raw/{key}",
            put(nodes::put_raw).get(nodes::get_raw),
        )
        .route(
            "/api/realm/{realm}/nodes/metadata/{key}",
            get(nodes::metadata),
        )
        .route("/api/realm/{realm}/nodes/{key}/claim", post(nodes::claim))
        .route(
            "/api/realm/{realm}/nodes/{key}/fs/{op}",
            get(fs::fs_get).put(fs::fs_put).post(fs::fs_post),
        )
        .route("/api/realm/{realm}/usage", get(nodes::usage))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(ctx)
}

/// Binds and serves the HTTP API until SIGINT.
pub async fn start_api(addr: SocketAddr, ctx: ApiContext) -> Result<(), RpcErr> {
    let router = build_router(ctx);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|error| RpcErr::Internal(error.to_string()))?;
    info!("Starting HTTP server at {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .into_future()
        .await
        .map_err(|error| RpcErr::Internal(error.to_string()))
}

/// Completes when SIGINT (Ctrl+C) is received.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::authenticate;
    use crate::test_utils::{auth_header, test_context};
    use crate::types::{
        CheckRequest, ClaimRequest, CommitRequest, CreateDelegateRequest, FsMutateRequest,
        FsQuery,
    };
    use axum::extract::{Path, Query};
    use axum::http::HeaderMap;
    use axum::http::header;
    use bytes::Bytes;
    use casfa_codec::node::{Node, node_key_for};
    use casfa_codec::pop::compute_pop;
    use casfa_codec::token::from_wire;
    use casfa_codec::well_known::EMPTY_DICT_KEY;

    fn encoded_file(body: &'static [u8]) -> (String, Bytes) {
        let node = Node::File {
            content_type: "text/plain".into(),
            data: Bytes::from_static(body),
        };
        let bytes = node.encode(1 << 22, 255).expect("encode");
        (node_key_for(&bytes).to_string(), Bytes::from(bytes))
    }

    async fn admin_jwt(ctx: &ApiContext) -> String {
        let issued = ctx
            .idp
            .register("admin", "password123")
            .await
            .expect("register");
        issued.token
    }

    /// Register → ensure root → return (realm text, wire AT).
    async fn bootstrapped_realm(ctx: &ApiContext) -> (String, String) {
        let jwt = admin_jwt(ctx).await;
        let root = delegates::ensure_root(State(ctx.clone()), auth_header(&jwt))
            .await
            .expect("root")
            .0;
        (root.delegate.realm.to_string(), root.access_token)
    }

    #[tokio::test]
    async fn health_and_info() {
        let ctx = test_context();
        assert_eq!(health().await.0.status, "ok");
        assert_eq!(service_info(State(ctx)).await.0.name, "casfa");
    }

    #[tokio::test]
    async fn garbage_bearers_are_unauthorized() {
        let ctx = test_context();
        assert!(matches!(
            authenticate(&ctx, None).await,
            Err(RpcErr::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&ctx, Some("not a credential")).await,
            Err(RpcErr::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn refresh_tokens_do_not_authenticate_requests() {
        let ctx = test_context();
        let (realm, at) = bootstrapped_realm(&ctx).await;
        let response = delegates::create(
            State(ctx.clone()),
            Path(realm),
            auth_header(&at),
            Json(CreateDelegateRequest {
                name: "worker".into(),
                can_upload: true,
                can_manage_depot: false,
                scope: None,
                expires_in: None,
                refresh_expires_in: None,
            }),
        )
        .await
        .expect("mint")
        .0;

        assert!(matches!(
            authenticate(&ctx, Some(&response.refresh_token)).await,
            Err(RpcErr::Unauthorized(_))
        ));
        // but the refresh endpoint takes it
        let refreshed = delegates::refresh(State(ctx.clone()), auth_header(&response.refresh_token))
            .await
            .expect("refresh")
            .0;
        let principal = authenticate(&ctx, Some(&refreshed.access_token))
            .await
            .expect("auth");
        assert_eq!(principal.depth, 1);
    }

    #[tokio::test]
    async fn upload_check_metadata_flow() {
        let ctx = test_context();
        let (realm, at) = bootstrapped_realm(&ctx).await;
        let (key, bytes) = encoded_file(b"hello\n");

        // unknown at first
        let report = nodes::check(
            State(ctx.clone()),
            Path(realm.clone()),
            auth_header(&at),
            Json(CheckRequest {
                keys: vec![key.parse().expect("key")],
            }),
        )
        .await
        .expect("check")
        .0;
        assert_eq!(report.missing.len(), 1);

        let receipt = nodes::put_raw(
            State(ctx.clone()),
            Path((realm.clone(), key.clone())),
            auth_header(&at),
            bytes,
        )
        .await
        .expect("put")
        .0;
        assert!(receipt.first_write);

        let meta = nodes::metadata(
            State(ctx.clone()),
            Path((realm.clone(), key.clone())),
            auth_header(&at),
        )
        .await
        .expect("metadata")
        .0;
        assert_eq!(meta.ref_count, 1);

        let usage = nodes::usage(State(ctx), Path(realm), auth_header(&at))
            .await
            .expect("usage")
            .0;
        assert_eq!(usage.node_count, 1);
    }

    #[tokio::test]
    async fn wrong_key_is_a_hash_mismatch() {
        let ctx = test_context();
        let (realm, at) = bootstrapped_realm(&ctx).await;
        let (_, bytes) = encoded_file(b"hello\n");
        let bogus = casfa_common::types::NodeKey::from_raw([0x5a; 16]).to_string();
        let err = nodes::put_raw(
            State(ctx),
            Path((realm, bogus)),
            auth_header(&at),
            bytes,
        )
        .await
        .expect_err("must fail");
        assert_eq!(err.kind(), "HASH_MISMATCH");
    }

    #[tokio::test]
    async fn delegation_narrowing_maps_to_400() {
        let ctx = test_context();
        let (realm, at) = bootstrapped_realm(&ctx).await;
        let child = delegates::create(
            State(ctx.clone()),
            Path(realm.clone()),
            auth_header(&at),
            Json(CreateDelegateRequest {
                name: "no-upload".into(),
                can_upload: false,
                can_manage_depot: false,
                scope: None,
                expires_in: None,
                refresh_expires_in: None,
            }),
        )
        .await
        .expect("mint")
        .0;

        let err = delegates::create(
            State(ctx),
            Path(realm),
            auth_header(&child.access_token),
            Json(CreateDelegateRequest {
                name: "escalating".into(),
                can_upload: true,
                can_manage_depot: false,
                scope: None,
                expires_in: None,
                refresh_expires_in: None,
            }),
        )
        .await
        .expect_err("must fail");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn claim_across_delegates() {
        let ctx = test_context();
        let (realm, root_at) = bootstrapped_realm(&ctx).await;
        let (key, bytes) = encoded_file(b"shared");
        nodes::put_raw(
            State(ctx.clone()),
            Path((realm.clone(), key.clone())),
            auth_header(&root_at),
            bytes.clone(),
        )
        .await
        .expect("put");

        let other = delegates::create(
            State(ctx.clone()),
            Path(realm.clone()),
            auth_header(&root_at),
            Json(CreateDelegateRequest {
                name: "claimer".into(),
                can_upload: true,
                can_manage_depot: false,
                scope: None,
                expires_in: None,
                refresh_expires_in: None,
            }),
        )
        .await
        .expect("mint")
        .0;

        let report = nodes::check(
            State(ctx.clone()),
            Path(realm.clone()),
            auth_header(&other.access_token),
            Json(CheckRequest {
                keys: vec![key.parse().expect("key")],
            }),
        )
        .await
        .expect("check")
        .0;
        assert_eq!(report.present_unowned.len(), 1);

        let at_bytes = from_wire(&other.access_token).expect("wire");
        let proof = compute_pop(&at_bytes, &bytes).expect("pop");
        let claim = nodes::claim(
            State(ctx.clone()),
            Path((realm.clone(), key.clone())),
            auth_header(&other.access_token),
            Json(ClaimRequest { pop: proof }),
        )
        .await
        .expect("claim")
        .0;
        assert!(!claim.already_owned);

        let wrong = compute_pop(&[7u8; 32], &bytes).expect("pop");
        let err = nodes::claim(
            State(ctx),
            Path((realm, key)),
            auth_header(&other.access_token),
            Json(ClaimRequest { pop: wrong }),
        )
        .await
        .expect_err("must fail");
        assert_eq!(err.kind(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn fs_write_and_commit_to_main() {
        let ctx = test_context();
        let (realm, at) = bootstrapped_realm(&ctx).await;
        let root = EMPTY_DICT_KEY.to_string();

        let mkdir = fs::fs_post(
            State(ctx.clone()),
            Path((realm.clone(), root, "mkdir".to_string())),
            auth_header(&at),
            Json(FsMutateRequest {
                path: Some("/a".to_string()),
                ..Default::default()
            }),
        )
        .await
        .expect("mkdir")
        .0;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().expect("header"));
        let written = fs::fs_put(
            State(ctx.clone()),
            Path((
                realm.clone(),
                mkdir.new_root.to_string(),
                "write".to_string(),
            )),
            Query(FsQuery {
                path: Some("/a/b.txt".to_string()),
                ..Default::default()
            }),
            auth_header(&at),
            headers,
            Bytes::from_static(b"hi"),
        )
        .await
        .expect("write")
        .0;

        // the realm's main depot exists and takes the commit
        let depot_list = depots::list(State(ctx.clone()), Path(realm.clone()), auth_header(&at))
            .await
            .expect("list")
            .0;
        assert_eq!(depot_list.len(), 1);
        let main = &depot_list[0];
        assert_eq!(main.title, "main");

        let committed = depots::commit(
            State(ctx.clone()),
            Path((realm, main.id.to_string())),
            auth_header(&at),
            Json(CommitRequest {
                new_root: written.new_root,
            }),
        )
        .await
        .expect("commit")
        .0;
        assert_eq!(committed.root, written.new_root);
        assert_eq!(committed.history, vec![*EMPTY_DICT_KEY]);
    }
}
