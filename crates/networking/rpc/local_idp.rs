//! Built-in local identity provider.
//!
//! Fills the external-IdP port for self-contained deployments: salted
//! BLAKE3 credential storage, HS256 user JWTs via `jsonwebtoken`, and the
//! `JwtVerifier` implementation the auth pipeline consumes. The first
//! registered account becomes the instance admin; everyone after starts
//! `unauthorized` until promoted.

use std::time::Duration;

use casfa_common::types::{LocalUser, UserRole};
use casfa_common::now_unix_ms;
use casfa_core::CoreError;
use casfa_core::auth::{JwtVerifier, VerifiedUser};
use casfa_storage::Store;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::types::JwtResponse;
use crate::utils::RpcErr;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 64;
/// User JWT lifetime (24 hours).
const JWT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

pub struct LocalIdp {
    store: Store,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

fn hash_password(salt_hex: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

impl LocalIdp {
    pub fn new(store: Store, secret: &[u8]) -> Self {
        LocalIdp {
            store,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    fn issue_jwt(&self, user_id: &str) -> Result<JwtResponse, RpcErr> {
        let iat = now_unix_ms() / 1000;
        let exp = iat + JWT_TTL.as_secs();
        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| RpcErr::Internal(format!("jwt signing failed: {e}")))?;
        Ok(JwtResponse {
            token,
            expires_at_ms: exp * 1000,
            user_id: user_id.to_string(),
        })
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<JwtResponse, RpcErr> {
        if username.is_empty() || username.len() > MAX_USERNAME_LEN {
            return Err(RpcErr::Conflict("invalid username".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(RpcErr::Conflict(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = hex::encode(salt);
        let user = LocalUser {
            user_id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash_password(&salt, password),
            salt,
            created_at_ms: now_unix_ms(),
        };

        // First account bootstraps the instance admin.
        let role = if self.store.has_local_users().await.map_err(internal)? {
            UserRole::Unauthorized
        } else {
            UserRole::Admin
        };

        if !self
            .store
            .put_local_user_if_absent(&user)
            .await
            .map_err(internal)?
        {
            return Err(RpcErr::Conflict("username is taken".to_string()));
        }
        self.store
            .set_user_role(&user.user_id, role)
            .await
            .map_err(internal)?;
        info!(username, role = %role, "local user registered");
        self.issue_jwt(&user.user_id)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<JwtResponse, RpcErr> {
        let Some(user) = self.store.local_user(username).await.map_err(internal)? else {
            return Err(RpcErr::Unauthorized("unknown user or bad password".to_string()));
        };
        if hash_password(&user.salt, password) != user.password_hash {
            return Err(RpcErr::Unauthorized("unknown user or bad password".to_string()));
        }
        self.issue_jwt(&user.user_id)
    }

    /// Re-issues a JWT for a still-valid one.
    pub fn refresh(&self, token: &str) -> Result<JwtResponse, RpcErr> {
        let user = self.verify(token).map_err(RpcErr::from)?;
        self.issue_jwt(&user.user_id)
    }
}

fn internal(err: casfa_storage::error::StoreError) -> RpcErr {
    RpcErr::Internal(err.to_string())
}

impl JwtVerifier for LocalIdp {
    fn verify(&self, token: &str) -> Result<VerifiedUser, CoreError> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(VerifiedUser {
                user_id: data.claims.sub,
            }),
            Err(err)
                if matches!(
                    err.kind(),
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature
                ) =>
            {
                Err(CoreError::Expired)
            }
            Err(err) => Err(CoreError::Unauthorized(format!("invalid token: {err}"))),
        }
    }
}

// ---- route handlers ----

use axum::Json;
use axum::extract::State;
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};

use crate::rpc::ApiContext;
use crate::types::CredentialsRequest;

type Auth = Option<TypedHeader<Authorization<Bearer>>>;

pub async fn register(
    State(ctx): State<ApiContext>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<JwtResponse>, RpcErr> {
    let issued = ctx.idp.register(&request.username, &request.password).await?;
    Ok(Json(issued))
}

pub async fn login(
    State(ctx): State<ApiContext>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<JwtResponse>, RpcErr> {
    let issued = ctx.idp.login(&request.username, &request.password).await?;
    Ok(Json(issued))
}

pub async fn refresh(
    State(ctx): State<ApiContext>,
    auth: Auth,
) -> Result<Json<JwtResponse>, RpcErr> {
    let token = auth
        .as_ref()
        .map(|header| header.token())
        .ok_or_else(|| RpcErr::Unauthorized("missing authorization header".to_string()))?;
    let issued = ctx.idp.refresh(token)?;
    Ok(Json(issued))
}

impl std::fmt::Debug for LocalIdp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdp").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idp() -> LocalIdp {
        LocalIdp::new(Store::in_memory(), b"test-secret")
    }

    #[tokio::test]
    async fn register_login_verify_round_trip() {
        let idp = idp();
        let issued = idp.register("alice", "correct horse").await.expect("register");
        let verified = idp.verify(&issued.token).expect("verify");
        assert_eq!(verified.user_id, issued.user_id);

        let login = idp.login("alice", "correct horse").await.expect("login");
        assert_eq!(login.user_id, issued.user_id);
        assert!(matches!(
            idp.login("alice", "wrong password").await,
            Err(RpcErr::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn first_user_is_admin_rest_start_unauthorized() {
        let idp = idp();
        let first = idp.register("admin", "password1").await.expect("register");
        let second = idp.register("guest", "password2").await.expect("register");
        assert_eq!(
            idp.store.user_role(&first.user_id).await.expect("role"),
            Some(UserRole::Admin)
        );
        assert_eq!(
            idp.store.user_role(&second.user_id).await.expect("role"),
            Some(UserRole::Unauthorized)
        );
    }

    #[tokio::test]
    async fn duplicate_usernames_conflict() {
        let idp = idp();
        idp.register("alice", "password1").await.expect("register");
        assert!(matches!(
            idp.register("alice", "password2").await,
            Err(RpcErr::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn garbage_tokens_fail_verification() {
        let idp = idp();
        assert!(idp.verify("not-a-jwt").is_err());
        let other = LocalIdp::new(Store::in_memory(), b"other-secret");
        let issued = idp.register("alice", "password1").await.expect("register");
        assert!(other.verify(&issued.token).is_err());
    }
}
