//! Error mapping between the core taxonomy and the wire.
//!
//! Every failure leaves the server as `{"error": KIND, "message": ...}`
//! with a status code derived from the kind; handlers never hand-build
//! error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use casfa_core::CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum RpcErr {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("credential expired")]
    Expired,
    #[error("delegate has been revoked")]
    DelegateRevoked,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("no root delegate exists for this realm")]
    RootDelegateNotFound,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("hash mismatch: {0}")]
    HashMismatch(String),
    #[error("node too large: {0}")]
    NodeTooLarge(String),
    #[error("malformed node: {0}")]
    MalformedNode(String),
    #[error("invalid scope: {0}")]
    InvalidScope(String),
    #[error("depth exceeded: {0}")]
    DepthExceeded(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable machine-readable error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl RpcErr {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcErr::Unauthorized(_) => "UNAUTHORIZED",
            RpcErr::Expired => "EXPIRED",
            RpcErr::DelegateRevoked => "DELEGATE_REVOKED",
            RpcErr::Forbidden(_) => "FORBIDDEN",
            RpcErr::RootDelegateNotFound => "ROOT_DELEGATE_NOT_FOUND",
            RpcErr::NotFound(_) => "NOT_FOUND",
            RpcErr::Conflict(_) => "CONFLICT",
            RpcErr::HashMismatch(_) => "HASH_MISMATCH",
            RpcErr::NodeTooLarge(_) => "NODE_TOO_LARGE",
            RpcErr::MalformedNode(_) => "MALFORMED_NODE",
            RpcErr::InvalidScope(_) => "INVALID_SCOPE",
            RpcErr::DepthExceeded(_) => "DEPTH_EXCEEDED",
            RpcErr::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RpcErr::Unauthorized(_) | RpcErr::Expired | RpcErr::DelegateRevoked => {
                StatusCode::UNAUTHORIZED
            }
            RpcErr::Forbidden(_) => StatusCode::FORBIDDEN,
            RpcErr::RootDelegateNotFound | RpcErr::NotFound(_) => StatusCode::NOT_FOUND,
            RpcErr::Conflict(_) => StatusCode::CONFLICT,
            RpcErr::HashMismatch(_) | RpcErr::MalformedNode(_) | RpcErr::InvalidScope(_)
            | RpcErr::DepthExceeded(_) => StatusCode::BAD_REQUEST,
            RpcErr::NodeTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RpcErr::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for RpcErr {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unauthorized(msg) => RpcErr::Unauthorized(msg),
            CoreError::Expired => RpcErr::Expired,
            CoreError::DelegateRevoked => RpcErr::DelegateRevoked,
            CoreError::RootDelegateNotFound => RpcErr::RootDelegateNotFound,
            CoreError::Forbidden(msg) => RpcErr::Forbidden(msg),
            CoreError::NotFound(msg) => RpcErr::NotFound(msg),
            CoreError::Conflict(msg) => RpcErr::Conflict(msg),
            CoreError::HashMismatch { .. } => RpcErr::HashMismatch(err.to_string()),
            CoreError::NodeTooLarge { .. } => RpcErr::NodeTooLarge(err.to_string()),
            CoreError::MalformedNode(msg) => RpcErr::MalformedNode(msg),
            CoreError::InvalidScope(msg) => RpcErr::InvalidScope(msg),
            CoreError::DepthExceeded { .. } => RpcErr::DepthExceeded(err.to_string()),
            CoreError::Store(inner) => RpcErr::Internal(inner.to_string()),
        }
    }
}

impl IntoResponse for RpcErr {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(RpcErr::Expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RpcErr::DelegateRevoked.kind(), "DELEGATE_REVOKED");
        assert_eq!(
            RpcErr::NodeTooLarge("x".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            RpcErr::DepthExceeded("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RpcErr::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn core_errors_convert() {
        let err: RpcErr = CoreError::DelegateRevoked.into();
        assert!(matches!(err, RpcErr::DelegateRevoked));
        let err: RpcErr = CoreError::HashMismatch {
            declared: "a".into(),
            actual: "b".into(),
        }
        .into();
        assert_eq!(err.kind(), "HASH_MISMATCH");
    }
}
