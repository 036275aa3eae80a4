//! Shared helpers for in-crate handler tests.

use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use casfa_common::CoreConfig;
use casfa_storage::Store;

use crate::rpc::ApiContext;

pub fn test_context() -> ApiContext {
    ApiContext::new(Store::in_memory(), CoreConfig::default(), b"test-secret")
}

#[allow(clippy::unwrap_used)]
pub fn auth_header(token: &str) -> Option<TypedHeader<Authorization<Bearer>>> {
    Some(TypedHeader(Authorization::bearer(token).unwrap()))
}
