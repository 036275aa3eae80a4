//! User roles and local identity-provider accounts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Authorization tier attached to an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Authorized,
    Unauthorized,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Authorized => "authorized",
            UserRole::Unauthorized => "unauthorized",
        }
    }

    /// Unauthorized users may authenticate but touch nothing realm-scoped.
    pub fn may_access_realm(&self) -> bool {
        !matches!(self, UserRole::Unauthorized)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "authorized" => Ok(UserRole::Authorized),
            "unauthorized" => Ok(UserRole::Unauthorized),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Account row for the built-in local identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalUser {
    /// Subject carried in issued JWTs.
    pub user_id: String,
    pub username: String,
    /// Hex of BLAKE3(salt ‖ password).
    pub password_hash: String,
    /// Hex salt mixed into the password hash.
    pub salt: String,
    pub created_at_ms: u64,
}
