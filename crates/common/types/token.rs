//! Capability token value types.
//!
//! Tokens are ephemeral: the server never persists them, validity is
//! derived from the delegate they point at. The binary layout (and the
//! Base64-URL wire form) is owned by `casfa-codec`.

use super::ids::DelegateId;

/// Encoded length of an access token: delegate id ‖ expiry ‖ nonce.
pub const ACCESS_TOKEN_LEN: usize = 32;
/// Encoded length of a refresh token: delegate id ‖ nonce.
pub const REFRESH_TOKEN_LEN: usize = 24;

/// Short-lived bearer credential; also the keying material for
/// proof-of-possession.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessToken {
    pub delegate_id: DelegateId,
    /// Absolute expiry, milliseconds since the Unix epoch.
    pub expires_at_ms: u64,
    /// Random; makes the token unguessable, never re-validated.
    pub nonce: u64,
}

/// Long-lived credential exchanged for fresh access tokens until the
/// delegate is revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshToken {
    pub delegate_id: DelegateId,
    pub nonce: u64,
}
