//! Binary token codec and Base64-URL wire form.
//!
//! Length alone disambiguates the two layouts: 32 bytes is an access
//! token, 24 a refresh token. No magic, no type byte.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use casfa_common::types::{
    ACCESS_TOKEN_LEN, AccessToken, DelegateId, REFRESH_TOKEN_LEN, RefreshToken,
};
use rand::RngCore;

use crate::error::CodecError;

pub fn encode_access_token(token: &AccessToken) -> [u8; ACCESS_TOKEN_LEN] {
    let mut out = [0u8; ACCESS_TOKEN_LEN];
    out[..16].copy_from_slice(token.delegate_id.as_bytes());
    out[16..24].copy_from_slice(&token.expires_at_ms.to_le_bytes());
    out[24..32].copy_from_slice(&token.nonce.to_le_bytes());
    out
}

pub fn decode_access_token(bytes: &[u8]) -> Result<AccessToken, CodecError> {
    if bytes.len() != ACCESS_TOKEN_LEN {
        return Err(CodecError::BadTokenLength(bytes.len()));
    }
    let delegate_id = DelegateId::from_slice(&bytes[..16])
        .ok_or(CodecError::BadTokenLength(bytes.len()))?;
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[16..24]);
    let expires_at_ms = u64::from_le_bytes(word);
    word.copy_from_slice(&bytes[24..32]);
    let nonce = u64::from_le_bytes(word);
    Ok(AccessToken {
        delegate_id,
        expires_at_ms,
        nonce,
    })
}

pub fn encode_refresh_token(token: &RefreshToken) -> [u8; REFRESH_TOKEN_LEN] {
    let mut out = [0u8; REFRESH_TOKEN_LEN];
    out[..16].copy_from_slice(token.delegate_id.as_bytes());
    out[16..24].copy_from_slice(&token.nonce.to_le_bytes());
    out
}

pub fn decode_refresh_token(bytes: &[u8]) -> Result<RefreshToken, CodecError> {
    if bytes.len() != REFRESH_TOKEN_LEN {
        return Err(CodecError::BadTokenLength(bytes.len()));
    }
    let delegate_id = DelegateId::from_slice(&bytes[..16])
        .ok_or(CodecError::BadTokenLength(bytes.len()))?;
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[16..24]);
    Ok(RefreshToken {
        delegate_id,
        nonce: u64::from_le_bytes(word),
    })
}

/// Fresh access token with a random nonce.
pub fn mint_access_token(delegate_id: DelegateId, expires_at_ms: u64) -> AccessToken {
    AccessToken {
        delegate_id,
        expires_at_ms,
        nonce: rand::thread_rng().next_u64(),
    }
}

/// Fresh refresh token with a random nonce.
pub fn mint_refresh_token(delegate_id: DelegateId) -> RefreshToken {
    RefreshToken {
        delegate_id,
        nonce: rand::thread_rng().next_u64(),
    }
}

/// Renders token bytes for the wire: URL-safe Base64 with padding
/// (32 bytes → 44 chars, 24 bytes → 32 chars).
pub fn to_wire(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

/// Decodes a bearer value back into raw token bytes.
pub fn from_wire(text: &str) -> Result<Vec<u8>, CodecError> {
    URL_SAFE
        .decode(text)
        .map_err(|_| CodecError::BadTokenEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trip_is_32_bytes() {
        let token = mint_access_token(DelegateId::from_raw([1; 16]), 1_700_000_000_000);
        let bytes = encode_access_token(&token);
        assert_eq!(bytes.len(), 32);
        assert_eq!(decode_access_token(&bytes).expect("decode"), token);
        assert_eq!(to_wire(&bytes).len(), 44);
    }

    #[test]
    fn refresh_token_round_trip_is_24_bytes() {
        let token = mint_refresh_token(DelegateId::from_raw([2; 16]));
        let bytes = encode_refresh_token(&token);
        assert_eq!(bytes.len(), 24);
        assert_eq!(decode_refresh_token(&bytes).expect("decode"), token);
        assert_eq!(to_wire(&bytes).len(), 32);
    }

    #[test]
    fn wire_round_trip() {
        let bytes = encode_refresh_token(&mint_refresh_token(DelegateId::from_raw([3; 16])));
        let wire = to_wire(&bytes);
        assert_eq!(from_wire(&wire).expect("decode"), bytes.to_vec());
        assert!(from_wire("not base64 !!!").is_err());
    }

    #[test]
    fn lengths_disambiguate() {
        let at = encode_access_token(&mint_access_token(DelegateId::from_raw([4; 16]), 10));
        assert!(decode_refresh_token(&at).is_err());
        let rt = encode_refresh_token(&mint_refresh_token(DelegateId::from_raw([4; 16])));
        assert!(decode_access_token(&rt).is_err());
    }
}
