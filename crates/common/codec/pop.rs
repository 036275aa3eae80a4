//! Keyed proof-of-possession.
//!
//! `pop:` + Crockford-Base32 of the first 16 bytes of
//! BLAKE3-keyed(key = binary access token, input = node bytes). The AT is
//! exactly the 32 bytes BLAKE3 wants as a key, nonce included, so a proof
//! binds both the bytes and the presenting credential.

use casfa_common::base32;
use casfa_common::types::ACCESS_TOKEN_LEN;

const POP_PREFIX: &str = "pop:";
const POP_DIGEST_LEN: usize = 16;

/// Computes the proof a client holding `at_bytes` would present for
/// `node_bytes`. Returns `None` when the credential is not a binary AT
/// (JWT-derived roots have no token bytes and skip PoP entirely).
pub fn compute_pop(at_bytes: &[u8], node_bytes: &[u8]) -> Option<String> {
    let key: &[u8; ACCESS_TOKEN_LEN] = at_bytes.try_into().ok()?;
    let digest = blake3::keyed_hash(key, node_bytes);
    Some(format!(
        "{POP_PREFIX}{}",
        base32::encode(&digest.as_bytes()[..POP_DIGEST_LEN])
    ))
}

/// Recomputes the proof server-side and compares against the presented
/// value, case-insensitively (the text form is Crockford).
pub fn verify_pop(at_bytes: &[u8], node_bytes: &[u8], presented: &str) -> bool {
    match compute_pop(at_bytes, node_bytes) {
        Some(expected) => expected.eq_ignore_ascii_case(presented),
        None => false,
    }
}
