//! Content-addressed node keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

use crate::base32::{self, Base32Error};

/// Raw length of a [`NodeKey`].
pub const NODE_KEY_LEN: usize = 16;

const TEXT_PREFIX: &str = "nod_";

/// Upper bounds (inclusive) of the size-class buckets encoded into a
/// node key's first byte. Stable across backends and implementations;
/// changing it changes every derived key.
const SIZE_CLASS_BOUNDS: [usize; 6] = [
    4 * 1024,
    16 * 1024,
    64 * 1024,
    256 * 1024,
    1024 * 1024,
    4 * 1024 * 1024,
];

/// Maps an encoded node length to its size-class flag.
///
/// The flag is a bucket index, not a length: equal content always yields
/// the same flag, and stores may pick block layouts from it without
/// re-hashing.
pub fn size_flag(len: usize) -> u8 {
    for (idx, bound) in SIZE_CLASS_BOUNDS.iter().enumerate() {
        if len <= *bound {
            return idx as u8;
        }
    }
    SIZE_CLASS_BOUNDS.len() as u8
}

/// 16-byte content-addressed node identifier.
///
/// Byte 0 is the size-class flag; bytes 1..16 are the tail of the
/// BLAKE3-128 digest of the node's canonical encoding. Textually rendered
/// as `nod_` + Crockford-Base32.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey([u8; NODE_KEY_LEN]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeKeyParseError {
    #[error("node key must start with `{TEXT_PREFIX}`")]
    MissingPrefix,
    #[error(transparent)]
    Base32(#[from] Base32Error),
}

impl NodeKey {
    pub const fn from_raw(raw: [u8; NODE_KEY_LEN]) -> Self {
        NodeKey(raw)
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let raw: [u8; NODE_KEY_LEN] = slice.try_into().ok()?;
        Some(NodeKey(raw))
    }

    pub fn as_bytes(&self) -> &[u8; NODE_KEY_LEN] {
        &self.0
    }

    /// The size-class flag carried in the first byte.
    pub fn size_class(&self) -> u8 {
        self.0[0]
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TEXT_PREFIX}{}", base32::encode(&self.0))
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({self})")
    }
}

impl FromStr for NodeKey {
    type Err = NodeKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(TEXT_PREFIX)
            .ok_or(NodeKeyParseError::MissingPrefix)?;
        let bytes = base32::decode(rest, NODE_KEY_LEN)?;
        let mut raw = [0u8; NODE_KEY_LEN];
        raw.copy_from_slice(&bytes);
        Ok(NodeKey(raw))
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_flags_bucket_by_length() {
        assert_eq!(size_flag(0), 0);
        assert_eq!(size_flag(4096), 0);
        assert_eq!(size_flag(4097), 1);
        assert_eq!(size_flag(16 * 1024), 1);
        assert_eq!(size_flag(1024 * 1024), 4);
        assert_eq!(size_flag(4 * 1024 * 1024), 5);
        assert_eq!(size_flag(4 * 1024 * 1024 + 1), 6);
    }

    #[test]
    fn text_round_trip() {
        let key = NodeKey::from_raw([7u8; 16]);
        let text = key.to_string();
        assert!(text.starts_with("nod_"));
        assert_eq!(text.len(), 4 + 26);
        assert_eq!(text.parse::<NodeKey>().expect("parse"), key);
    }

    #[test]
    fn rejects_foreign_prefix() {
        assert!(matches!(
            "usr_0000000000000000000000000000".parse::<NodeKey>(),
            Err(NodeKeyParseError::MissingPrefix)
        ));
    }
}
