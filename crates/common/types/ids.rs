//! Prefixed 16-byte identifiers: realms, delegates, depots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;
use uuid::Uuid;

use crate::base32::{self, Base32Error};

/// Namespace under which non-UUID subject strings are folded into a UUID
/// (and from there into a realm). Fixed forever; changing it remaps every
/// externally-derived realm.
const REALM_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x1e, 0x41, 0x5a, 0x9d, 0x10, 0x4c, 0x0f, 0x8e, 0x21, 0x52, 0x33, 0x7b, 0x04, 0xd9, 0xaa,
]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("identifier must start with `{0}`")]
    MissingPrefix(&'static str),
    #[error(transparent)]
    Base32(#[from] Base32Error),
}

macro_rules! prefixed_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 16]);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub const fn from_raw(raw: [u8; 16]) -> Self {
                $name(raw)
            }

            pub fn from_slice(slice: &[u8]) -> Option<Self> {
                let raw: [u8; 16] = slice.try_into().ok()?;
                Some($name(raw))
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, base32::encode(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let rest = s
                    .strip_prefix($prefix)
                    .ok_or(IdParseError::MissingPrefix($prefix))?;
                let bytes = base32::decode(rest, 16)?;
                let mut raw = [0u8; 16];
                raw.copy_from_slice(&bytes);
                Ok($name(raw))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(de::Error::custom)
            }
        }
    };
}

prefixed_id!(
    /// Per-user namespace: the unit of quota, access control and dedup.
    Realm,
    "usr_"
);
prefixed_id!(
    /// Persistent capability principal identifier (UUIDv7 raw bytes).
    DelegateId,
    "tkn_"
);
prefixed_id!(
    /// Mutable named head over the node DAG.
    DepotId,
    "depot:"
);

impl Realm {
    /// Derives the realm for an authenticated subject.
    ///
    /// Subjects that already are UUIDs map directly; anything else is
    /// folded through UUIDv5 under a fixed namespace so the mapping stays
    /// deterministic across restarts and nodes.
    pub fn for_subject(subject: &str) -> Self {
        let uuid = Uuid::parse_str(subject)
            .unwrap_or_else(|_| Uuid::new_v5(&REALM_NAMESPACE, subject.as_bytes()));
        Realm(uuid.into_bytes())
    }
}

impl DelegateId {
    /// Mints a fresh time-ordered delegate id.
    pub fn generate() -> Self {
        DelegateId(Uuid::now_v7().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realm_derivation_is_deterministic() {
        let uuid_subject = "0192e4b2-7a90-7bbc-9d52-1c7e3f8a9b10";
        assert_eq!(
            Realm::for_subject(uuid_subject),
            Realm::for_subject(uuid_subject)
        );
        assert_eq!(Realm::for_subject("alice"), Realm::for_subject("alice"));
        assert_ne!(Realm::for_subject("alice"), Realm::for_subject("bob"));
    }

    #[test]
    fn prefixes_do_not_cross_parse() {
        let realm = Realm::for_subject("alice");
        let text = realm.to_string();
        assert!(text.starts_with("usr_"));
        assert!(text.parse::<DelegateId>().is_err());
        assert_eq!(text.parse::<Realm>().expect("parse"), realm);
    }

    #[test]
    fn depot_text_form() {
        let depot = DepotId::from_raw([3u8; 16]);
        let text = depot.to_string();
        assert!(text.starts_with("depot:"));
        assert_eq!(text.parse::<DepotId>().expect("parse"), depot);
    }
}
