//! # CASFA codec
//!
//! The only canonical serialization of node kinds and capability tokens.
//! Implementations MUST round-trip byte-exact: a node's identity is the
//! BLAKE3-128 digest of the bytes this crate produces (first byte replaced
//! by the size-class flag), so any drift here changes every key.
//!
//! Encoding conventions: integers are little-endian, variable-length
//! counts are LEB128, no trailing padding anywhere.

pub mod error;
pub mod node;
pub mod pop;
pub mod token;
pub mod varint;
pub mod well_known;

pub use error::CodecError;
pub use node::{DictEntry, Node, node_key_for};
pub use pop::{compute_pop, verify_pop};
pub use well_known::{EMPTY_DICT_KEY, EMPTY_SET_KEY, is_well_known, well_known_bytes};
