//! Well-known nodes: the empty dict and the empty set.
//!
//! Both are addressable without prior upload; `get` and `metadata`
//! synthesize their bytes at read time, and a delegate whose scope is the
//! empty set ranges over its entire realm.

use casfa_common::config::{DEFAULT_MAX_NAME_BYTES, DEFAULT_NODE_LIMIT};
use casfa_common::types::NodeKey;
use lazy_static::lazy_static;

use crate::node::{Node, node_key_for};

lazy_static! {
    /// Canonical bytes of the zero-entry dict.
    pub static ref EMPTY_DICT_BYTES: Vec<u8> = encode_well_known(Node::empty_dict());
    /// Canonical bytes of the zero-element set.
    pub static ref EMPTY_SET_BYTES: Vec<u8> = encode_well_known(Node::empty_set());
    /// Key of the empty dict.
    pub static ref EMPTY_DICT_KEY: NodeKey = node_key_for(&EMPTY_DICT_BYTES);
    /// Key of the empty set.
    pub static ref EMPTY_SET_KEY: NodeKey = node_key_for(&EMPTY_SET_BYTES);
}

fn encode_well_known(node: Node) -> Vec<u8> {
    // Empty nodes are a handful of bytes; encoding cannot hit the limits.
    node.encode(DEFAULT_NODE_LIMIT, DEFAULT_MAX_NAME_BYTES)
        .expect("well-known nodes encode within the default limits")
}

/// True for the two constants above.
pub fn is_well_known(key: &NodeKey) -> bool {
    *key == *EMPTY_DICT_KEY || *key == *EMPTY_SET_KEY
}

/// The implicit content of a well-known key, if `key` is one.
pub fn well_known_bytes(key: &NodeKey) -> Option<&'static [u8]> {
    if *key == *EMPTY_DICT_KEY {
        Some(&EMPTY_DICT_BYTES)
    } else if *key == *EMPTY_SET_KEY {
        Some(&EMPTY_SET_BYTES)
    } else {
        None
    }
}
