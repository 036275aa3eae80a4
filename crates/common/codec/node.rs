//! Canonical node encodings and key derivation.
//!
//! Layouts (integers little-endian, `vu` = LEB128 varint):
//!
//! ```text
//! File      0x01 ‖ ct_len:vu ‖ payload_len:u32 ‖ content_type ‖ payload
//! Dict      0x02 ‖ count:u32 ‖ (key:16 ‖ name_len:vu ‖ name)*
//! Successor 0x03 ‖ prev:16 ‖ meta_len:vu ‖ meta
//! Set       0x04 ‖ count:u32 ‖ key:16 *        (strictly ascending)
//! ```

use bytes::Bytes;
use casfa_common::types::{NODE_KEY_LEN, NodeKey, NodeKind, size_flag};

use crate::error::CodecError;
use crate::varint::{read_varint, write_varint};

const TAG_FILE: u8 = 0x01;
const TAG_DICT: u8 = 0x02;
const TAG_SUCCESSOR: u8 = 0x03;
const TAG_SET: u8 = 0x04;

/// One (key, name) directory entry; order is insertion order and is part
/// of the encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictEntry {
    pub key: NodeKey,
    pub name: String,
}

/// Decoded form of an immutable node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File {
        content_type: String,
        data: Bytes,
    },
    Dict {
        entries: Vec<DictEntry>,
    },
    Successor {
        prev: NodeKey,
        meta: Bytes,
    },
    Set {
        /// Strictly ascending, no duplicates.
        keys: Vec<NodeKey>,
    },
}

/// Derives the key for an already-encoded node: BLAKE3-128 of the bytes
/// with the first byte replaced by the size-class flag.
pub fn node_key_for(bytes: &[u8]) -> NodeKey {
    let digest = blake3::hash(bytes);
    let mut raw = [0u8; NODE_KEY_LEN];
    raw.copy_from_slice(&digest.as_bytes()[..NODE_KEY_LEN]);
    raw[0] = size_flag(bytes.len());
    NodeKey::from_raw(raw)
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::File { .. } => NodeKind::File,
            Node::Dict { .. } => NodeKind::Dict,
            Node::Successor { .. } => NodeKind::Successor,
            Node::Set { .. } => NodeKind::Set,
        }
    }

    pub fn empty_dict() -> Node {
        Node::Dict {
            entries: Vec::new(),
        }
    }

    pub fn empty_set() -> Node {
        Node::Set { keys: Vec::new() }
    }

    /// All child keys referenced by the body, one entry per occurrence.
    pub fn children(&self) -> Vec<NodeKey> {
        match self {
            Node::File { .. } => Vec::new(),
            Node::Dict { entries } => entries.iter().map(|e| e.key).collect(),
            Node::Successor { prev, .. } => vec![*prev],
            Node::Set { keys } => keys.clone(),
        }
    }

    /// Child occurrences that carry a ref-count: Dict entries and the
    /// Successor predecessor. Set members are a manifest, not references.
    pub fn counted_children(&self) -> Vec<NodeKey> {
        match self {
            Node::Dict { entries } => entries.iter().map(|e| e.key).collect(),
            Node::Successor { prev, .. } => vec![*prev],
            Node::File { .. } | Node::Set { .. } => Vec::new(),
        }
    }

    /// Produces the canonical encoding, enforcing the node and name limits.
    pub fn encode(&self, node_limit: usize, max_name_bytes: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        match self {
            Node::File { content_type, data } => {
                out.push(TAG_FILE);
                write_varint(&mut out, content_type.len() as u64);
                out.extend_from_slice(&(data.len() as u32).to_le_bytes());
                out.extend_from_slice(content_type.as_bytes());
                out.extend_from_slice(data);
            }
            Node::Dict { entries } => {
                out.push(TAG_DICT);
                out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
                for entry in entries {
                    let name_len = entry.name.len();
                    if name_len == 0 || name_len > max_name_bytes {
                        return Err(CodecError::NameTooLong {
                            size: name_len,
                            limit: max_name_bytes,
                        });
                    }
                    out.extend_from_slice(entry.key.as_bytes());
                    write_varint(&mut out, name_len as u64);
                    out.extend_from_slice(entry.name.as_bytes());
                }
            }
            Node::Successor { prev, meta } => {
                out.push(TAG_SUCCESSOR);
                out.extend_from_slice(prev.as_bytes());
                write_varint(&mut out, meta.len() as u64);
                out.extend_from_slice(meta);
            }
            Node::Set { keys } => {
                let mut sorted = keys.clone();
                sorted.sort();
                sorted.dedup();
                out.push(TAG_SET);
                out.extend_from_slice(&(sorted.len() as u32).to_le_bytes());
                for key in &sorted {
                    out.extend_from_slice(key.as_bytes());
                }
            }
        }
        if out.len() > node_limit {
            return Err(CodecError::NodeTooLarge {
                size: out.len(),
                limit: node_limit,
            });
        }
        Ok(out)
    }

    /// Parses a canonical encoding. Trailing bytes are rejected: the server
    /// derives structure from bytes, never from client-declared shape.
    pub fn decode(bytes: &[u8]) -> Result<Node, CodecError> {
        let (&tag, body) = bytes
            .split_first()
            .ok_or(CodecError::Malformed("empty node"))?;
        match tag {
            TAG_FILE => decode_file(body),
            TAG_DICT => decode_dict(body),
            TAG_SUCCESSOR => decode_successor(body),
            TAG_SET => decode_set(body),
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

fn take_key(input: &[u8]) -> Result<(NodeKey, &[u8]), CodecError> {
    if input.len() < NODE_KEY_LEN {
        return Err(CodecError::Malformed("truncated node key"));
    }
    let (head, rest) = input.split_at(NODE_KEY_LEN);
    let key = NodeKey::from_slice(head).ok_or(CodecError::Malformed("truncated node key"))?;
    Ok((key, rest))
}

fn take_u32(input: &[u8]) -> Result<(u32, &[u8]), CodecError> {
    if input.len() < 4 {
        return Err(CodecError::Malformed("truncated length field"));
    }
    let (head, rest) = input.split_at(4);
    let mut raw = [0u8; 4];
    raw.copy_from_slice(head);
    Ok((u32::from_le_bytes(raw), rest))
}

fn decode_file(body: &[u8]) -> Result<Node, CodecError> {
    let (ct_len, rest) = read_varint(body)?;
    let (payload_len, rest) = take_u32(rest)?;
    let ct_len = ct_len as usize;
    let payload_len = payload_len as usize;
    if rest.len() != ct_len + payload_len {
        return Err(CodecError::Malformed("file body length mismatch"));
    }
    let (ct_bytes, payload) = rest.split_at(ct_len);
    let content_type = std::str::from_utf8(ct_bytes)
        .map_err(|_| CodecError::Malformed("content type is not UTF-8"))?
        .to_owned();
    Ok(Node::File {
        content_type,
        data: Bytes::copy_from_slice(payload),
    })
}

fn decode_dict(body: &[u8]) -> Result<Node, CodecError> {
    let (count, mut rest) = take_u32(body)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (key, after_key) = take_key(rest)?;
        let (name_len, after_len) = read_varint(after_key)?;
        let name_len = name_len as usize;
        if after_len.len() < name_len {
            return Err(CodecError::Malformed("truncated entry name"));
        }
        let (name_bytes, after_name) = after_len.split_at(name_len);
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| CodecError::Malformed("entry name is not UTF-8"))?
            .to_owned();
        if name.is_empty() {
            return Err(CodecError::Malformed("empty entry name"));
        }
        entries.push(DictEntry { key, name });
        rest = after_name;
    }
    if !rest.is_empty() {
        return Err(CodecError::Malformed("trailing bytes after dict"));
    }
    Ok(Node::Dict { entries })
}

fn decode_successor(body: &[u8]) -> Result<Node, CodecError> {
    let (prev, rest) = take_key(body)?;
    let (meta_len, rest) = read_varint(rest)?;
    if rest.len() != meta_len as usize {
        return Err(CodecError::Malformed("successor meta length mismatch"));
    }
    Ok(Node::Successor {
        prev,
        meta: Bytes::copy_from_slice(rest),
    })
}

fn decode_set(body: &[u8]) -> Result<Node, CodecError> {
    let (count, mut rest) = take_u32(body)?;
    let mut keys: Vec<NodeKey> = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (key, after) = take_key(rest)?;
        if let Some(last) = keys.last()
            && *last >= key
        {
            return Err(CodecError::Malformed("set keys not strictly ascending"));
        }
        keys.push(key);
        rest = after;
    }
    if !rest.is_empty() {
        return Err(CodecError::Malformed("trailing bytes after set"));
    }
    Ok(Node::Set { keys })
}

#[cfg(test)]
mod tests {
    use super::*;
    use casfa_common::config::{DEFAULT_MAX_NAME_BYTES, DEFAULT_NODE_LIMIT};

    fn encode(node: &Node) -> Vec<u8> {
        node.encode(DEFAULT_NODE_LIMIT, DEFAULT_MAX_NAME_BYTES)
            .expect("encode")
    }

    fn key(b: u8) -> NodeKey {
        NodeKey::from_raw([b; 16])
    }

    #[test]
    fn file_layout_is_stable() {
        let node = Node::File {
            content_type: "text/plain".into(),
            data: Bytes::from_static(b"hello\n"),
        };
        let bytes = encode(&node);
        assert_eq!(bytes[0], TAG_FILE);
        assert_eq!(bytes[1], 10); // content-type length varint
        assert_eq!(&bytes[2..6], &6u32.to_le_bytes());
        assert_eq!(&bytes[6..16], b"text/plain");
        assert_eq!(&bytes[16..], b"hello\n");
        assert_eq!(Node::decode(&bytes).expect("decode"), node);
    }

    #[test]
    fn dict_round_trip_preserves_order_and_duplicates() {
        let node = Node::Dict {
            entries: vec![
                DictEntry {
                    key: key(9),
                    name: "b.txt".into(),
                },
                DictEntry {
                    key: key(9),
                    name: "a.txt".into(),
                },
            ],
        };
        let bytes = encode(&node);
        let decoded = Node::decode(&bytes).expect("decode");
        assert_eq!(decoded, node);
        assert_eq!(decoded.counted_children(), vec![key(9), key(9)]);
    }

    #[test]
    fn set_is_canonicalized_on_encode_and_strict_on_decode() {
        let node = Node::Set {
            keys: vec![key(5), key(1), key(5)],
        };
        let bytes = encode(&node);
        assert_eq!(
            Node::decode(&bytes).expect("decode"),
            Node::Set {
                keys: vec![key(1), key(5)],
            }
        );
        // duplicate keys on the wire are rejected
        let mut forged = vec![TAG_SET];
        forged.extend_from_slice(&2u32.to_le_bytes());
        forged.extend_from_slice(key(1).as_bytes());
        forged.extend_from_slice(key(1).as_bytes());
        assert!(Node::decode(&forged).is_err());
    }

    #[test]
    fn successor_round_trip() {
        let node = Node::Successor {
            prev: key(3),
            meta: Bytes::from_static(b"chunk=2"),
        };
        let bytes = encode(&node);
        assert_eq!(Node::decode(&bytes).expect("decode"), node);
        assert_eq!(node.counted_children(), vec![key(3)]);
    }

    #[test]
    fn equal_content_equal_key() {
        let a = encode(&Node::File {
            content_type: "text/plain".into(),
            data: Bytes::from_static(b"hi"),
        });
        let b = encode(&Node::File {
            content_type: "text/plain".into(),
            data: Bytes::from_static(b"hi"),
        });
        assert_eq!(node_key_for(&a), node_key_for(&b));
        let c = encode(&Node::File {
            content_type: "text/plain".into(),
            data: Bytes::from_static(b"hi!"),
        });
        assert_ne!(node_key_for(&a), node_key_for(&c));
    }

    #[test]
    fn key_carries_size_flag() {
        let bytes = encode(&Node::File {
            content_type: "application/octet-stream".into(),
            data: Bytes::from(vec![0u8; 100_000]),
        });
        let derived = node_key_for(&bytes);
        assert_eq!(derived.size_class(), size_flag(bytes.len()));
    }

    #[test]
    fn encoder_enforces_limits() {
        let node = Node::File {
            content_type: "application/octet-stream".into(),
            data: Bytes::from(vec![0u8; 64]),
        };
        assert!(matches!(
            node.encode(32, DEFAULT_MAX_NAME_BYTES),
            Err(CodecError::NodeTooLarge { .. })
        ));
        let dict = Node::Dict {
            entries: vec![DictEntry {
                key: key(1),
                name: "x".repeat(300),
            }],
        };
        assert!(matches!(
            dict.encode(DEFAULT_NODE_LIMIT, DEFAULT_MAX_NAME_BYTES),
            Err(CodecError::NameTooLong { .. })
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Node::decode(&[]).is_err());
        assert!(matches!(
            Node::decode(&[0x09, 0x00]),
            Err(CodecError::UnknownTag(0x09))
        ));
        // trailing bytes after a valid dict
        let mut bytes = encode(&Node::empty_dict());
        bytes.push(0);
        assert!(Node::decode(&bytes).is_err());
    }
}
