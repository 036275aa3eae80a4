//! The depot mutator: path-indexed operations over an immutable tree.
//!
//! Every mutation rebuilds the Dict spine from the touched leaf up to the
//! root and returns the new root key; sibling subtrees are referenced
//! unchanged. Nothing here advances a depot head — callers commit the
//! returned root separately.

use bytes::Bytes;
use casfa_codec::node::{DictEntry, Node};
use casfa_codec::token::{from_wire, to_wire};
use casfa_codec::well_known::EMPTY_DICT_KEY;
use casfa_common::types::{NodeKey, NodeKind, Realm};

use crate::auth::{Policy, Principal};
use crate::error::CoreError;
use crate::nodes::NodeService;

const DEFAULT_LS_LIMIT: usize = 1000;
const MAX_LS_LIMIT: usize = 10_000;

/// `stat` result for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatView {
    pub kind: NodeKind,
    /// File payload length; canonical encoding length otherwise.
    pub size: u64,
    pub content_type: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsEntry {
    pub name: String,
    pub key: NodeKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsPage {
    pub entries: Vec<LsEntry>,
    /// Opaque continuation; absent on the last page.
    pub next_cursor: Option<String>,
}

/// Result of a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub new_root: NodeKey,
    /// Key of the node materialized for the operation, when one was.
    pub node: Option<NodeKey>,
}

#[derive(Debug, Clone)]
pub struct FsService {
    nodes: NodeService,
}

/// Splits `/a/b/c` into segments; `/` is the empty spine.
fn parse_path(path: &str) -> Result<Vec<String>, CoreError> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(CoreError::NotFound(format!("path {path:?} is not absolute")));
    };
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in rest.split('/') {
        if segment.is_empty() {
            return Err(CoreError::NotFound(format!(
                "path {path:?} has an empty segment"
            )));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

impl FsService {
    pub fn new(nodes: NodeService) -> Self {
        FsService { nodes }
    }

    /// Access gate shared by every operation: realm match, the root must
    /// be inside the delegate scope, readable by the caller, and write
    /// operations need upload rights.
    async fn check_tree_access(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        write: bool,
    ) -> Result<(), CoreError> {
        principal.check_realm(realm)?;
        self.nodes.check_scope(principal, realm, root).await?;
        if !self.nodes.can_read(principal, realm, root).await? {
            return Err(CoreError::Forbidden(
                "tree root is not owned by the caller".to_string(),
            ));
        }
        if write {
            principal.require(Policy::WriteNode)?;
        }
        Ok(())
    }

    async fn load_dict(
        &self,
        realm: &Realm,
        key: &NodeKey,
        path_hint: &str,
    ) -> Result<Vec<DictEntry>, CoreError> {
        let Some((_, node)) = self.nodes.load_node(realm, key).await? else {
            return Err(CoreError::NotFound(format!("node {key} ({path_hint})")));
        };
        match node {
            Node::Dict { entries } => Ok(entries),
            other => Err(CoreError::Conflict(format!(
                "{path_hint} is a {}, not a directory",
                other.kind().as_str()
            ))),
        }
    }

    /// Resolves a path to its node, descending the Dict spine by name.
    async fn resolve(
        &self,
        realm: &Realm,
        root: &NodeKey,
        segments: &[String],
    ) -> Result<(NodeKey, Node), CoreError> {
        let mut key = *root;
        for (idx, segment) in segments.iter().enumerate() {
            let here = format!("/{}", segments[..idx].join("/"));
            let entries = self.load_dict(realm, &key, &here).await?;
            key = entries
                .iter()
                .find(|e| e.name == *segment)
                .map(|e| e.key)
                .ok_or_else(|| CoreError::NotFound(format!("/{}", segments[..=idx].join("/"))))?;
        }
        let Some((_, node)) = self.nodes.load_node(realm, &key).await? else {
            return Err(CoreError::NotFound(format!("node {key}")));
        };
        Ok((key, node))
    }

    /// Walks the spine to the parent of `segments`, applies `mutate` to
    /// its entries, then rebuilds every touched dict bottom-up. The last
    /// element of `segments` names the entry being changed; everything
    /// before it must already exist as directories (no `mkdir -p`).
    async fn splice<F>(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        segments: &[String],
        mutate: F,
    ) -> Result<NodeKey, CoreError>
    where
        F: FnOnce(&mut Vec<DictEntry>) -> Result<(), CoreError>,
    {
        let (parent_segments, _leaf) = segments
            .split_last()
            .map(|(leaf, parents)| (parents, leaf))
            .ok_or_else(|| CoreError::Forbidden("refusing to replace the root".to_string()))?;

        // Collect the spine of (dict key, entries) down to the parent.
        let mut spine: Vec<Vec<DictEntry>> = Vec::with_capacity(parent_segments.len() + 1);
        let mut cursor = *root;
        spine.push(self.load_dict(realm, &cursor, "/").await?);
        for (idx, segment) in parent_segments.iter().enumerate() {
            let here = format!("/{}", parent_segments[..=idx].join("/"));
            let entry = spine
                .last()
                .and_then(|entries| entries.iter().find(|e| e.name == *segment))
                .ok_or_else(|| CoreError::NotFound(format!("parent {here} is missing")))?;
            cursor = entry.key;
            spine.push(self.load_dict(realm, &cursor, &here).await?);
        }

        let mut entries = spine.pop().unwrap_or_default();
        mutate(&mut entries)?;

        // Rebuild bottom-up, re-pointing each parent at its new child.
        let mut child_key = self
            .nodes
            .persist_node(realm, principal.delegate_id, &Node::Dict { entries })
            .await?;
        for (entries, segment) in spine.into_iter().zip(parent_segments.iter()).rev() {
            let mut entries = entries;
            let slot = entries
                .iter_mut()
                .find(|e| e.name == *segment)
                .ok_or_else(|| CoreError::NotFound(format!("parent {segment} is missing")))?;
            slot.key = child_key;
            child_key = self
                .nodes
                .persist_node(realm, principal.delegate_id, &Node::Dict { entries })
                .await?;
        }
        Ok(child_key)
    }

    pub async fn stat(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        path: &str,
    ) -> Result<StatView, CoreError> {
        self.check_tree_access(principal, realm, root, false).await?;
        let segments = parse_path(path)?;
        let (key, node) = self.resolve(realm, root, &segments).await?;
        let name = segments.last().cloned().unwrap_or_else(|| "/".to_string());
        let view = match node {
            Node::File { content_type, data } => StatView {
                kind: NodeKind::File,
                size: data.len() as u64,
                content_type: Some(content_type),
                name,
            },
            other => {
                let size = self
                    .nodes
                    .load_bytes(realm, &key)
                    .await?
                    .map(|b| b.len() as u64)
                    .unwrap_or_default();
                StatView {
                    kind: other.kind(),
                    size,
                    content_type: None,
                    name,
                }
            }
        };
        Ok(view)
    }

    pub async fn ls(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        path: &str,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<LsPage, CoreError> {
        self.check_tree_access(principal, realm, root, false).await?;
        let segments = parse_path(path)?;
        let (_, node) = self.resolve(realm, root, &segments).await?;
        let Node::Dict { entries } = node else {
            return Err(CoreError::Conflict(format!(
                "{path} is not a directory"
            )));
        };

        let offset = match cursor {
            Some(text) => decode_cursor(text)?,
            None => 0,
        };
        let limit = limit.unwrap_or(DEFAULT_LS_LIMIT).clamp(1, MAX_LS_LIMIT);
        let page: Vec<LsEntry> = entries
            .iter()
            .skip(offset)
            .take(limit)
            .map(|e| LsEntry {
                name: e.name.clone(),
                key: e.key,
            })
            .collect();
        let next = offset + page.len();
        let next_cursor = (next < entries.len()).then(|| encode_cursor(next));
        Ok(LsPage {
            entries: page,
            next_cursor,
        })
    }

    pub async fn read(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        path: &str,
    ) -> Result<(String, Bytes), CoreError> {
        self.check_tree_access(principal, realm, root, false).await?;
        let segments = parse_path(path)?;
        let (_, node) = self.resolve(realm, root, &segments).await?;
        match node {
            Node::File { content_type, data } => Ok((content_type, data)),
            other => Err(CoreError::Conflict(format!(
                "{path} is a {}, not a file",
                other.kind().as_str()
            ))),
        }
    }

    /// Materializes a File node for `data` and splices it at `path`,
    /// replacing any existing entry.
    pub async fn write(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        path: &str,
        data: Bytes,
        content_type: String,
    ) -> Result<Mutation, CoreError> {
        self.check_tree_access(principal, realm, root, true).await?;
        let segments = parse_path(path)?;
        let Some(leaf) = segments.last().cloned() else {
            return Err(CoreError::Forbidden(
                "refusing to overwrite the root".to_string(),
            ));
        };

        let file_key = self
            .nodes
            .persist_node(realm, principal.delegate_id, &Node::File { content_type, data })
            .await?;
        let new_root = self
            .splice(principal, realm, root, &segments, move |entries| {
                match entries.iter_mut().find(|e| e.name == leaf) {
                    Some(entry) => entry.key = file_key,
                    None => entries.push(DictEntry {
                        key: file_key,
                        name: leaf,
                    }),
                }
                Ok(())
            })
            .await?;
        Ok(Mutation {
            new_root,
            node: Some(file_key),
        })
    }

    /// Inserts the well-known empty dict under a new name.
    pub async fn mkdir(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        path: &str,
    ) -> Result<Mutation, CoreError> {
        self.check_tree_access(principal, realm, root, true).await?;
        let segments = parse_path(path)?;
        let Some(leaf) = segments.last().cloned() else {
            return Err(CoreError::Conflict("the root already exists".to_string()));
        };
        let new_root = self
            .splice(principal, realm, root, &segments, move |entries| {
                if entries.iter().any(|e| e.name == leaf) {
                    return Err(CoreError::Conflict(format!("{leaf} already exists")));
                }
                entries.push(DictEntry {
                    key: *EMPTY_DICT_KEY,
                    name: leaf,
                });
                Ok(())
            })
            .await?;
        Ok(Mutation {
            new_root,
            node: Some(*EMPTY_DICT_KEY),
        })
    }

    pub async fn rm(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        path: &str,
    ) -> Result<Mutation, CoreError> {
        self.check_tree_access(principal, realm, root, true).await?;
        let segments = parse_path(path)?;
        if segments.is_empty() {
            return Err(CoreError::Forbidden(
                "refusing to delete the root".to_string(),
            ));
        }
        let leaf = segments[segments.len() - 1].clone();
        let path_owned = path.to_string();
        let new_root = self
            .splice(principal, realm, root, &segments, move |entries| {
                let before = entries.len();
                entries.retain(|e| e.name != leaf);
                if entries.len() == before {
                    return Err(CoreError::NotFound(path_owned));
                }
                Ok(())
            })
            .await?;
        Ok(Mutation {
            new_root,
            node: None,
        })
    }

    /// References the subtree under a new name; no bytes are copied.
    pub async fn cp(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        from: &str,
        to: &str,
    ) -> Result<Mutation, CoreError> {
        self.check_tree_access(principal, realm, root, true).await?;
        let from_segments = parse_path(from)?;
        let to_segments = parse_path(to)?;
        if from_segments.is_empty() || to_segments.is_empty() {
            return Err(CoreError::Forbidden(
                "the root itself cannot be copied over".to_string(),
            ));
        }

        let (source_key, _) = self.resolve(realm, root, &from_segments).await?;
        let leaf = to_segments[to_segments.len() - 1].clone();
        let new_root = self
            .splice(principal, realm, root, &to_segments, move |entries| {
                if entries.iter().any(|e| e.name == leaf) {
                    return Err(CoreError::Conflict(format!("{leaf} already exists")));
                }
                entries.push(DictEntry {
                    key: source_key,
                    name: leaf,
                });
                Ok(())
            })
            .await?;
        Ok(Mutation {
            new_root,
            node: Some(source_key),
        })
    }

    /// Renames in place when `from` and `to` share a parent; otherwise
    /// literally `cp` followed by `rm` on the rewritten root.
    pub async fn mv(
        &self,
        principal: &Principal,
        realm: &Realm,
        root: &NodeKey,
        from: &str,
        to: &str,
    ) -> Result<Mutation, CoreError> {
        self.check_tree_access(principal, realm, root, true).await?;
        let from_segments = parse_path(from)?;
        let to_segments = parse_path(to)?;
        if from_segments.is_empty() || to_segments.is_empty() {
            return Err(CoreError::Forbidden("the root cannot be moved".to_string()));
        }
        if to_segments.starts_with(&from_segments) {
            return Err(CoreError::Conflict(
                "cannot move a directory into itself".to_string(),
            ));
        }

        if from_segments[..from_segments.len() - 1] == to_segments[..to_segments.len() - 1] {
            // Same parent: a single-dict rewrite.
            let from_name = from_segments[from_segments.len() - 1].clone();
            let to_name = to_segments[to_segments.len() - 1].clone();
            let from_owned = from.to_string();
            let new_root = self
                .splice(principal, realm, root, &from_segments, move |entries| {
                    if entries.iter().any(|e| e.name == to_name) {
                        return Err(CoreError::Conflict(format!("{to_name} already exists")));
                    }
                    let entry = entries
                        .iter_mut()
                        .find(|e| e.name == from_name)
                        .ok_or(CoreError::NotFound(from_owned))?;
                    entry.name = to_name;
                    Ok(())
                })
                .await?;
            return Ok(Mutation {
                new_root,
                node: None,
            });
        }

        let copied = self.cp(principal, realm, root, from, to).await?;
        let removed = self
            .rm(principal, realm, &copied.new_root, from)
            .await?;
        Ok(Mutation {
            new_root: removed.new_root,
            node: copied.node,
        })
    }
}

fn encode_cursor(offset: usize) -> String {
    to_wire(&(offset as u64).to_le_bytes())
}

fn decode_cursor(text: &str) -> Result<usize, CoreError> {
    let bytes =
        from_wire(text).map_err(|_| CoreError::NotFound("invalid cursor".to_string()))?;
    let raw: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CoreError::NotFound("invalid cursor".to_string()))?;
    Ok(u64::from_le_bytes(raw) as usize)
}
