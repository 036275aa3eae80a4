//! Depot records: mutable named heads over the immutable node DAG.

use serde::{Deserialize, Serialize};

use super::ids::{DepotId, Realm};
use super::keys::NodeKey;

/// A named, mutable head plus a bounded trail of previous roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Depot {
    pub id: DepotId,
    pub realm: Realm,
    pub title: String,
    /// Current root; always a Dict node.
    pub root: NodeKey,
    /// Previous roots, most recent first, length ≤ `max_history`.
    pub history: Vec<NodeKey>,
    pub max_history: usize,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Depot {
    /// Advances the head, pushing the old root into bounded history.
    pub fn advance(&mut self, new_root: NodeKey, now_ms: u64) {
        self.history.insert(0, self.root);
        self.history.truncate(self.max_history);
        self.root = new_root;
        self.updated_at_ms = now_ms;
    }

    /// Re-applies the history bound after `max_history` was lowered.
    pub fn clamp_history(&mut self) {
        self.history.truncate(self.max_history);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> NodeKey {
        NodeKey::from_raw([b; 16])
    }

    #[test]
    fn advance_bounds_history() {
        let mut depot = Depot {
            id: DepotId::from_raw([1; 16]),
            realm: Realm::from_raw([2; 16]),
            title: "main".into(),
            root: key(0),
            history: Vec::new(),
            max_history: 2,
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        for i in 1..=4u8 {
            depot.advance(key(i), u64::from(i));
        }
        assert_eq!(depot.root, key(4));
        assert_eq!(depot.history, vec![key(3), key(2)]);
        assert_eq!(depot.updated_at_ms, 4);
    }
}
