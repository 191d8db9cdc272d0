//! Core trie types

use serde::{Deserialize, Serialize};

/// 32-byte hash
pub type Hash32 = [u8; 32];

/// A persisted trie node. Empty subtrees are not stored; they are
/// referenced by [`crate::EMPTY_ROOT`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Node {
    Leaf { key: Vec<u8>, value: Vec<u8> },
    Branch { left: Hash32, right: Hash32 },
}

impl Node {
    pub fn hash(&self) -> Hash32 {
        match self {
            Node::Leaf { key, value } => {
                crate::crypto::hash_leaf(crate::crypto::hash_key(key), crate::crypto::hash_value(value))
            }
            Node::Branch { left, right } => crate::crypto::hash_branch(*left, *right),
        }
    }
}

/// Merkle proof for one key, produced by the serving side.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrieProof {
    /// Sibling hashes from the root down to the terminal node
    pub siblings: Vec<Hash32>,
    /// Node the path ended on: the leaf for the key, a leaf for another
    /// key (proves absence), or `None` for an empty subtree.
    pub terminal: Option<Node>,
}
