//! Persistent Merkle trie
//!
//! Content-addressed binary Merkle trie on top of a raw key-value store,
//! with namespaced tables so several tries can share one store.

mod crypto;
mod nodestore;
mod storage;
mod trie;
mod types;

pub use crypto::{hash_branch, hash_key, hash_leaf, hash_value, EMPTY_ROOT};
pub use nodestore::NodeStore;
pub use storage::{BatchOp, InMemoryStorage, Storage, StorageError, Table};
pub use trie::Trie;
pub use types::{Hash32, Node, TrieProof};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("missing trie node {}", hex::encode(.0))]
    MissingNode(Hash32),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("node codec error: {0}")]
    Codec(String),

    #[error("distinct keys with identical path hash")]
    KeyCollision,
}

pub type Result<T> = std::result::Result<T, TrieError>;
