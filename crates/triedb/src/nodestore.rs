use crate::storage::Storage;
use crate::types::Node;
use crate::{Hash32, Result, TrieError};

/// Node database: bincode-encoded trie nodes keyed by their hash.
///
/// The store is normally a [`crate::Table`] so that each trie kind keeps its
/// nodes in its own namespace.
#[derive(Clone)]
pub struct NodeStore<S> {
    store: S,
}

impl<S: Storage> NodeStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self, hash: &Hash32) -> Result<Option<Node>> {
        match self.store.get(hash)? {
            Some(bytes) => {
                let node = bincode::deserialize(&bytes).map_err(|e| TrieError::Codec(e.to_string()))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    pub fn contains(&self, hash: &Hash32) -> Result<bool> {
        Ok(self.store.get(hash)?.is_some())
    }

    /// Persist nodes in a single batch
    pub fn insert_batch(&self, nodes: Vec<(Hash32, Node)>) -> Result<()> {
        let mut ops = Vec::with_capacity(nodes.len());
        for (hash, node) in nodes {
            let bytes = bincode::serialize(&node).map_err(|e| TrieError::Codec(e.to_string()))?;
            ops.push((hash.to_vec(), Some(bytes)));
        }
        self.store.write_batch(ops)?;
        Ok(())
    }
}
