use std::collections::HashMap;

use tracing::debug;

use crate::crypto::{self, path_bit, EMPTY_ROOT};
use crate::nodestore::NodeStore;
use crate::storage::Storage;
use crate::types::{Node, TrieProof};
use crate::{Hash32, Result, TrieError};

const DEPTH: usize = 256;

/// Binary Merkle trie over a [`NodeStore`].
///
/// Updates build new nodes in memory; nothing reaches the store until
/// [`Trie::commit`]. The shape is canonical (a leaf sits at the shallowest
/// depth where it is alone), so the root depends only on the entries.
pub struct Trie<S> {
    root: Hash32,
    db: NodeStore<S>,
    dirty: HashMap<Hash32, Node>,
}

impl<S: Storage> Trie<S> {
    /// Open the trie rooted at `root`. The empty root always opens; any
    /// other root must be present in `db`.
    pub fn new(root: Hash32, db: NodeStore<S>) -> Result<Self> {
        if root != EMPTY_ROOT && !db.contains(&root)? {
            return Err(TrieError::MissingNode(root));
        }
        Ok(Self {
            root,
            db,
            dirty: HashMap::new(),
        })
    }

    /// Current root, including uncommitted changes
    pub fn root(&self) -> Hash32 {
        self.root
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key_hash = crypto::hash_key(key);
        let mut current = self.root;
        let mut depth = 0;
        loop {
            if current == EMPTY_ROOT {
                return Ok(None);
            }
            match self.resolve(&current)? {
                Node::Leaf { key: k, value } => return Ok((k == key).then_some(value)),
                Node::Branch { left, right } => {
                    current = if path_bit(&key_hash, depth) { right } else { left };
                    depth += 1;
                }
            }
        }
    }

    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key_hash = crypto::hash_key(key);
        self.root = self.insert_at(self.root, 0, &key_hash, key, value)?;
        Ok(())
    }

    /// Remove `key`; absent keys are a no-op.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let key_hash = crypto::hash_key(key);
        self.root = self.delete_at(self.root, 0, &key_hash, key)?;
        Ok(())
    }

    /// Persist every new node reachable from the root in one batch.
    ///
    /// On failure nothing is dropped: the pending nodes stay in memory.
    pub fn commit(&mut self) -> Result<Hash32> {
        let mut batch = Vec::new();
        let mut stack = vec![self.root];
        while let Some(hash) = stack.pop() {
            if hash == EMPTY_ROOT {
                continue;
            }
            if let Some(node) = self.dirty.get(&hash) {
                if let Node::Branch { left, right } = node {
                    stack.push(*left);
                    stack.push(*right);
                }
                batch.push((hash, node.clone()));
            }
        }
        let count = batch.len();
        self.db.insert_batch(batch)?;
        self.dirty.clear();
        debug!(root = %hex::encode(self.root), nodes = count, "trie: committed");
        Ok(self.root)
    }

    /// Collect the path from the root toward `key`.
    pub fn prove(&self, key: &[u8]) -> Result<TrieProof> {
        let key_hash = crypto::hash_key(key);
        let mut siblings = Vec::new();
        let mut current = self.root;
        let mut depth = 0;
        loop {
            if current == EMPTY_ROOT {
                return Ok(TrieProof { siblings, terminal: None });
            }
            match self.resolve(&current)? {
                leaf @ Node::Leaf { .. } => {
                    return Ok(TrieProof {
                        siblings,
                        terminal: Some(leaf),
                    })
                }
                Node::Branch { left, right } => {
                    if path_bit(&key_hash, depth) {
                        siblings.push(left);
                        current = right;
                    } else {
                        siblings.push(right);
                        current = left;
                    }
                    depth += 1;
                }
            }
        }
    }

    fn resolve(&self, hash: &Hash32) -> Result<Node> {
        if let Some(node) = self.dirty.get(hash) {
            return Ok(node.clone());
        }
        self.db.get(hash)?.ok_or(TrieError::MissingNode(*hash))
    }

    fn store(&mut self, node: Node) -> Hash32 {
        let hash = node.hash();
        self.dirty.insert(hash, node);
        hash
    }

    /// Drop a superseded node if it was never persisted.
    fn discard(&mut self, old: Hash32, new: Hash32) {
        if old != new {
            self.dirty.remove(&old);
        }
    }

    fn insert_at(
        &mut self,
        node: Hash32,
        depth: usize,
        key_hash: &Hash32,
        key: &[u8],
        value: &[u8],
    ) -> Result<Hash32> {
        let leaf = Node::Leaf {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        if node == EMPTY_ROOT {
            return Ok(self.store(leaf));
        }
        match self.resolve(&node)? {
            Node::Leaf { key: existing, .. } if existing == key => {
                let new = self.store(leaf);
                self.discard(node, new);
                Ok(new)
            }
            Node::Leaf { key: existing, .. } => {
                // The existing leaf is re-parented, not replaced.
                let new = self.store(leaf);
                self.split(depth, node, &crypto::hash_key(&existing), new, key_hash)
            }
            Node::Branch { left, right } => {
                let (left, right) = if path_bit(key_hash, depth) {
                    (left, self.insert_at(right, depth + 1, key_hash, key, value)?)
                } else {
                    (self.insert_at(left, depth + 1, key_hash, key, value)?, right)
                };
                let new = self.store(Node::Branch { left, right });
                self.discard(node, new);
                Ok(new)
            }
        }
    }

    /// Build the smallest subtree at `depth` holding leaves `a` and `b`.
    fn split(
        &mut self,
        depth: usize,
        a: Hash32,
        a_path: &Hash32,
        b: Hash32,
        b_path: &Hash32,
    ) -> Result<Hash32> {
        let mut fork = depth;
        while fork < DEPTH && path_bit(a_path, fork) == path_bit(b_path, fork) {
            fork += 1;
        }
        if fork == DEPTH {
            return Err(TrieError::KeyCollision);
        }
        let mut current = if path_bit(a_path, fork) {
            self.store(Node::Branch { left: b, right: a })
        } else {
            self.store(Node::Branch { left: a, right: b })
        };
        for level in (depth..fork).rev() {
            let branch = if path_bit(a_path, level) {
                Node::Branch {
                    left: EMPTY_ROOT,
                    right: current,
                }
            } else {
                Node::Branch {
                    left: current,
                    right: EMPTY_ROOT,
                }
            };
            current = self.store(branch);
        }
        Ok(current)
    }

    fn delete_at(&mut self, node: Hash32, depth: usize, key_hash: &Hash32, key: &[u8]) -> Result<Hash32> {
        if node == EMPTY_ROOT {
            return Ok(EMPTY_ROOT);
        }
        match self.resolve(&node)? {
            Node::Leaf { key: existing, .. } => {
                if existing == key {
                    self.dirty.remove(&node);
                    Ok(EMPTY_ROOT)
                } else {
                    Ok(node)
                }
            }
            Node::Branch { left, right } => {
                let (new_left, new_right) = if path_bit(key_hash, depth) {
                    (left, self.delete_at(right, depth + 1, key_hash, key)?)
                } else {
                    (self.delete_at(left, depth + 1, key_hash, key)?, right)
                };
                if new_left == left && new_right == right {
                    return Ok(node);
                }
                self.dirty.remove(&node);
                self.collapse(new_left, new_right)
            }
        }
    }

    /// A branch left with a single leaf is replaced by that leaf.
    fn collapse(&mut self, left: Hash32, right: Hash32) -> Result<Hash32> {
        let only = match (left == EMPTY_ROOT, right == EMPTY_ROOT) {
            (true, true) => return Ok(EMPTY_ROOT),
            (true, false) => right,
            (false, true) => left,
            (false, false) => return Ok(self.store(Node::Branch { left, right })),
        };
        match self.resolve(&only)? {
            Node::Leaf { .. } => Ok(only),
            Node::Branch { .. } => Ok(self.store(Node::Branch { left, right })),
        }
    }
}
