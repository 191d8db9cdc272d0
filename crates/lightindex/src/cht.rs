//! Canonical hash trie
//!
//! One trie leaf per block: `u64_be(number) → (hash, total difficulty)`.
//! Each section's trie is opened on top of the previous section's root, so
//! the committed roots form a hash chain.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use triedb::{NodeStore, Storage, Table, Trie};

use crate::backend::IndexerBackend;
use crate::error::{IndexError, Result};
use crate::params::{CHT_FREQUENCY_CLIENT, CHT_TABLE_PREFIX};
use crate::rawdb;
use crate::roots::CHT_ROOTS;
use crate::types::{be_biguint, Hash32, Header, ZERO_HASH};

/// CHT leaf value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChtNode {
    pub hash: Hash32,
    #[serde(with = "be_biguint")]
    pub td: BigUint,
}

impl ChtNode {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| IndexError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| IndexError::Codec(e.to_string()))
    }
}

/// Trie node namespace shared by all CHT sections.
pub fn cht_table<S: Storage>(diskdb: S) -> Table<S> {
    Table::new(diskdb, CHT_TABLE_PREFIX)
}

pub struct ChtIndexerBackend<S: Storage + Clone> {
    diskdb: S,
    section_size: u64,
    section: u64,
    last_hash: Hash32,
    trie: Option<Trie<Table<S>>>,
}

impl<S: Storage + Clone> ChtIndexerBackend<S> {
    pub fn new(diskdb: S, section_size: u64) -> Self {
        Self {
            diskdb,
            section_size,
            section: 0,
            last_hash: ZERO_HASH,
            trie: None,
        }
    }

    pub fn section_size(&self) -> u64 {
        self.section_size
    }

    /// The trie of the section in progress, if any.
    pub fn trie(&self) -> Option<&Trie<Table<S>>> {
        self.trie.as_ref()
    }

    /// Look up the CHT leaf for `number` in the current trie.
    pub fn get(&self, number: u64) -> Result<Option<ChtNode>> {
        let trie = self.trie.as_ref().ok_or(IndexError::NotReset)?;
        match trie.get(&number.to_be_bytes()).map_err(IndexError::Trie)? {
            Some(bytes) => ChtNode::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

impl<S: Storage + Clone> IndexerBackend for ChtIndexerBackend<S> {
    fn reset(&mut self, section: u64, last_head: &Hash32) -> Result<()> {
        let root = if section > 0 {
            CHT_ROOTS.get(&self.diskdb, section - 1, last_head)?
        } else {
            ZERO_HASH
        };
        let db = NodeStore::new(cht_table(self.diskdb.clone()));
        let trie = Trie::new(root, db).map_err(|source| IndexError::TrieOpen { root, source })?;
        self.trie = Some(trie);
        self.section = section;
        self.last_hash = *last_head;
        Ok(())
    }

    fn process(&mut self, header: &Header) -> Result<()> {
        let trie = self.trie.as_mut().ok_or(IndexError::NotReset)?;
        let (hash, number) = (header.hash(), header.number);
        if number / self.section_size != self.section {
            return Err(IndexError::OutOfSection {
                number,
                section: self.section,
            });
        }
        let td = rawdb::read_td(&self.diskdb, number, &hash)?
            .ok_or(IndexError::MissingTotalDifficulty { number, hash })?;

        let node = ChtNode { hash, td };
        trie.update(&number.to_be_bytes(), &node.encode()?)
            .map_err(IndexError::Trie)?;
        self.last_hash = hash;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let trie = self.trie.as_mut().ok_or(IndexError::NotReset)?;
        let root = trie.commit().map_err(IndexError::TrieCommit)?;

        if ((self.section + 1) * self.section_size) % CHT_FREQUENCY_CLIENT == 0 {
            info!(
                section = self.section * self.section_size / CHT_FREQUENCY_CLIENT,
                head = %hex::encode(self.last_hash),
                root = %hex::encode(root),
                "cht: storing root"
            );
        } else {
            debug!(
                section = self.section,
                head = %hex::encode(self.last_hash),
                root = %hex::encode(root),
                "cht: storing root"
            );
        }
        CHT_ROOTS.put(&self.diskdb, self.section, &self.last_hash, &root)
    }
}
