//! Trusted checkpoints
//!
//! Pre-agreed (section, head, CHT root, bloom trie root) anchors keyed by
//! genesis hash. A client that finds its genesis here can start from the
//! anchored section instead of indexing history itself.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::types::Hash32;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("invalid checkpoint table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid hex in field {field}: {source}")]
    Hex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("field {field} must be 32 bytes, got {len}")]
    Length { field: &'static str, len: usize },

    #[error("duplicate checkpoint for genesis {}", hex::encode(.0))]
    Duplicate(Hash32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedCheckpoint {
    pub name: String,
    pub section_index: u64,
    pub section_head: Hash32,
    pub cht_root: Hash32,
    pub bloom_trie_root: Hash32,
}

#[derive(Clone, Debug, Default)]
pub struct CheckpointRegistry {
    by_genesis: HashMap<Hash32, TrustedCheckpoint>,
}

/// Genesis hash of mainnet, hex encoded.
pub const MAINNET_GENESIS: &str = "d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3";
/// Genesis hash of ropsten, hex encoded.
pub const ROPSTEN_GENESIS: &str = "41941023680923e0fe4d74a34bdac8141f2540e3ae90623718e47d66d1ca4a2d";

/// genesis, name, section, head, cht root, bloom trie root
const BUILTIN: [(&str, &str, u64, &str, &str, &str); 2] = [
    (
        MAINNET_GENESIS,
        "mainnet",
        170,
        "3bb2c28bcce463d57968f14f56cdb3fbf35349ab7a701f44c1afb57349c9a356",
        "d92b6d0853455f8439086292338e87f69781921680dd7aa072fb71547b87415e",
        "e4e8250a2fefddead7ae42daecd848cbf9b66d748a8270f8bbd4370b764bb9e9",
    ),
    (
        ROPSTEN_GENESIS,
        "ropsten",
        97,
        "719448c67c01eb5b9f27833a36a4e34612f66801316d7ff37daf9e77fb4cd095",
        "a7857afc15930ca6e583b6c3d563a025144011655843d52d28e2fdaadd417bea",
        "9c71d4b50cbec86dfeaa8e08992de8a4667b81d13c54d6522b17ce2fc5d36416",
    ),
];

impl CheckpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the compiled-in network anchors.
    pub fn builtin() -> Result<Self, CheckpointError> {
        let mut registry = Self::new();
        for (genesis, name, section_index, section_head, cht_root, bloom_trie_root) in BUILTIN {
            registry.insert_entry(CheckpointEntry {
                genesis: genesis.into(),
                name: name.into(),
                section_index,
                section_head: section_head.into(),
                cht_root: cht_root.into(),
                bloom_trie_root: bloom_trie_root.into(),
            })?;
        }
        Ok(registry)
    }

    /// Parse a JSON array of checkpoints. Hashes are hex, `0x` optional.
    ///
    /// ```json
    /// [{"genesis": "0x…", "name": "devnet", "section_index": 3,
    ///   "section_head": "0x…", "cht_root": "0x…", "bloom_trie_root": "0x…"}]
    /// ```
    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let entries: Vec<CheckpointEntry> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for entry in entries {
            registry.insert_entry(entry)?;
        }
        Ok(registry)
    }

    fn insert_entry(&mut self, entry: CheckpointEntry) -> Result<(), CheckpointError> {
        let genesis = parse_hash("genesis", &entry.genesis)?;
        let checkpoint = TrustedCheckpoint {
            name: entry.name,
            section_index: entry.section_index,
            section_head: parse_hash("section_head", &entry.section_head)?,
            cht_root: parse_hash("cht_root", &entry.cht_root)?,
            bloom_trie_root: parse_hash("bloom_trie_root", &entry.bloom_trie_root)?,
        };
        self.insert(genesis, checkpoint)
    }

    pub fn insert(&mut self, genesis: Hash32, checkpoint: TrustedCheckpoint) -> Result<(), CheckpointError> {
        if self.by_genesis.contains_key(&genesis) {
            return Err(CheckpointError::Duplicate(genesis));
        }
        self.by_genesis.insert(genesis, checkpoint);
        Ok(())
    }

    /// Add every entry of `other`; a genesis present in both is an error.
    pub fn merge(&mut self, other: CheckpointRegistry) -> Result<(), CheckpointError> {
        for (genesis, checkpoint) in other.by_genesis {
            self.insert(genesis, checkpoint)?;
        }
        Ok(())
    }

    pub fn lookup(&self, genesis: &Hash32) -> Option<&TrustedCheckpoint> {
        self.by_genesis.get(genesis)
    }

    pub fn len(&self) -> usize {
        self.by_genesis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_genesis.is_empty()
    }
}

#[derive(Deserialize)]
struct CheckpointEntry {
    genesis: String,
    name: String,
    section_index: u64,
    section_head: String,
    cht_root: String,
    bloom_trie_root: String,
}

/// Decode a 32-byte hex hash, `0x` optional.
pub fn parse_hash(field: &'static str, s: &str) -> Result<Hash32, CheckpointError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|source| CheckpointError::Hex { field, source })?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CheckpointError::Length { field, len })
}
