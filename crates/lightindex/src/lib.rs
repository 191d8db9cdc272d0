//! Light client helper tries
//!
//! Builds the canonical hash trie (block number to hash and total difficulty)
//! and the bloom trie (filter bit and section to compressed bit column) over a
//! header chain, section by section, and stores one root per section keyed by
//! the section head.

pub mod backend;
pub mod bitutil;
pub mod bloombits;
pub mod bloomtrie;
pub mod checkpoint;
pub mod cht;
pub mod error;
pub mod indexer;
pub mod params;
pub mod rawdb;
pub mod roots;
pub mod types;

pub use backend::IndexerBackend;
pub use bloombits::{BloomBitsIndexerBackend, Generator};
pub use bloomtrie::{bloom_trie_key, bloom_trie_table, BloomTrieIndexerBackend};
pub use checkpoint::{CheckpointError, CheckpointRegistry, TrustedCheckpoint};
pub use cht::{cht_table, ChtIndexerBackend, ChtNode};
pub use error::{IndexError, Result};
pub use indexer::{
    bloom_trie_confirmations, new_bloom_bits_indexer, new_bloom_trie_indexer, new_cht_indexer, ChainIndexer,
    IndexerConfig, IndexerMode,
};
pub use roots::{get_cht_v2_root, RootTable, BLOOM_TRIE_ROOTS, CHT_ROOTS};
pub use types::{Bloom, Hash32, Header, ZERO_HASH};
