use thiserror::Error;
use triedb::{Hash32, StorageError, TrieError};

use crate::bitutil;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot open trie at root {}", hex::encode(.root))]
    TrieOpen {
        root: Hash32,
        #[source]
        source: TrieError,
    },

    #[error("trie update failed")]
    Trie(#[source] TrieError),

    #[error("trie commit failed")]
    TrieCommit(#[source] TrieError),

    /// A canonical header without a total difficulty record. The chain store
    /// is corrupt; retrying cannot help.
    #[error("total difficulty missing for block {number} ({})", hex::encode(.hash))]
    MissingTotalDifficulty { number: u64, hash: Hash32 },

    #[error("bloom bits missing for bit {bit}, section {section}, head {}", hex::encode(.head))]
    MissingBloomData { bit: u16, section: u64, head: Hash32 },

    #[error("bloom column decompression failed: {0}")]
    Decompress(#[from] bitutil::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("block {number} is outside section {section}")]
    OutOfSection { number: u64, section: u64 },

    #[error("canonical header {number} missing")]
    MissingHeader { number: u64 },

    #[error("chain reorganised at block {number}")]
    Reorg { number: u64 },

    #[error("backend used before reset")]
    NotReset,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("bloom for block {got} added out of order, expected {expected}")]
    InvalidBloomIndex { expected: u64, got: u64 },

    #[error("bloom section already holds {size} blooms")]
    BloomSectionFull { size: u64 },

    #[error("bloom bit {0} out of bounds")]
    BloomBitOutOfBounds(usize),

    #[error("section incomplete: {have} of {want} blooms added")]
    IncompleteSection { have: u64, want: u64 },
}

impl IndexError {
    /// Errors that must stop indexing instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::MissingTotalDifficulty { .. })
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
