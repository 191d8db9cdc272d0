//! Section driver
//!
//! [`ChainIndexer`] walks the canonical chain in fixed-size sections and feeds
//! each confirmed section through an [`IndexerBackend`]. Progress (number of
//! valid sections and the head of each) lives in the indexer's own table so a
//! restart resumes where it stopped and a reorg rolls back only what changed.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use triedb::{BatchOp, Storage, Table};

use crate::backend::IndexerBackend;
use crate::bloombits::BloomBitsIndexerBackend;
use crate::bloomtrie::BloomTrieIndexerBackend;
use crate::cht::ChtIndexerBackend;
use crate::error::{IndexError, Result};
use crate::params::*;
use crate::rawdb;
use crate::types::{Hash32, ZERO_HASH};

const COUNT_KEY: &[u8] = b"count";
const SECTION_HEAD_PREFIX: &[u8] = b"shead";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerMode {
    /// Light client: coarse sections, deep confirmations.
    Client,
    /// Serving node: fine sections, shallow confirmations.
    Server,
}

impl IndexerMode {
    pub fn helper_confirmations(self) -> u64 {
        match self {
            IndexerMode::Client => HELPER_TRIE_CONFIRMATIONS,
            IndexerMode::Server => HELPER_TRIE_PROCESS_CONFIRMATIONS,
        }
    }

    pub fn cht_section_size(self) -> u64 {
        match self {
            IndexerMode::Client => CHT_FREQUENCY_CLIENT,
            IndexerMode::Server => CHT_FREQUENCY_SERVER,
        }
    }

    /// Raw bloom-bits section size the bloom trie is assembled from.
    pub fn bloom_trie_parent_size(self) -> u64 {
        match self {
            IndexerMode::Client => BLOOM_TRIE_FREQUENCY,
            IndexerMode::Server => BLOOM_BITS_SECTION,
        }
    }
}

impl fmt::Display for IndexerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexerMode::Client => write!(f, "client"),
            IndexerMode::Server => write!(f, "server"),
        }
    }
}

impl FromStr for IndexerMode {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(IndexerMode::Client),
            "server" => Ok(IndexerMode::Server),
            other => Err(IndexError::Config(format!("unknown indexer mode '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Blocks per section
    pub section_size: u64,
    /// Blocks that must follow a section before it is indexed
    pub confirmations: u64,
    #[serde(rename = "poll_interval_ms", with = "duration_ms", default = "default_poll_interval")]
    pub poll_interval: Duration,
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Confirmations for the bloom trie, counted on top of the bloom-bits
/// indexer's own confirmations.
pub fn bloom_trie_confirmations(helper_confirmations: u64) -> Result<u64> {
    helper_confirmations
        .checked_sub(BLOOM_BITS_CONFIRMATIONS)
        .ok_or_else(|| {
            IndexError::Config(format!(
                "helper trie confirmations {helper_confirmations} below bloom bits confirmations {BLOOM_BITS_CONFIRMATIONS}"
            ))
        })
}

impl IndexerConfig {
    pub fn cht(mode: IndexerMode) -> Self {
        Self {
            section_size: mode.cht_section_size(),
            confirmations: mode.helper_confirmations(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn bloom_bits(mode: IndexerMode) -> Self {
        Self {
            section_size: mode.bloom_trie_parent_size(),
            confirmations: BLOOM_BITS_CONFIRMATIONS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn bloom_trie(mode: IndexerMode) -> Result<Self> {
        Ok(Self {
            section_size: BLOOM_TRIE_FREQUENCY,
            confirmations: bloom_trie_confirmations(mode.helper_confirmations())?,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.section_size == 0 {
            return Err(IndexError::Config("section size must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(IndexError::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Synchronous section driver over a chain store.
pub struct ChainIndexer<S: Storage + Clone, B> {
    chain: S,
    progress: Table<S>,
    backend: B,
    config: IndexerConfig,
    name: String,
    stored: u64,
}

impl<S: Storage + Clone, B: IndexerBackend> ChainIndexer<S, B> {
    pub fn new(
        chain: S,
        index_prefix: &str,
        backend: B,
        config: IndexerConfig,
        name: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;
        let progress = Table::new(chain.clone(), index_prefix);
        let stored = match progress.get(COUNT_KEY)? {
            Some(bytes) => u64::from_be_bytes(
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| IndexError::Codec("malformed section count".into()))?,
            ),
            None => 0,
        };
        Ok(Self {
            chain,
            progress,
            backend,
            config,
            name: name.into(),
            stored,
        })
    }

    /// Number of sections indexed and valid on the current chain.
    pub fn sections(&self) -> u64 {
        self.stored
    }

    /// Number of the last block covered by a stored section.
    ///
    /// A dependent indexer (the bloom trie on top of bloom bits) is driven
    /// with this as its chain head.
    pub fn processed_head(&self) -> Option<u64> {
        self.stored
            .checked_mul(self.config.section_size)
            .and_then(|end| end.checked_sub(1))
    }

    /// Stored head of `section`, if it was indexed.
    pub fn section_head(&self, section: u64) -> Result<Option<Hash32>> {
        match self.progress.get(&section_head_key(section))? {
            Some(bytes) => {
                let len = bytes.len();
                let hash = bytes
                    .try_into()
                    .map_err(|_| IndexError::Codec(format!("section head of {len} bytes")))?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Bring the index up to date with chain head `head`.
    ///
    /// Sections whose stored head is no longer canonical are dropped first.
    /// Then every confirmed section is processed in order; progress is
    /// persisted after each successful commit, so an error leaves earlier
    /// sections in place. Returns the number of valid sections.
    pub fn update(&mut self, head: u64) -> Result<u64> {
        self.rollback()?;

        let confirmed = head
            .saturating_add(1)
            .saturating_sub(self.config.confirmations)
            / self.config.section_size;
        while self.stored < confirmed {
            let section = self.stored;
            let last_head = match section {
                0 => ZERO_HASH,
                _ => self.section_head(section - 1)?.unwrap_or(ZERO_HASH),
            };
            let new_head = self.process_section(section, last_head)?;
            self.store_section(section, &new_head)?;
            debug!(
                indexer = %self.name,
                section,
                head = %hex::encode(new_head),
                "indexer: processed section"
            );
        }
        Ok(self.stored)
    }

    /// Poll `chain_head` and call [`update`](Self::update) until `stop` is
    /// set. Retryable errors are logged and retried on the next poll; fatal
    /// ones are returned.
    pub fn run<F>(&mut self, mut chain_head: F, stop: &AtomicBool) -> Result<()>
    where
        F: FnMut() -> Result<u64>,
    {
        info!(indexer = %self.name, sections = self.stored, "indexer: started");
        while !stop.load(Ordering::Relaxed) {
            match chain_head().and_then(|head| self.update(head)) {
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!(indexer = %self.name, error = %err, "indexer: update failed"),
            }
            std::thread::sleep(self.config.poll_interval);
        }
        info!(indexer = %self.name, sections = self.stored, "indexer: stopped");
        Ok(())
    }

    fn process_section(&mut self, section: u64, mut last_head: Hash32) -> Result<Hash32> {
        self.backend.reset(section, &last_head)?;

        let size = self.config.section_size;
        for number in section * size..(section + 1) * size {
            let header =
                rawdb::read_canonical_header(&self.chain, number)?.ok_or(IndexError::MissingHeader { number })?;
            if header.parent_hash != last_head {
                return Err(IndexError::Reorg { number });
            }
            self.backend.process(&header)?;
            last_head = header.hash();
        }
        self.backend.commit()?;
        Ok(last_head)
    }

    /// Drop stored sections whose head is no longer on the canonical chain.
    fn rollback(&mut self) -> Result<()> {
        let mut valid = self.stored;
        while valid > 0 {
            let last_block = valid * self.config.section_size - 1;
            let canonical = rawdb::read_canonical_hash(&self.chain, last_block)?;
            if canonical.is_some() && canonical == self.section_head(valid - 1)? {
                break;
            }
            valid -= 1;
        }
        if valid != self.stored {
            info!(
                indexer = %self.name,
                from = self.stored,
                to = valid,
                "indexer: rolling back reorged sections"
            );
            self.progress.put(COUNT_KEY, &valid.to_be_bytes())?;
            self.stored = valid;
        }
        Ok(())
    }

    fn store_section(&mut self, section: u64, head: &Hash32) -> Result<()> {
        let count = section + 1;
        let ops: Vec<BatchOp> = vec![
            (section_head_key(section), Some(head.to_vec())),
            (COUNT_KEY.to_vec(), Some(count.to_be_bytes().to_vec())),
        ];
        self.progress.write_batch(ops)?;
        self.stored = count;
        Ok(())
    }
}

fn section_head_key(section: u64) -> Vec<u8> {
    let mut key = SECTION_HEAD_PREFIX.to_vec();
    key.extend_from_slice(&section.to_be_bytes());
    key
}

pub fn new_cht_indexer<S: Storage + Clone>(
    db: S,
    mode: IndexerMode,
) -> Result<ChainIndexer<S, ChtIndexerBackend<S>>> {
    let config = IndexerConfig::cht(mode);
    let backend = ChtIndexerBackend::new(db.clone(), config.section_size);
    ChainIndexer::new(db, CHT_INDEX_PREFIX, backend, config, "cht")
}

pub fn new_bloom_trie_indexer<S: Storage + Clone>(
    db: S,
    mode: IndexerMode,
) -> Result<ChainIndexer<S, BloomTrieIndexerBackend<S>>> {
    let config = IndexerConfig::bloom_trie(mode)?;
    let backend = BloomTrieIndexerBackend::new(db.clone(), mode.bloom_trie_parent_size(), config.section_size)?;
    ChainIndexer::new(db, BLOOM_TRIE_INDEX_PREFIX, backend, config, "bloomtrie")
}

pub fn new_bloom_bits_indexer<S: Storage + Clone>(
    db: S,
    mode: IndexerMode,
) -> Result<ChainIndexer<S, BloomBitsIndexerBackend<S>>> {
    let config = IndexerConfig::bloom_bits(mode);
    let backend = BloomBitsIndexerBackend::new(db.clone(), config.section_size);
    ChainIndexer::new(db, BLOOM_BITS_INDEX_PREFIX, backend, config, "bloombits")
}
