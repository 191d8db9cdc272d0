//! Index demo
//!
//! Builds a synthetic header chain in memory, runs the bloom-bits, CHT and
//! bloom trie indexers over it and prints the committed section roots.
//!
//! Environment:
//! - `LIGHTINDEX_MODE`: `client` or `server` (default `server`)
//! - `LIGHTINDEX_BLOCKS`: chain length (default 70000)
//! - `LIGHTINDEX_CHECKPOINTS`: optional JSON file with extra trusted checkpoints
//! - `RUST_LOG`: log filter, e.g. `lightindex=debug`

mod config;

use anyhow::{Context, Result};
use lightindex::rawdb;
use lightindex::{
    new_bloom_bits_indexer, new_bloom_trie_indexer, new_cht_indexer, Bloom, ChainIndexer, CheckpointRegistry, Hash32,
    Header, IndexerBackend, RootTable, BLOOM_TRIE_ROOTS, CHT_ROOTS, ZERO_HASH,
};
use num_bigint::BigUint;
use tracing::info;
use triedb::InMemoryStorage;

use crate::config::AppConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    let mut checkpoints = CheckpointRegistry::builtin()?;
    if let Some(path) = &cfg.checkpoints {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint table {}", path.display()))?;
        let extra = CheckpointRegistry::from_json(&json).context("Invalid checkpoint table")?;
        checkpoints.merge(extra)?;
    }

    let db = InMemoryStorage::new();
    let genesis = build_chain(&db, cfg.blocks)?;
    info!(mode = %cfg.mode, blocks = cfg.blocks, "demo: chain ready");

    match checkpoints.lookup(&genesis) {
        Some(cp) => println!(
            "trusted checkpoint '{}' at section {} (cht {}, bloom trie {})",
            cp.name,
            cp.section_index,
            hex::encode(cp.cht_root),
            hex::encode(cp.bloom_trie_root)
        ),
        None => println!("no trusted checkpoint for genesis {}, indexing from scratch", hex::encode(genesis)),
    }

    let head = cfg.blocks - 1;
    let mut bloom_bits = new_bloom_bits_indexer(db.clone(), cfg.mode)?;
    let mut cht = new_cht_indexer(db.clone(), cfg.mode)?;
    let mut bloom_trie = new_bloom_trie_indexer(db.clone(), cfg.mode)?;

    cht.update(head)?;
    bloom_bits.update(head)?;
    if let Some(bits_head) = bloom_bits.processed_head() {
        bloom_trie.update(bits_head)?;
    }

    println!("mode {}, {} blocks", cfg.mode, cfg.blocks);
    println!("bloom bits sections: {}", bloom_bits.sections());
    print_roots(&db, "cht", &cht, CHT_ROOTS)?;
    print_roots(&db, "bloom trie", &bloom_trie, BLOOM_TRIE_ROOTS)?;
    Ok(())
}

fn print_roots<B: IndexerBackend>(
    db: &InMemoryStorage,
    label: &str,
    indexer: &ChainIndexer<InMemoryStorage, B>,
    roots: RootTable,
) -> Result<()> {
    println!("{label} sections: {}", indexer.sections());
    for section in 0..indexer.sections() {
        let head = indexer.section_head(section)?.unwrap_or(ZERO_HASH);
        let root = roots.get(db, section, &head)?;
        println!("  #{section:<4} head {}  root {}", hex::encode(head), hex::encode(root));
    }
    Ok(())
}

/// Write `count` canonical headers with totals; returns the genesis hash.
fn build_chain(db: &InMemoryStorage, count: u64) -> Result<Hash32> {
    let mut parent_hash = ZERO_HASH;
    let mut td = BigUint::from(0u32);
    let mut genesis = ZERO_HASH;

    for number in 0..count {
        let mut bloom = Bloom::default();
        // a handful of recurring log emitters
        if number % 3 == 0 {
            bloom.add(format!("emitter-{}", number % 97).as_bytes());
        }
        let header = Header {
            parent_hash,
            number,
            timestamp: 1_438_269_973 + number * 14,
            difficulty: BigUint::from(17_179_869_184u64 + number % 2048),
            bloom,
        };
        let hash = header.hash();
        td += &header.difficulty;

        rawdb::write_header(db, &header)?;
        rawdb::write_canonical_hash(db, number, &hash)?;
        rawdb::write_td(db, number, &hash, &td)?;

        if number == 0 {
            genesis = hash;
        }
        parent_hash = hash;
    }
    Ok(genesis)
}
