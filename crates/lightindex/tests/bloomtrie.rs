mod common;

use std::time::Duration;

use common::{build_chain, hash_at};
use lightindex::bitutil;
use lightindex::params::{BLOOM_BITS_SECTION, BLOOM_TRIE_FREQUENCY};
use lightindex::rawdb;
use lightindex::types::BLOOM_BIT_LENGTH;
use lightindex::{
    bloom_trie_key, bloom_trie_table, BloomBitsIndexerBackend, BloomTrieIndexerBackend, ChainIndexer, Hash32, Header,
    IndexError, IndexerBackend, IndexerConfig, BLOOM_TRIE_ROOTS, ZERO_HASH,
};
use rand::Rng;
use triedb::{InMemoryStorage, NodeStore, Table, Trie};

/// Header that only needs a number and a distinct hash.
fn boundary_header(number: u64) -> Header {
    Header {
        parent_hash: [number as u8; 32],
        number,
        timestamp: number,
        difficulty: 1u32.into(),
        bloom: Default::default(),
    }
}

/// Random sparse column of `bytes` bytes.
fn sparse_column(rng: &mut impl Rng, bytes: usize) -> Vec<u8> {
    (0..bytes)
        .map(|_| if rng.gen_ratio(1, 40) { rng.gen_range(1..=255) } else { 0 })
        .collect()
}

#[test]
fn test_ratio_eight_section() {
    let db = InMemoryStorage::new();
    let mut rng = rand::thread_rng();
    let mut backend = BloomTrieIndexerBackend::new(db.clone(), BLOOM_BITS_SECTION, BLOOM_TRIE_FREQUENCY).unwrap();
    assert_eq!(backend.ratio(), 8);

    backend.reset(0, &ZERO_HASH).unwrap();
    // only sub-section terminals are recorded
    backend.process(&boundary_header(100)).unwrap();
    assert!(backend.section_heads().iter().all(|h| *h == ZERO_HASH));

    let terminals: Vec<Header> = (1..=8).map(|j| boundary_header(j * BLOOM_BITS_SECTION - 1)).collect();
    for header in &terminals {
        backend.process(header).unwrap();
    }
    let heads: Vec<_> = terminals.iter().map(Header::hash).collect();
    assert_eq!(backend.section_heads(), heads.as_slice());

    // raw columns: bit 0 random, every other bit zero
    let part = (BLOOM_BITS_SECTION / 8) as usize;
    let mut expected_bit0 = Vec::new();
    for (j, head) in heads.iter().enumerate() {
        let mut bit0 = sparse_column(&mut rng, part);
        if j == 0 {
            bit0[0] |= 0x80;
        }
        expected_bit0.extend_from_slice(&bit0);
        let columns = (0..BLOOM_BIT_LENGTH as u16)
            .map(|bit| {
                let raw = if bit == 0 { bit0.clone() } else { vec![0u8; part] };
                (bit, bitutil::compress(&raw))
            })
            .collect();
        rawdb::write_bloom_bits_batch(&db, j as u64, head, columns).unwrap();
    }

    backend.commit().unwrap();

    let root = BLOOM_TRIE_ROOTS.get(&db, 0, &heads[7]).unwrap();
    assert_ne!(root, ZERO_HASH);
    let trie = Trie::new(root, NodeStore::new(bloom_trie_table(db.clone()))).unwrap();

    let leaf = trie.get(&bloom_trie_key(0, 0)).unwrap().unwrap();
    assert_eq!(leaf, bitutil::compress(&expected_bit0));
    assert_eq!(bitutil::decompress(&leaf, (BLOOM_TRIE_FREQUENCY / 8) as usize).unwrap(), expected_bit0);

    // all-zero columns leave no leaf behind
    assert_eq!(trie.get(&bloom_trie_key(1, 0)).unwrap(), None);
    assert_eq!(trie.get(&bloom_trie_key(2047, 0)).unwrap(), None);
}

#[test]
fn test_commit_with_unset_heads_fails_without_writing() {
    let db = InMemoryStorage::new();
    let mut backend = BloomTrieIndexerBackend::new(db.clone(), 8, 64).unwrap();
    backend.reset(0, &ZERO_HASH).unwrap();

    // seven of eight sub-sections
    for j in 0..7u64 {
        let header = boundary_header(j * 8 + 7);
        backend.process(&header).unwrap();
        let columns = (0..BLOOM_BIT_LENGTH as u16).map(|bit| (bit, Vec::new())).collect();
        rawdb::write_bloom_bits_batch(&db, j, &header.hash(), columns).unwrap();
    }

    let err = backend.commit().unwrap_err();
    assert!(matches!(
        err,
        IndexError::MissingBloomData { bit: 0, section: 7, head } if head == ZERO_HASH
    ));
    assert!(!err.is_fatal());
    assert!(db.keys_with_prefix(b"bltRoot-").unwrap().is_empty());
    assert!(db.keys_with_prefix(b"blt-").unwrap().is_empty());
}

#[test]
fn test_corrupt_column_rejected() {
    let db = InMemoryStorage::new();
    let mut backend = BloomTrieIndexerBackend::new(db.clone(), 64, 64).unwrap();
    backend.reset(0, &ZERO_HASH).unwrap();
    let header = boundary_header(63);
    backend.process(&header).unwrap();

    // bitset announces a byte that is missing
    let columns = (0..BLOOM_BIT_LENGTH as u16).map(|bit| (bit, vec![0x80])).collect();
    rawdb::write_bloom_bits_batch(&db, 0, &header.hash(), columns).unwrap();

    assert!(matches!(
        backend.commit(),
        Err(IndexError::Decompress(bitutil::Error::MissingData))
    ));
    assert!(db.keys_with_prefix(b"bltRoot-").unwrap().is_empty());
}

#[test]
fn test_process_bounds() {
    let mut backend = BloomTrieIndexerBackend::new(InMemoryStorage::new(), 8, 64).unwrap();
    assert!(matches!(backend.process(&boundary_header(7)), Err(IndexError::NotReset)));

    backend.reset(2, &ZERO_HASH).unwrap();
    // before the section start
    assert!(matches!(
        backend.process(&boundary_header(127)),
        Err(IndexError::OutOfSection { number: 127, section: 2 })
    ));
    // past the section end
    assert!(matches!(
        backend.process(&boundary_header(199)),
        Err(IndexError::OutOfSection { number: 199, section: 2 })
    ));
    // past the end but not a sub-section terminal
    assert!(matches!(
        backend.process(&boundary_header(200)),
        Err(IndexError::OutOfSection { number: 200, section: 2 })
    ));
    assert!(backend.section_heads().iter().all(|h| *h == ZERO_HASH));
    backend.process(&boundary_header(135)).unwrap();
    assert_ne!(backend.section_heads()[0], ZERO_HASH);
}

#[test]
fn test_reset_with_missing_nodes_fails() {
    let db = InMemoryStorage::new();
    let head = [4u8; 32];
    BLOOM_TRIE_ROOTS.put(&db, 0, &head, &[5u8; 32]).unwrap();

    let mut backend = BloomTrieIndexerBackend::new(db, 8, 64).unwrap();
    let err = backend.reset(1, &head).unwrap_err();
    assert!(matches!(err, IndexError::TrieOpen { root, .. } if root == [5u8; 32]));
    assert!(!err.is_fatal());
    assert!(backend.trie().is_none());
}

/// Commit section 0 of a 64/64 backend whose only terminal is `head`, with
/// `bit0` as the raw column of filter bit 0.
fn commit_single_section(db: &InMemoryStorage, head: &Header, bit0: &[u8]) -> Hash32 {
    let columns = (0..BLOOM_BIT_LENGTH as u16)
        .map(|bit| {
            let raw = if bit == 0 { bit0.to_vec() } else { vec![0u8; 8] };
            (bit, bitutil::compress(&raw))
        })
        .collect();
    rawdb::write_bloom_bits_batch(db, 0, &head.hash(), columns).unwrap();

    let mut backend = BloomTrieIndexerBackend::new(db.clone(), 64, 64).unwrap();
    backend.reset(0, &ZERO_HASH).unwrap();
    backend.process(head).unwrap();
    backend.commit().unwrap();
    BLOOM_TRIE_ROOTS.get(db, 0, &head.hash()).unwrap()
}

#[test]
fn test_reorged_section_gets_own_record() {
    let db = InMemoryStorage::new();
    let original = boundary_header(63);
    let fork = Header {
        parent_hash: [0xee; 32],
        ..boundary_header(63)
    };
    assert_ne!(original.hash(), fork.hash());

    let r1 = commit_single_section(&db, &original, &[0x80, 0, 0, 0, 0, 0, 0, 0]);
    let r2 = commit_single_section(&db, &fork, &[0, 0, 0, 0x01, 0, 0, 0, 0]);
    assert_ne!(r1, ZERO_HASH);
    assert_ne!(r2, ZERO_HASH);
    assert_ne!(r1, r2);

    // the first record is not overwritten by the fork
    assert_eq!(BLOOM_TRIE_ROOTS.get(&db, 0, &original.hash()).unwrap(), r1);
    assert_eq!(db.keys_with_prefix(BLOOM_TRIE_ROOTS.prefix()).unwrap().len(), 2);
}

#[test]
fn test_roots_are_deterministic() {
    let (a, b) = (InMemoryStorage::new(), InMemoryStorage::new());
    let head = boundary_header(63);
    let bit0 = [0x10, 0, 0x02, 0, 0, 0, 0, 0x81];

    let ra = commit_single_section(&a, &head, &bit0);
    let rb = commit_single_section(&b, &head, &bit0);
    assert_ne!(ra, ZERO_HASH);
    assert_eq!(ra, rb);
}

fn small_config(section_size: u64) -> IndexerConfig {
    IndexerConfig {
        section_size,
        confirmations: 0,
        poll_interval: Duration::from_millis(1),
    }
}

#[test]
fn test_bloom_bits_feed_bloom_trie() {
    let db = InMemoryStorage::new();
    let headers = build_chain(&db, 64);

    let mut bits = ChainIndexer::new(
        db.clone(),
        "iB",
        BloomBitsIndexerBackend::new(db.clone(), 16),
        small_config(16),
        "bloombits",
    )
    .unwrap();
    let mut trie_indexer = ChainIndexer::new(
        db.clone(),
        "bltIndex-",
        BloomTrieIndexerBackend::new(db.clone(), 16, 64).unwrap(),
        small_config(64),
        "bloomtrie",
    )
    .unwrap();

    // nothing to do until the raw sections exist
    assert_eq!(bits.processed_head(), None);
    assert_eq!(bits.update(63).unwrap(), 4);
    assert_eq!(bits.processed_head(), Some(63));
    assert_eq!(trie_indexer.update(63).unwrap(), 1);

    let root = BLOOM_TRIE_ROOTS.get(&db, 0, &hash_at(&headers, 63)).unwrap();
    assert_ne!(root, ZERO_HASH);
    let trie = Trie::new(root, NodeStore::new(bloom_trie_table(db.clone()))).unwrap();

    assert_section_columns(&trie, &headers, 0, 64);
}

/// Every filter bit of every block of `section` is reflected in its column.
fn assert_section_columns(trie: &Trie<Table<InMemoryStorage>>, headers: &[Header], section: u64, size: u64) {
    let start = section * size;
    let blocks = &headers[start as usize..(start + size) as usize];
    for bit in 0..BLOOM_BIT_LENGTH {
        let leaf = trie.get(&bloom_trie_key(bit as u16, section)).unwrap();
        if !blocks.iter().any(|h| h.bloom.bit(bit)) {
            assert_eq!(leaf, None, "section {section} bit {bit}");
            continue;
        }
        let column = bitutil::decompress(&leaf.unwrap(), (size / 8) as usize).unwrap();
        for header in blocks {
            let n = (header.number - start) as usize;
            let set = column[n / 8] & (1 << (7 - n % 8)) != 0;
            assert_eq!(set, header.bloom.bit(bit), "section {section} bit {bit} block {}", header.number);
        }
    }
}

#[test]
fn test_second_section_extends_first() {
    let db = InMemoryStorage::new();
    let headers = build_chain(&db, 128);

    let mut bits = ChainIndexer::new(
        db.clone(),
        "iB",
        BloomBitsIndexerBackend::new(db.clone(), 16),
        small_config(16),
        "bloombits",
    )
    .unwrap();
    let mut trie_indexer = ChainIndexer::new(
        db.clone(),
        "bltIndex-",
        BloomTrieIndexerBackend::new(db.clone(), 16, 64).unwrap(),
        small_config(64),
        "bloomtrie",
    )
    .unwrap();

    assert_eq!(bits.update(127).unwrap(), 8);
    assert_eq!(trie_indexer.update(127).unwrap(), 2);

    let r0 = BLOOM_TRIE_ROOTS.get(&db, 0, &hash_at(&headers, 63)).unwrap();
    let r1 = BLOOM_TRIE_ROOTS.get(&db, 1, &hash_at(&headers, 127)).unwrap();
    assert_ne!(r0, ZERO_HASH);
    assert_ne!(r1, ZERO_HASH);
    assert_ne!(r0, r1);

    // section 1 was built on top of section 0's trie
    let trie = Trie::new(r1, NodeStore::new(bloom_trie_table(db.clone()))).unwrap();
    assert_section_columns(&trie, &headers, 0, 64);
    assert_section_columns(&trie, &headers, 1, 64);

    // the older root does not see section 1
    let old = Trie::new(r0, NodeStore::new(bloom_trie_table(db.clone()))).unwrap();
    assert_section_columns(&old, &headers, 0, 64);
    for bit in 0..BLOOM_BIT_LENGTH as u16 {
        assert_eq!(old.get(&bloom_trie_key(bit, 1)).unwrap(), None);
    }
}
