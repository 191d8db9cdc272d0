#![allow(dead_code)]

use lightindex::rawdb;
use lightindex::{Bloom, Hash32, Header, ZERO_HASH};
use num_bigint::BigUint;
use triedb::{InMemoryStorage, Storage};

/// Append `count` canonical headers after `parent` (or from genesis), writing
/// header, canonical hash and total difficulty. `salt` changes every hash, so
/// two calls with different salts build competing forks.
pub fn extend_chain(db: &InMemoryStorage, parent: Option<&Header>, count: u64, salt: u64) -> Vec<Header> {
    let (mut number, mut parent_hash, mut td) = match parent {
        Some(p) => {
            let td = rawdb::read_td(db, p.number, &p.hash()).unwrap().unwrap();
            (p.number + 1, p.hash(), td)
        }
        None => (0, ZERO_HASH, BigUint::from(0u32)),
    };

    let mut headers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut bloom = Bloom::default();
        if number % 5 == 0 {
            bloom.add(&number.to_be_bytes());
        }
        let header = Header {
            parent_hash,
            number,
            timestamp: 1_600_000_000 + number * 13 + salt,
            difficulty: BigUint::from(131_072u64 + number % 1024),
            bloom,
        };
        let hash = header.hash();
        td += &header.difficulty;

        rawdb::write_header(db, &header).unwrap();
        rawdb::write_canonical_hash(db, number, &hash).unwrap();
        rawdb::write_td(db, number, &hash, &td).unwrap();

        parent_hash = hash;
        number += 1;
        headers.push(header);
    }
    headers
}

pub fn build_chain(db: &InMemoryStorage, count: u64) -> Vec<Header> {
    extend_chain(db, None, count, 0)
}

/// Remove the total difficulty record of `header`.
pub fn drop_td(db: &InMemoryStorage, header: &Header) {
    let key = [b"h".as_slice(), &header.number.to_be_bytes(), &header.hash(), b"t"].concat();
    db.delete(&key).unwrap();
}

pub fn hash_at(headers: &[Header], number: u64) -> Hash32 {
    headers[number as usize].hash()
}
