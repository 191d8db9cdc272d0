//! Chain store accessors
//!
//! Headers, canonical hashes, total difficulties and raw bloom-bit columns
//! share one key-value store; the key layouts below are the on-disk format.

use num_bigint::BigUint;
use triedb::{BatchOp, Storage};

use crate::error::{IndexError, Result};
use crate::types::{biguint_to_be, Hash32, Header};

const HEADER_PREFIX: &[u8] = b"h";
const NUM_SUFFIX: &[u8] = b"n";
const TD_SUFFIX: &[u8] = b"t";
const BLOOM_BITS_PREFIX: &[u8] = b"B";

fn header_key_prefix(number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(HEADER_PREFIX.len() + 8 + 32 + 1);
    key.extend_from_slice(HEADER_PREFIX);
    key.extend_from_slice(&number.to_be_bytes());
    key
}

fn canonical_key(number: u64) -> Vec<u8> {
    let mut key = header_key_prefix(number);
    key.extend_from_slice(NUM_SUFFIX);
    key
}

fn header_key(number: u64, hash: &Hash32) -> Vec<u8> {
    let mut key = header_key_prefix(number);
    key.extend_from_slice(hash);
    key
}

fn td_key(number: u64, hash: &Hash32) -> Vec<u8> {
    let mut key = header_key(number, hash);
    key.extend_from_slice(TD_SUFFIX);
    key
}

/// `"B" ∥ u16_be(bit) ∥ u64_be(section) ∥ head`
pub fn bloom_bits_key(bit: u16, section: u64, head: &Hash32) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOOM_BITS_PREFIX.len() + 2 + 8 + 32);
    key.extend_from_slice(BLOOM_BITS_PREFIX);
    key.extend_from_slice(&bit.to_be_bytes());
    key.extend_from_slice(&section.to_be_bytes());
    key.extend_from_slice(head);
    key
}

fn to_hash(bytes: Vec<u8>) -> Result<Hash32> {
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| IndexError::Codec(format!("expected 32-byte hash, got {len} bytes")))
}

pub fn read_canonical_hash<S: Storage>(db: &S, number: u64) -> Result<Option<Hash32>> {
    db.get(&canonical_key(number))?.map(to_hash).transpose()
}

pub fn write_canonical_hash<S: Storage>(db: &S, number: u64, hash: &Hash32) -> Result<()> {
    Ok(db.put(&canonical_key(number), hash)?)
}

pub fn read_header<S: Storage>(db: &S, number: u64, hash: &Hash32) -> Result<Option<Header>> {
    match db.get(&header_key(number, hash))? {
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| IndexError::Codec(e.to_string())),
        None => Ok(None),
    }
}

pub fn write_header<S: Storage>(db: &S, header: &Header) -> Result<()> {
    let bytes = bincode::serialize(header).map_err(|e| IndexError::Codec(e.to_string()))?;
    Ok(db.put(&header_key(header.number, &header.hash()), &bytes)?)
}

/// The canonical header at `number`, if any.
pub fn read_canonical_header<S: Storage>(db: &S, number: u64) -> Result<Option<Header>> {
    match read_canonical_hash(db, number)? {
        Some(hash) => read_header(db, number, &hash),
        None => Ok(None),
    }
}

pub fn read_td<S: Storage>(db: &S, number: u64, hash: &Hash32) -> Result<Option<BigUint>> {
    Ok(db
        .get(&td_key(number, hash))?
        .map(|bytes| BigUint::from_bytes_be(&bytes)))
}

pub fn write_td<S: Storage>(db: &S, number: u64, hash: &Hash32, td: &BigUint) -> Result<()> {
    Ok(db.put(&td_key(number, hash), &biguint_to_be(td))?)
}

pub fn read_bloom_bits<S: Storage>(db: &S, bit: u16, section: u64, head: &Hash32) -> Result<Option<Vec<u8>>> {
    Ok(db.get(&bloom_bits_key(bit, section, head))?)
}

/// Writes all columns of one section atomically.
pub fn write_bloom_bits_batch<S: Storage>(
    db: &S,
    section: u64,
    head: &Hash32,
    columns: Vec<(u16, Vec<u8>)>,
) -> Result<()> {
    let ops: Vec<BatchOp> = columns
        .into_iter()
        .map(|(bit, data)| (bloom_bits_key(bit, section, head), Some(data)))
        .collect();
    Ok(db.write_batch(ops)?)
}
