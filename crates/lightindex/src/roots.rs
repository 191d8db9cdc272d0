//! Root records: `prefix ∥ u64_be(section) ∥ head → root`
//!
//! Keying by section head means a reorganised section gets a fresh record
//! instead of overwriting the old one.

use triedb::Storage;

use crate::error::{IndexError, Result};
use crate::params::{CHT_FREQUENCY_CLIENT, CHT_FREQUENCY_SERVER};
use crate::types::{Hash32, ZERO_HASH};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootTable {
    prefix: &'static [u8],
}

pub const CHT_ROOTS: RootTable = RootTable::new(b"chtRoot-");
pub const BLOOM_TRIE_ROOTS: RootTable = RootTable::new(b"bltRoot-");

impl RootTable {
    pub const fn new(prefix: &'static [u8]) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> &'static [u8] {
        self.prefix
    }

    pub fn key(&self, section: u64, head: &Hash32) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + 8 + 32);
        key.extend_from_slice(self.prefix);
        key.extend_from_slice(&section.to_be_bytes());
        key.extend_from_slice(head);
        key
    }

    /// Stored root, or [`ZERO_HASH`] if none was written.
    pub fn get<S: Storage + ?Sized>(&self, db: &S, section: u64, head: &Hash32) -> Result<Hash32> {
        match db.get(&self.key(section, head))? {
            Some(bytes) => {
                let len = bytes.len();
                bytes.try_into().map_err(|_| {
                    IndexError::Codec(format!("root record for section {section} has {len} bytes"))
                })
            }
            None => Ok(ZERO_HASH),
        }
    }

    pub fn put<S: Storage + ?Sized>(&self, db: &S, section: u64, head: &Hash32, root: &Hash32) -> Result<()> {
        Ok(db.put(&self.key(section, head), root)?)
    }
}

/// CHT root of a client-sized section, read from server-sized records.
pub fn get_cht_v2_root<S: Storage + ?Sized>(db: &S, section: u64, head: &Hash32) -> Result<Hash32> {
    let ratio = CHT_FREQUENCY_CLIENT / CHT_FREQUENCY_SERVER;
    // no server section ends past u64::MAX
    match section.checked_add(1).and_then(|next| next.checked_mul(ratio)) {
        Some(end) => CHT_ROOTS.get(db, end - 1, head),
        None => Ok(ZERO_HASH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triedb::InMemoryStorage;

    #[test]
    fn test_key_layout() {
        let key = CHT_ROOTS.key(0x0102, &[0xaa; 32]);
        let mut expected = b"chtRoot-".to_vec();
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        expected.extend_from_slice(&[0xaa; 32]);
        assert_eq!(key, expected);
        assert_eq!(CHT_ROOTS.prefix(), b"chtRoot-");
        assert!(BLOOM_TRIE_ROOTS.key(0x0102, &[0xaa; 32]).starts_with(BLOOM_TRIE_ROOTS.prefix()));
    }

    #[test]
    fn test_put_get() {
        let db = InMemoryStorage::new();
        CHT_ROOTS.put(&db, 7, &[1; 32], &[2; 32]).unwrap();
        assert_eq!(CHT_ROOTS.get(&db, 7, &[1; 32]).unwrap(), [2; 32]);
        // same section, other head
        assert_eq!(CHT_ROOTS.get(&db, 7, &[3; 32]).unwrap(), ZERO_HASH);
        // other table
        assert_eq!(BLOOM_TRIE_ROOTS.get(&db, 7, &[1; 32]).unwrap(), ZERO_HASH);
    }

    #[test]
    fn test_missing_root_is_zero() {
        let db = InMemoryStorage::new();
        assert_eq!(CHT_ROOTS.get(&db, 4, &[9; 32]).unwrap(), ZERO_HASH);
    }

    #[test]
    fn test_malformed_root_rejected() {
        let db = InMemoryStorage::new();
        db.put(&BLOOM_TRIE_ROOTS.key(0, &[1; 32]), b"short").unwrap();
        assert!(matches!(
            BLOOM_TRIE_ROOTS.get(&db, 0, &[1; 32]),
            Err(IndexError::Codec(_))
        ));
    }

    #[test]
    fn test_v2_root_maps_to_last_server_section() {
        let db = InMemoryStorage::new();
        let head = [3; 32];
        CHT_ROOTS.put(&db, 15, &head, &[0xee; 32]).unwrap();
        assert_eq!(get_cht_v2_root(&db, 1, &head).unwrap(), [0xee; 32]);
        assert_eq!(get_cht_v2_root(&db, 0, &head).unwrap(), ZERO_HASH);
        assert_eq!(get_cht_v2_root(&db, u64::MAX / 8, &head).unwrap(), ZERO_HASH);
        assert_eq!(get_cht_v2_root(&db, u64::MAX, &head).unwrap(), ZERO_HASH);
    }
}
