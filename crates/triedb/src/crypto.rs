//! Domain-separated cryptographic operations

use crate::Hash32;

const DOMAIN_LEAF: u8 = 0x00;
const DOMAIN_BRANCH: u8 = 0x01;

/// Root of a trie without entries; also the hash of an empty subtree.
pub const EMPTY_ROOT: Hash32 = [0u8; 32];

/// Hash a key to 32 bytes (used ONLY for path bits)
pub fn hash_key(key: &[u8]) -> Hash32 {
    blake3::hash(key).into()
}

/// Hash a value to 32 bytes (payload to leaf)
pub fn hash_value(value: &[u8]) -> Hash32 {
    blake3::hash(value).into()
}

/// leaf = H(0x00 || key_hash || value_hash)
pub fn hash_leaf(key_hash: Hash32, value_hash: Hash32) -> Hash32 {
    let mut data = [0u8; 1 + 32 + 32];
    data[0] = DOMAIN_LEAF;
    data[1..33].copy_from_slice(&key_hash);
    data[33..].copy_from_slice(&value_hash);
    blake3::hash(&data).into()
}

/// branch = H(0x01 || left || right)
pub fn hash_branch(left: Hash32, right: Hash32) -> Hash32 {
    let mut data = [0u8; 1 + 32 + 32];
    data[0] = DOMAIN_BRANCH;
    data[1..33].copy_from_slice(&left);
    data[33..].copy_from_slice(&right);
    blake3::hash(&data).into()
}

/// Path bit at `depth`, most significant bit of byte 0 first.
pub(crate) fn path_bit(key_hash: &Hash32, depth: usize) -> bool {
    (key_hash[depth / 8] >> (7 - depth % 8)) & 1 == 1
}
