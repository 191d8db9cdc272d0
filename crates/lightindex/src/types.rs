use std::fmt;

use num_bigint::BigUint;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use triedb::Hash32;

pub const ZERO_HASH: Hash32 = [0u8; 32];

pub const BLOOM_BYTE_LENGTH: usize = 256;
pub const BLOOM_BIT_LENGTH: usize = 8 * BLOOM_BYTE_LENGTH;

/// 2048-bit log filter carried by every header
#[derive(Clone, PartialEq, Eq)]
pub struct Bloom(pub [u8; BLOOM_BYTE_LENGTH]);

impl Bloom {
    pub fn add(&mut self, data: &[u8]) {
        for (byte, mask) in bloom_positions(data) {
            self.0[byte] |= mask;
        }
    }

    pub fn contains(&self, data: &[u8]) -> bool {
        bloom_positions(data)
            .iter()
            .all(|&(byte, mask)| self.0[byte] & mask == mask)
    }

    /// Whether filter bit `bit` is set (bit 0 is the lowest bit of the last byte).
    pub fn bit(&self, bit: usize) -> bool {
        self.0[BLOOM_BYTE_LENGTH - 1 - bit / 8] & (1 << (bit % 8)) != 0
    }
}

/// Three 11-bit indexes taken from byte pairs of blake3(data).
fn bloom_positions(data: &[u8]) -> [(usize, u8); 3] {
    let hash = blake3::hash(data);
    let h = hash.as_bytes();
    let mut out = [(0usize, 0u8); 3];
    for (slot, i) in out.iter_mut().zip([0usize, 2, 4]) {
        let v = ((h[i] as usize) << 8 | h[i + 1] as usize) & (BLOOM_BIT_LENGTH - 1);
        *slot = (BLOOM_BYTE_LENGTH - 1 - v / 8, 1 << (v % 8));
    }
    out
}

impl Default for Bloom {
    fn default() -> Self {
        Bloom([0u8; BLOOM_BYTE_LENGTH])
    }
}

impl fmt::Debug for Bloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bloom({})", hex::encode(self.0))
    }
}

impl Serialize for Bloom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Bloom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let len = bytes.len();
        let arr: [u8; BLOOM_BYTE_LENGTH] = bytes
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"256 bloom bytes"))?;
        Ok(Bloom(arr))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub parent_hash: Hash32,
    pub number: u64,
    pub timestamp: u64,
    #[serde(with = "be_biguint")]
    pub difficulty: BigUint,
    pub bloom: Bloom,
}

impl Header {
    /// blake3 over parent hash, number, timestamp, length-prefixed
    /// difficulty and bloom, all big-endian.
    pub fn hash(&self) -> Hash32 {
        let difficulty = biguint_to_be(&self.difficulty);
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.parent_hash);
        hasher.update(&self.number.to_be_bytes());
        hasher.update(&self.timestamp.to_be_bytes());
        hasher.update(&(difficulty.len() as u32).to_be_bytes());
        hasher.update(&difficulty);
        hasher.update(&self.bloom.0);
        hasher.finalize().into()
    }
}

/// Minimal big-endian bytes; zero encodes as no bytes.
pub fn biguint_to_be(value: &BigUint) -> Vec<u8> {
    if value.bits() == 0 {
        Vec::new()
    } else {
        value.to_bytes_be()
    }
}

/// Serde adapter storing a `BigUint` as its minimal big-endian byte string.
pub(crate) mod be_biguint {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&super::biguint_to_be(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Ok(BigUint::from_bytes_be(&bytes))
    }
}
