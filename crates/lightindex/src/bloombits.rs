//! Raw bloom-bits columns
//!
//! Rotates a section of header blooms into 2048 per-bit columns, one bit per
//! block, and stores them compressed. The bloom trie reads these columns back.

use tracing::debug;
use triedb::Storage;

use crate::backend::IndexerBackend;
use crate::bitutil;
use crate::error::{IndexError, Result};
use crate::rawdb;
use crate::types::{Bloom, Hash32, Header, BLOOM_BIT_LENGTH, BLOOM_BYTE_LENGTH, ZERO_HASH};

/// Builds the bit columns of one section.
pub struct Generator {
    blooms: Vec<Vec<u8>>,
    sections: u64,
    next: u64,
}

impl Generator {
    pub fn new(sections: u64) -> Result<Self> {
        if sections == 0 || sections % 8 != 0 {
            return Err(IndexError::Config(format!(
                "bloom section size {sections} is not a non-zero multiple of 8"
            )));
        }
        Ok(Self {
            blooms: vec![vec![0u8; (sections / 8) as usize]; BLOOM_BIT_LENGTH],
            sections,
            next: 0,
        })
    }

    /// Add the bloom of block `index` within the section; blocks arrive in order.
    pub fn add_bloom(&mut self, index: u64, bloom: &Bloom) -> Result<()> {
        if self.next >= self.sections {
            return Err(IndexError::BloomSectionFull { size: self.sections });
        }
        if index != self.next {
            return Err(IndexError::InvalidBloomIndex {
                expected: self.next,
                got: index,
            });
        }
        let byte_index = (self.next / 8) as usize;
        let bit_mask = 1u8 << (7 - self.next % 8);
        for (i, column) in self.blooms.iter_mut().enumerate() {
            let bloom_byte = bloom.0[BLOOM_BYTE_LENGTH - 1 - i / 8];
            if bloom_byte & (1 << (i % 8)) != 0 {
                column[byte_index] |= bit_mask;
            }
        }
        self.next += 1;
        Ok(())
    }

    /// Column of filter bit `bit`, available once the section is full.
    pub fn bit_set(&self, bit: usize) -> Result<&[u8]> {
        if self.next != self.sections {
            return Err(IndexError::IncompleteSection {
                have: self.next,
                want: self.sections,
            });
        }
        self.blooms
            .get(bit)
            .map(Vec::as_slice)
            .ok_or(IndexError::BloomBitOutOfBounds(bit))
    }
}

/// Backend writing the raw compressed columns for each section.
pub struct BloomBitsIndexerBackend<S: Storage> {
    diskdb: S,
    size: u64,
    section: u64,
    head: Hash32,
    gen: Option<Generator>,
}

impl<S: Storage> BloomBitsIndexerBackend<S> {
    pub fn new(diskdb: S, size: u64) -> Self {
        Self {
            diskdb,
            size,
            section: 0,
            head: ZERO_HASH,
            gen: None,
        }
    }
}

impl<S: Storage> IndexerBackend for BloomBitsIndexerBackend<S> {
    fn reset(&mut self, section: u64, _last_head: &Hash32) -> Result<()> {
        self.gen = Some(Generator::new(self.size)?);
        self.section = section;
        self.head = ZERO_HASH;
        Ok(())
    }

    fn process(&mut self, header: &Header) -> Result<()> {
        let gen = self.gen.as_mut().ok_or(IndexError::NotReset)?;
        let index = header
            .number
            .checked_sub(self.section * self.size)
            .ok_or(IndexError::OutOfSection {
                number: header.number,
                section: self.section,
            })?;
        gen.add_bloom(index, &header.bloom)?;
        self.head = header.hash();
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let gen = self.gen.as_ref().ok_or(IndexError::NotReset)?;
        let mut columns = Vec::with_capacity(BLOOM_BIT_LENGTH);
        for bit in 0..BLOOM_BIT_LENGTH {
            columns.push((bit as u16, bitutil::compress(gen.bit_set(bit)?)));
        }
        rawdb::write_bloom_bits_batch(&self.diskdb, self.section, &self.head, columns)?;
        debug!(section = self.section, head = %hex::encode(self.head), "bloombits: stored section");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_rotates_bits() {
        let mut gen = Generator::new(16).unwrap();
        for i in 0..16u64 {
            let mut bloom = Bloom::default();
            if i == 3 {
                // filter bit 0 and bit 9
                bloom.0[BLOOM_BYTE_LENGTH - 1] = 0x01;
                bloom.0[BLOOM_BYTE_LENGTH - 2] = 0x02;
            }
            gen.add_bloom(i, &bloom).unwrap();
        }
        assert_eq!(gen.bit_set(0).unwrap(), &[0b0001_0000u8, 0]);
        assert_eq!(gen.bit_set(9).unwrap(), &[0b0001_0000u8, 0]);
        assert_eq!(gen.bit_set(1).unwrap(), &[0u8, 0]);
    }

    #[test]
    fn test_generator_rejects_misuse() {
        assert!(Generator::new(12).is_err());

        let mut gen = Generator::new(8).unwrap();
        assert!(matches!(
            gen.add_bloom(1, &Bloom::default()),
            Err(IndexError::InvalidBloomIndex { expected: 0, got: 1 })
        ));
        assert!(matches!(gen.bit_set(0), Err(IndexError::IncompleteSection { have: 0, want: 8 })));
        for i in 0..8 {
            gen.add_bloom(i, &Bloom::default()).unwrap();
        }
        assert!(matches!(
            gen.add_bloom(8, &Bloom::default()),
            Err(IndexError::BloomSectionFull { size: 8 })
        ));
        assert!(matches!(gen.bit_set(BLOOM_BIT_LENGTH), Err(IndexError::BloomBitOutOfBounds(_))));
    }

    #[test]
    fn test_bloom_bit_matches_column() {
        let mut bloom = Bloom::default();
        bloom.add(b"topic");
        let mut gen = Generator::new(8).unwrap();
        gen.add_bloom(0, &bloom).unwrap();
        for i in 1..8 {
            gen.add_bloom(i, &Bloom::default()).unwrap();
        }
        for bit in 0..BLOOM_BIT_LENGTH {
            let set = gen.bit_set(bit).unwrap()[0] & 0x80 != 0;
            assert_eq!(set, bloom.bit(bit), "bit {bit}");
        }
    }
}
