//! Bloom trie
//!
//! One leaf per (filter bit, section): `u16_be(bit) ∥ u64_be(section)` maps to
//! the compressed column of that bit over every block of the section. The
//! columns are rebuilt from the raw bloom-bits sub-sections at commit time.

use tracing::{debug, info, warn};
use triedb::{NodeStore, Storage, Table, Trie};

use crate::backend::IndexerBackend;
use crate::bitutil;
use crate::error::{IndexError, Result};
use crate::params::BLOOM_TRIE_TABLE_PREFIX;
use crate::rawdb;
use crate::roots::BLOOM_TRIE_ROOTS;
use crate::types::{Hash32, Header, BLOOM_BIT_LENGTH, ZERO_HASH};

pub fn bloom_trie_table<S: Storage>(diskdb: S) -> Table<S> {
    Table::new(diskdb, BLOOM_TRIE_TABLE_PREFIX)
}

/// Leaf key for `bit` in `section`.
pub fn bloom_trie_key(bit: u16, section: u64) -> [u8; 10] {
    let mut key = [0u8; 10];
    key[..2].copy_from_slice(&bit.to_be_bytes());
    key[2..].copy_from_slice(&section.to_be_bytes());
    key
}

pub struct BloomTrieIndexerBackend<S: Storage + Clone> {
    diskdb: S,
    section_size: u64,
    parent_section_size: u64,
    ratio: u64,
    section: u64,
    section_heads: Vec<Hash32>,
    trie: Option<Trie<Table<S>>>,
}

impl<S: Storage + Clone> BloomTrieIndexerBackend<S> {
    /// `parent_section_size` is the raw bloom-bits section size; it must be a
    /// non-zero multiple of 8 dividing `section_size`.
    pub fn new(diskdb: S, parent_section_size: u64, section_size: u64) -> Result<Self> {
        if parent_section_size == 0 || parent_section_size % 8 != 0 {
            return Err(IndexError::Config(format!(
                "bloom bits section size {parent_section_size} is not a non-zero multiple of 8"
            )));
        }
        if section_size == 0 || section_size % parent_section_size != 0 {
            return Err(IndexError::Config(format!(
                "bloom trie section size {section_size} is not a multiple of {parent_section_size}"
            )));
        }
        let ratio = section_size / parent_section_size;
        Ok(Self {
            diskdb,
            section_size,
            parent_section_size,
            ratio,
            section: 0,
            section_heads: vec![ZERO_HASH; ratio as usize],
            trie: None,
        })
    }

    /// Number of raw bloom-bits sections per bloom trie section.
    pub fn ratio(&self) -> u64 {
        self.ratio
    }

    /// Recorded heads of the current section's sub-sections; unset slots are zero.
    pub fn section_heads(&self) -> &[Hash32] {
        &self.section_heads
    }

    pub fn trie(&self) -> Option<&Trie<Table<S>>> {
        self.trie.as_ref()
    }

    fn trie_mut(&mut self) -> Result<&mut Trie<Table<S>>> {
        self.trie.as_mut().ok_or(IndexError::NotReset)
    }

    /// Concatenated, decompressed column of `bit` across all sub-sections.
    fn read_column(&self, bit: u16) -> Result<Vec<u8>> {
        let part = (self.parent_section_size / 8) as usize;
        let mut decomp = Vec::with_capacity(part * self.section_heads.len());
        for (j, head) in self.section_heads.iter().enumerate() {
            let sub = self.section * self.ratio + j as u64;
            let data = rawdb::read_bloom_bits(&self.diskdb, bit, sub, head)?.ok_or(
                IndexError::MissingBloomData {
                    bit,
                    section: sub,
                    head: *head,
                },
            )?;
            decomp.extend_from_slice(&bitutil::decompress(&data, part)?);
        }
        Ok(decomp)
    }
}

impl<S: Storage + Clone> IndexerBackend for BloomTrieIndexerBackend<S> {
    fn reset(&mut self, section: u64, last_head: &Hash32) -> Result<()> {
        let root = if section > 0 {
            BLOOM_TRIE_ROOTS.get(&self.diskdb, section - 1, last_head)?
        } else {
            ZERO_HASH
        };
        let db = NodeStore::new(bloom_trie_table(self.diskdb.clone()));
        let trie = Trie::new(root, db).map_err(|source| IndexError::TrieOpen { root, source })?;
        self.trie = Some(trie);
        self.section = section;
        self.section_heads = vec![ZERO_HASH; self.ratio as usize];
        Ok(())
    }

    fn process(&mut self, header: &Header) -> Result<()> {
        if self.trie.is_none() {
            return Err(IndexError::NotReset);
        }
        let (number, section) = (header.number, self.section);
        let out_of_section = move || IndexError::OutOfSection { number, section };
        let num = section
            .checked_mul(self.section_size)
            .and_then(|start| number.checked_sub(start))
            .ok_or_else(out_of_section)?;
        if num >= self.section_size {
            return Err(out_of_section());
        }

        // last block of a raw bloom-bits section
        if (num + 1) % self.parent_section_size == 0 {
            let index = (num / self.parent_section_size) as usize;
            let slot = self.section_heads.get_mut(index).ok_or_else(out_of_section)?;
            *slot = header.hash();
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.section_heads.iter().any(|h| *h == ZERO_HASH) {
            warn!(
                section = self.section,
                recorded = self.section_heads.iter().filter(|h| **h != ZERO_HASH).count(),
                expected = self.ratio,
                "bloomtrie: committing with unset sub-section heads"
            );
        }

        let (mut comp_size, mut decomp_size) = (0usize, 0usize);
        for bit in 0..BLOOM_BIT_LENGTH as u16 {
            let decomp = self.read_column(bit)?;
            let comp = bitutil::compress(&decomp);
            decomp_size += decomp.len();
            comp_size += comp.len();

            let key = bloom_trie_key(bit, self.section);
            let trie = self.trie_mut()?;
            if comp.is_empty() {
                trie.delete(&key).map_err(IndexError::Trie)?;
            } else {
                trie.update(&key, &comp).map_err(IndexError::Trie)?;
            }
        }

        let root = self.trie_mut()?.commit().map_err(IndexError::TrieCommit)?;
        let head = self.section_heads.last().copied().unwrap_or(ZERO_HASH);
        let compression = if decomp_size == 0 {
            0.0
        } else {
            comp_size as f64 / decomp_size as f64
        };
        info!(
            section = self.section,
            head = %hex::encode(head),
            root = %hex::encode(root),
            compression,
            "bloomtrie: storing root"
        );
        debug!(section = self.section, comp_size, decomp_size, "bloomtrie: column sizes");
        BLOOM_TRIE_ROOTS.put(&self.diskdb, self.section, &head, &root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use triedb::InMemoryStorage;

    #[test_case(4096, 32768, 8 ; "server")]
    #[test_case(32768, 32768, 1 ; "client")]
    #[test_case(8, 64, 8 ; "small")]
    fn test_ratio(parent: u64, size: u64, ratio: u64) {
        let backend = BloomTrieIndexerBackend::new(InMemoryStorage::new(), parent, size).unwrap();
        assert_eq!(backend.ratio(), ratio);
        assert_eq!(backend.section_heads().len() as u64, ratio);
    }

    #[test_case(0, 32768 ; "zero parent")]
    #[test_case(12, 48 ; "parent not byte aligned")]
    #[test_case(4096, 6000 ; "not a multiple")]
    fn test_invalid_sizes(parent: u64, size: u64) {
        assert!(matches!(
            BloomTrieIndexerBackend::new(InMemoryStorage::new(), parent, size),
            Err(IndexError::Config(_))
        ));
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(bloom_trie_key(0x07ff, 2), [0x07, 0xff, 0, 0, 0, 0, 0, 0, 0, 2]);
    }
}
