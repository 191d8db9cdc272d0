use crate::error::Result;
use crate::types::{Hash32, Header};

/// Per-section index builder driven by [`ChainIndexer`](crate::ChainIndexer).
///
/// For each section the driver calls `reset`, then `process` once per header
/// in ascending order, then `commit`. Sections never interleave. A failure at
/// any step abandons the section; the driver starts over from `reset`, so a
/// failed `commit` must not leave a root record behind.
pub trait IndexerBackend {
    /// Start `section`. `last_head` is the head of the previous section, or the
    /// zero hash for section 0.
    fn reset(&mut self, section: u64, last_head: &Hash32) -> Result<()>;

    fn process(&mut self, header: &Header) -> Result<()>;

    fn commit(&mut self) -> Result<()>;
}

impl<B: IndexerBackend + ?Sized> IndexerBackend for Box<B> {
    fn reset(&mut self, section: u64, last_head: &Hash32) -> Result<()> {
        (**self).reset(section, last_head)
    }

    fn process(&mut self, header: &Header) -> Result<()> {
        (**self).process(header)
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }
}
