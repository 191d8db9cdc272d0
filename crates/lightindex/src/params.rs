//! Section sizes, confirmation depths and storage namespaces

use std::time::Duration;

/// Block frequency for creating CHTs on the client side.
pub const CHT_FREQUENCY_CLIENT: u64 = 32768;

/// Block frequency for creating CHTs on the server side.
pub const CHT_FREQUENCY_SERVER: u64 = 4096;

/// Confirmations before a server is expected to have a helper trie available
pub const HELPER_TRIE_CONFIRMATIONS: u64 = 2048;

/// Confirmations before a helper trie is generated
pub const HELPER_TRIE_PROCESS_CONFIRMATIONS: u64 = 256;

pub const BLOOM_TRIE_FREQUENCY: u64 = 32768;

/// Raw bloom-bits section size on the server side
pub const BLOOM_BITS_SECTION: u64 = 4096;

pub const BLOOM_BITS_CONFIRMATIONS: u64 = 256;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const CHT_TABLE_PREFIX: &str = "cht-";
pub const BLOOM_TRIE_TABLE_PREFIX: &str = "blt-";

pub const CHT_INDEX_PREFIX: &str = "chtIndex-";
pub const BLOOM_TRIE_INDEX_PREFIX: &str = "bltIndex-";
pub const BLOOM_BITS_INDEX_PREFIX: &str = "iB";
