//! Configuration recognised by the core (spec.md §6). Loading from a file
//! or environment is out of scope; this is the set of effects the data
//! path reacts to, expressed as a plain struct the caller populates however
//! it likes.

use std::collections::HashMap;

use crate::model::medium::Family;

/// Configuration the data path consults. Every field defaults to the value
/// the spec names as the fallback behaviour when unset.
#[derive(Debug, Clone)]
pub struct Config {
    /// Force stripe (chunk) size, overriding the LCM-of-preferred-sizes
    /// computation of spec.md §4.2.
    pub io_block_size: Option<u64>,
    /// Filesystem block size per family, used to pad write-allocation sizes
    /// (spec.md §4.2 split-sizing policy).
    pub fs_block_size: HashMap<Family, u64>,
    /// Default replica count for `raid1` when a put does not override it.
    pub raid1_repl_count: u32,
    /// Default stripe width `m` for `raid5` when a put does not override it.
    pub raid5_m: u32,
    /// Enable MD5 hashing of extents as they are written.
    pub hash_md5: bool,
    /// Enable XXH128 hashing of extents as they are written.
    pub hash_xxh128: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            io_block_size: None,
            fs_block_size: HashMap::new(),
            raid1_repl_count: 2,
            raid5_m: 4,
            hash_md5: true,
            hash_xxh128: false,
        }
    }
}

impl Config {
    /// The filesystem block size configured for `family`, if any.
    pub fn fs_block_size_for(&self, family: Family) -> Option<u64> {
        self.fs_block_size.get(&family).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_fallbacks() {
        let cfg = Config::default();
        assert!(cfg.io_block_size.is_none());
        assert!(cfg.hash_md5);
        assert!(!cfg.hash_xxh128);
        assert_eq!(cfg.raid1_repl_count, 2);
    }

    #[test]
    fn fs_block_size_is_per_family() {
        let mut cfg = Config::default();
        cfg.fs_block_size.insert(Family::Dir, 4096);
        assert_eq!(cfg.fs_block_size_for(Family::Dir), Some(4096));
        assert_eq!(cfg.fs_block_size_for(Family::Tape), None);
    }
}
