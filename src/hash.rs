//! Per-extent hashing.
//!
//! MD5 is always available; XXH128 is optional. When both are enabled,
//! writers update both in lock-step, and readers verify every hash the
//! extent records. An extent written before an algorithm was enabled simply
//! has no recorded hash for it; verification skips an algorithm with no
//! recorded value rather than treating its absence as corruption.

use md5::Digest;

/// Accumulates MD5 and/or XXH128 over a stream of byte chunks.
#[derive(Debug, Default)]
pub struct ExtentHasher {
    md5: Option<md5::Md5>,
    xxh128: Option<xxhash_rust::xxh3::Xxh3>,
}

impl ExtentHasher {
    /// Start a hasher with the given algorithms enabled.
    pub fn new(enable_md5: bool, enable_xxh128: bool) -> Self {
        ExtentHasher {
            md5: enable_md5.then(md5::Md5::new),
            xxh128: enable_xxh128.then(xxhash_rust::xxh3::Xxh3::new),
        }
    }

    /// Feed one more chunk of extent bytes.
    pub fn update(&mut self, chunk: &[u8]) {
        if let Some(md5) = &mut self.md5 {
            md5.update(chunk);
        }
        if let Some(xxh128) = &mut self.xxh128 {
            xxh128.update(chunk);
        }
    }

    /// Finalize into the extent's recorded hashes.
    pub fn finish(self) -> ExtentHashes {
        ExtentHashes {
            md5: self.md5.map(|h| h.finalize().into()),
            xxh128: self.xxh128.map(|h| h.digest128()),
        }
    }
}

/// The hashes recorded on an extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtentHashes {
    /// MD5 digest, if computed.
    pub md5: Option<[u8; 16]>,
    /// XXH128 digest, if computed.
    pub xxh128: Option<u128>,
}

impl ExtentHashes {
    /// Verify `self` (freshly computed on read) against `recorded` (stored
    /// on the extent at write time). An algorithm missing from either side
    /// is skipped rather than treated as a mismatch.
    pub fn verify(&self, recorded: &ExtentHashes) -> bool {
        let md5_ok = match (self.md5, recorded.md5) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        let xxh_ok = match (self.xxh128, recorded.xxh128) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        md5_ok && xxh_ok
    }
}
