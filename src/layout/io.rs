//! Shared per-extent I/O helpers used by every layout variant.

use crate::config::Config;
use crate::error::Result;
use crate::hash::{ExtentHashes, ExtentHasher};
use crate::io_adapter::{ExtentKey, IoAdapter, IoDescriptor, IoFlags};
use crate::lrs::ExtentAttrs;
use crate::model::medium::MediumRef;

fn hasher_for(config: &Config) -> ExtentHasher {
    ExtentHasher::new(config.hash_md5, config.hash_xxh128)
}

/// Open, write, set attrs, and close one extent. Returns the hashes computed
/// over `bytes`, to be recorded on the [`crate::model::layout::Extent`].
pub(crate) fn write_extent(
    config: &Config,
    adapter: &dyn IoAdapter,
    medium: &MediumRef,
    root_path: &str,
    address: &str,
    attrs: ExtentAttrs,
    bytes: &[u8],
) -> Result<ExtentHashes> {
    let key = ExtentKey {
        address: address.to_string(),
    };
    let mut iod = IoDescriptor {
        flags: IoFlags::empty(),
        size: bytes.len() as u64,
        medium: medium.clone(),
        root_path: root_path.to_string(),
        attrs,
        context: None,
    };
    adapter.open(&key, &mut iod, true)?;
    let mut hasher = hasher_for(config);
    hasher.update(bytes);
    adapter.write(&mut iod, bytes, bytes.len())?;
    adapter.set_md(&mut iod, &key)?;
    adapter.close(&mut iod)?;
    Ok(hasher.finish())
}

/// Open, read up to `len` bytes, and close one extent. Returns the bytes
/// actually read and their computed hashes.
pub(crate) fn read_extent(
    config: &Config,
    adapter: &dyn IoAdapter,
    medium: &MediumRef,
    root_path: &str,
    address: &str,
    len: usize,
) -> Result<(Vec<u8>, ExtentHashes)> {
    let key = ExtentKey {
        address: address.to_string(),
    };
    let mut iod = IoDescriptor {
        flags: IoFlags::empty(),
        size: len as u64,
        medium: medium.clone(),
        root_path: root_path.to_string(),
        attrs: ExtentAttrs::default(),
        context: None,
    };
    adapter.get(&key, &mut iod)?;
    let mut buf = vec![0u8; len];
    let n = adapter.read(&mut iod, &mut buf, len)?;
    buf.truncate(n);
    adapter.close(&mut iod)?;
    let mut hasher = hasher_for(config);
    hasher.update(&buf);
    Ok((buf, hasher.finish()))
}

/// Open and delete one extent.
pub(crate) fn delete_extent(
    adapter: &dyn IoAdapter,
    medium: &MediumRef,
    root_path: &str,
    address: &str,
    size: u64,
) -> Result<()> {
    let key = ExtentKey {
        address: address.to_string(),
    };
    let mut iod = IoDescriptor {
        flags: IoFlags::DELETE,
        size,
        medium: medium.clone(),
        root_path: root_path.to_string(),
        attrs: ExtentAttrs::default(),
        context: None,
    };
    adapter.get(&key, &mut iod)?;
    adapter.del(&mut iod)
}

/// XOR `b` into `a` in place, treating the shorter operand as zero-padded.
pub(crate) fn xor_into(a: &mut [u8], b: &[u8]) {
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x ^= y;
    }
}

/// Pad `bytes` to `len` with zeros (no-op if already at least `len`).
pub(crate) fn pad_to(bytes: &mut Vec<u8>, len: usize) {
    if bytes.len() < len {
        bytes.resize(len, 0);
    }
}
