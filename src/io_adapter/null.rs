//! In-memory I/O adapter used by tests to stand in for a real medium,
//! including `Tape` (this core carries no real sequential-access backend;
//! see [`crate::io_adapter::registry`]) and to inject adapter-level `io`
//! failures deterministically.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{ErrorKind, PhobosError, Result};
use crate::io_adapter::{ExtentKey, IoAdapter, IoDescriptor, IoFlags};

struct NullContext {
    address: String,
    cursor: usize,
}

/// An adapter whose "medium" is a process-wide map of byte vectors, keyed
/// by extent address. `sequential` marks it as standing in for tape, which
/// only affects the locate engine's compatibility checks, not I/O here.
pub struct NullAdapter {
    store: Mutex<HashMap<String, Vec<u8>>>,
    sequential: bool,
    fail_open: Mutex<Option<String>>,
}

impl Default for NullAdapter {
    fn default() -> Self {
        NullAdapter {
            store: Mutex::new(HashMap::new()),
            sequential: false,
            fail_open: Mutex::new(None),
        }
    }
}

impl NullAdapter {
    /// Build an adapter marked sequential-access, for tests exercising the
    /// locate engine's tape-compatibility branch.
    pub fn sequential() -> Self {
        NullAdapter {
            sequential: true,
            ..Default::default()
        }
    }

    /// True if this adapter represents a sequential-access (tape-like)
    /// medium.
    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    /// Destroy the bytes at `address`, simulating medium loss (used by the
    /// raid4 reconstruction seed scenario).
    pub fn destroy(&self, address: &str) {
        self.store.lock().unwrap().remove(address);
    }

    /// Corrupt one byte of the extent at `address`, simulating bit rot.
    pub fn corrupt(&self, address: &str) {
        if let Some(bytes) = self.store.lock().unwrap().get_mut(address) {
            if let Some(first) = bytes.first_mut() {
                *first ^= 0xff;
            }
        }
    }

    /// Make the next `open` for `address` fail with an `io` error.
    pub fn fail_next_open(&self, address: &str) {
        *self.fail_open.lock().unwrap() = Some(address.to_string());
    }
}

impl IoAdapter for NullAdapter {
    fn open(&self, key: &ExtentKey, iod: &mut IoDescriptor, is_put: bool) -> Result<()> {
        if self.fail_open.lock().unwrap().as_deref() == Some(key.address.as_str()) {
            self.fail_open.lock().unwrap().take();
            return Err(PhobosError::with_errno(
                ErrorKind::Io(format!("injected open failure for {}", key.address)),
                5,
            ));
        }
        if is_put {
            if !iod.flags.contains(IoFlags::REPLACE) {
                let store = self.store.lock().unwrap();
                if store.contains_key(&key.address) {
                    return Err(PhobosError::with_errno(
                        ErrorKind::Io(format!("extent already exists: {}", key.address)),
                        17,
                    ));
                }
            }
            self.store
                .lock()
                .unwrap()
                .insert(key.address.clone(), Vec::new());
            iod.context = Some(Box::new(NullContext {
                address: key.address.clone(),
                cursor: 0,
            }));
            Ok(())
        } else {
            self.get(key, iod)
        }
    }

    fn write(&self, iod: &mut IoDescriptor, buf: &[u8], count: usize) -> Result<usize> {
        let ctx = iod.context_mut::<NullContext>();
        let mut store = self.store.lock().unwrap();
        let bytes = store
            .get_mut(&ctx.address)
            .ok_or_else(|| PhobosError::new(ErrorKind::Io("extent vanished".into())))?;
        bytes.extend_from_slice(&buf[..count]);
        Ok(count)
    }

    fn read(&self, iod: &mut IoDescriptor, buf: &mut [u8], count: usize) -> Result<usize> {
        let ctx = iod.context_mut::<NullContext>();
        let store = self.store.lock().unwrap();
        let bytes = store
            .get(&ctx.address)
            .ok_or_else(|| PhobosError::new(ErrorKind::Io("extent vanished".into())))?;
        let remaining = bytes.len().saturating_sub(ctx.cursor);
        let n = remaining.min(count);
        buf[..n].copy_from_slice(&bytes[ctx.cursor..ctx.cursor + n]);
        ctx.cursor += n;
        Ok(n)
    }

    fn close(&self, iod: &mut IoDescriptor) -> Result<()> {
        iod.take_context::<NullContext>();
        Ok(())
    }

    fn get(&self, key: &ExtentKey, iod: &mut IoDescriptor) -> Result<()> {
        if !self.store.lock().unwrap().contains_key(&key.address) {
            return Err(PhobosError::with_errno(
                ErrorKind::Io(format!("no such extent: {}", key.address)),
                2,
            ));
        }
        iod.context = Some(Box::new(NullContext {
            address: key.address.clone(),
            cursor: 0,
        }));
        Ok(())
    }

    fn del(&self, iod: &mut IoDescriptor) -> Result<()> {
        let ctx = iod.take_context::<NullContext>();
        self.store.lock().unwrap().remove(&ctx.address);
        Ok(())
    }

    fn set_md(&self, _iod: &mut IoDescriptor, _key: &ExtentKey) -> Result<()> {
        Ok(())
    }

    fn preferred_io_size(&self) -> Option<u64> {
        if self.sequential {
            None
        } else {
            Some(4096)
        }
    }
}
