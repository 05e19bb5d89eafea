//! I/O adapter layer: the per-medium byte-level operations (spec.md §4.3).
//!
//! An [`IoAdapter`] hides medium specifics behind a small capability set,
//! the same shape as the teacher's `Filesystem` trait: every mandatory
//! method must be implemented (there is no default-to-`ENOSYS` fallback,
//! unlike the teacher, because an adapter that is missing a mandatory
//! method is a fatal configuration error at registration time rather than
//! a per-call failure — see [`registry`]); the two optional hints have
//! default implementations.

#[cfg(any(test, feature = "test-util"))]
pub mod null;
pub mod posix;
pub mod registry;

use std::any::Any;
use std::fmt;

use bitflags::bitflags;

use crate::error::Result;
use crate::lrs::ExtentAttrs;
use crate::model::medium::MediumRef;

bitflags! {
    /// Flags carried on an I/O descriptor, controlling how an adapter
    /// opens/handles an extent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IoFlags: u32 {
        /// Open for metadata only; no payload read/write will follow.
        const MD_ONLY    = 0b0000_0001;
        /// Replace an existing extent at this address rather than failing
        /// if one is present.
        const REPLACE    = 0b0000_0010;
        /// Flush to stable storage on close.
        const SYNC_FILE  = 0b0000_0100;
        /// Do not reuse an existing handle/connection for this open.
        const NO_REUSE   = 0b0000_1000;
        /// This open is part of a deletion.
        const DELETE     = 0b0001_0000;
    }
}

/// Opaque per-open context, downcast by the adapter that created it.
pub type IoContext = Box<dyn Any + Send>;

/// Extent key the mapper produced, handed to `open`/`get`/`del`.
#[derive(Debug, Clone)]
pub struct ExtentKey {
    /// Backend address as computed by the mapper (or stored verbatim for
    /// hash/opaque-addressed backends).
    pub address: String,
}

/// An I/O descriptor: flags, size, location, attributes, and the adapter's
/// opaque per-open context.
pub struct IoDescriptor {
    /// Open/behavior flags.
    pub flags: IoFlags,
    /// Expected extent size (write) or known extent size (read).
    pub size: u64,
    /// Medium this descriptor addresses.
    pub medium: MediumRef,
    /// Backend root path granted by the LRS for this medium.
    pub root_path: String,
    /// Extended attributes to write (put) or that were read back (get).
    pub attrs: ExtentAttrs,
    /// Adapter-private handle, set by `open`/`get` and consumed by every
    /// other call against this descriptor.
    pub context: Option<IoContext>,
}

impl fmt::Debug for IoDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoDescriptor")
            .field("flags", &self.flags)
            .field("size", &self.size)
            .field("medium", &self.medium)
            .field("root_path", &self.root_path)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

impl IoDescriptor {
    /// Take and downcast the context, panicking if it is absent or of the
    /// wrong type. Adapters call this from every method after `open`/`get`.
    pub fn take_context<T: 'static>(&mut self) -> T {
        let ctx = self
            .context
            .take()
            .expect("io descriptor used before open/get");
        *ctx.downcast::<T>()
            .unwrap_or_else(|_| panic!("io descriptor context type mismatch"))
    }

    /// Borrow the context, downcast, without consuming it.
    pub fn context_mut<T: 'static>(&mut self) -> &mut T {
        self.context
            .as_mut()
            .expect("io descriptor used before open/get")
            .downcast_mut::<T>()
            .unwrap_or_else(|| panic!("io descriptor context type mismatch"))
    }
}

/// The per-medium capability set. One implementation per filesystem family.
pub trait IoAdapter: Send + Sync {
    /// Open an extent for reading or writing. `is_put` distinguishes the two
    /// (some backends need different flags for each).
    fn open(&self, key: &ExtentKey, iod: &mut IoDescriptor, is_put: bool) -> Result<()>;

    /// Append `count` bytes from `buf` to the extent. Returns the number of
    /// bytes actually written.
    fn write(&self, iod: &mut IoDescriptor, buf: &[u8], count: usize) -> Result<usize>;

    /// Read up to `count` bytes into `buf`. Returns the number of bytes
    /// actually read, which may be less than `count` at end-of-extent.
    fn read(&self, iod: &mut IoDescriptor, buf: &mut [u8], count: usize) -> Result<usize>;

    /// Close the extent, flushing if it was opened for writing.
    fn close(&self, iod: &mut IoDescriptor) -> Result<()>;

    /// Open an existing extent for reading (mandatory for the reader path).
    fn get(&self, key: &ExtentKey, iod: &mut IoDescriptor) -> Result<()>;

    /// Remove an extent (mandatory for the eraser path).
    fn del(&self, iod: &mut IoDescriptor) -> Result<()>;

    /// Write the extended attributes for this extent, using the open
    /// handle or re-opening in metadata-only mode.
    fn set_md(&self, iod: &mut IoDescriptor, key: &ExtentKey) -> Result<()>;

    /// Hint at this backend's preferred I/O block size, used to derive the
    /// stripe (chunk) size. `None` means "unsupported"; the caller falls
    /// back to configuration or the system page size. Queried before any
    /// extent of this family is opened, so it cannot depend on an open
    /// descriptor.
    fn preferred_io_size(&self) -> Option<u64> {
        None
    }

    /// Flush any buffered state for a partial (sync-only) release. Adapters
    /// for which this has no meaning (e.g. tape) may leave the default.
    fn medium_sync(&self, _root: &str) -> Result<()> {
        Ok(())
    }
}
