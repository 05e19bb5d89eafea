//! Medium references and the per-medium statistics the data path reads and
//! writes during a transfer.

use serde::{Deserialize, Serialize};

/// The backend family of a medium, fixing which [`crate::io_adapter::IoAdapter`]
/// handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    /// Plain directory, path-addressed.
    Dir,
    /// Disk device, path-addressed through a mount point.
    Disk,
    /// Magnetic tape, sequential-access.
    Tape,
}

/// A medium reference. The triple is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediumRef {
    /// Backend family.
    pub family: Family,
    /// Library the medium lives in (meaningful for `Tape`; a fixed name for
    /// directory/disk families).
    pub library: String,
    /// Medium name, unique within `(family, library)`.
    pub name: String,
}

impl MediumRef {
    /// Build a medium reference.
    pub fn new(family: Family, library: impl Into<String>, name: impl Into<String>) -> Self {
        MediumRef {
            family,
            library: library.into(),
            name: name.into(),
        }
    }
}

/// Catalog-only statistics about a medium. The data path only reads
/// `avail_size` from allocation responses and writes `size_written` /
/// `nb_extents_written` in release requests; the rest is informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaStats {
    /// Number of objects with at least one extent on this medium.
    pub objects_count: u64,
    /// Logical bytes used (pre-layout-expansion).
    pub logical_used: u64,
    /// Physical bytes used on the backend.
    pub physical_used: u64,
    /// Bytes still available for allocation.
    pub free: u64,
    /// Number of times this medium has been loaded (tape) or mounted.
    pub load_count: u64,
    /// Cumulative I/O error count observed on this medium.
    pub error_count: u64,
}
