//! Layouts and extents: the on-catalog description of where an object's
//! bytes live.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::medium::MediumRef;

/// Names and version of the layout module that produced a [`Layout`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    /// Registry name, e.g. `"plain"`, `"raid1"`, `"raid4"`, `"raid5"`.
    pub name: String,
    /// Layout format version, bumped when the on-catalog shape changes.
    pub version: u32,
}

/// Lifecycle state of an extent.
///
/// An extent is created `Pending` by the encoder at split setup, written
/// only by its owning I/O adapter until close, and becomes `Sync` once its
/// medium has acknowledged a release. `Orphan` is terminal: it marks an
/// extent whose owning object was dropped (or whose write failed) without
/// the extent itself being cleaned up; no automatic reaper runs in this
/// core (see the design notes on orphan cleanup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtentState {
    /// Allocated, not yet released.
    Pending,
    /// Released and acknowledged.
    Sync,
    /// Owning object/layout gone; extent itself still present on its medium.
    Orphan,
}

/// A contiguous byte range of an object, written to one medium.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extent {
    /// Identifier for this extent, unique within the object.
    pub uuid: u128,
    /// Index of this extent within the owning layout's extent list.
    pub layout_idx: usize,
    /// Byte offset within the object this extent starts at (data extents
    /// only meaningfully address object bytes; parity extents reuse the
    /// offset of the split they belong to).
    pub offset: u64,
    /// Length of this extent's payload in bytes.
    pub size: u64,
    /// Medium this extent lives on.
    pub media_ref: MediumRef,
    /// Backend-specific address (see the mapper, §4.5).
    pub address: String,
    /// Filesystem family/type string reported at allocation time.
    pub fs_type: String,
    /// Addressing scheme: `"path"`, `"hash"`, or `"opaque"`.
    pub address_type: String,
    /// MD5 of the extent's bytes, if hashing was enabled when it was
    /// written.
    pub md5: Option<[u8; 16]>,
    /// XXH128 of the extent's bytes, if enabled.
    pub xxh128: Option<u128>,
    /// Lifecycle state.
    pub state: ExtentState,
    /// Grouping tag carried from the put request, threaded through to
    /// write-allocation and release requests.
    pub grouping: Option<String>,
}

/// Ordered list of extents plus descriptor and layout-specific parameters.
///
/// Invariant: `extents.len()` is a multiple of `splits * (n_data +
/// n_parity)`, and the extents of one split are contiguous in the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    /// Object this layout belongs to (denormalized so the eraser path can
    /// validate a layout standalone, without an `Object` in hand).
    pub object_uuid: u128,
    /// Object version this layout was written for.
    pub object_version: u32,
    /// Total object size in bytes, redundantly stored (also recorded per
    /// extent as an extended attribute).
    pub object_size: u64,
    /// Which layout module produced this, and at what version.
    pub descriptor: LayoutDescriptor,
    /// Layout-specific parameters, e.g. `repl_count`, parity count.
    pub params: BTreeMap<String, String>,
    /// All extents, split-major.
    pub extents: Vec<Extent>,
}

impl Layout {
    /// Total object size as redundantly stored on the layout.
    pub fn object_size(&self) -> u64 {
        self.object_size
    }

    /// Validate the split-contiguity invariant for a layout whose stripe
    /// width (`n_data + n_parity`) is `stripe_width`. Returns the number of
    /// splits on success.
    pub fn validate_splits(&self, stripe_width: usize) -> Result<usize, String> {
        if stripe_width == 0 {
            return Err("stripe width must be positive".into());
        }
        if self.extents.len() % stripe_width != 0 {
            return Err(format!(
                "extent count {} is not a multiple of stripe width {}",
                self.extents.len(),
                stripe_width
            ));
        }
        let splits = self.extents.len() / stripe_width;
        for (split_idx, chunk) in self.extents.chunks(stripe_width).enumerate() {
            for (pos, extent) in chunk.iter().enumerate() {
                let expected_idx = split_idx * stripe_width + pos;
                if extent.layout_idx != expected_idx {
                    return Err(format!(
                        "extent at position {expected_idx} has layout_idx {}, splits are not contiguous",
                        extent.layout_idx
                    ));
                }
            }
        }
        Ok(splits)
    }

    /// Flip every extent to [`ExtentState::Orphan`]. Used by the delete
    /// path when an object is dropped without its extents being removed.
    pub fn mark_orphaned(&mut self) {
        for extent in &mut self.extents {
            extent.state = ExtentState::Orphan;
        }
    }

    /// Stripe width (`n_data + n_parity`), read from `params`. Every layout
    /// module records `n_data`/`n_parity` at encode time; a layout missing
    /// either key is malformed.
    pub fn stripe_width(&self) -> Option<usize> {
        let n_data: usize = self.params.get("n_data")?.parse().ok()?;
        let n_parity: usize = self.params.get("n_parity")?.parse().ok()?;
        Some(n_data + n_parity)
    }

    /// Extents grouped split-major, using [`Layout::stripe_width`]. Returns
    /// `None` if the width is unknown or does not evenly divide the extent
    /// list.
    pub fn splits(&self) -> Option<Vec<&[Extent]>> {
        let width = self.stripe_width()?;
        if width == 0 || self.extents.len() % width != 0 {
            return None;
        }
        Some(self.extents.chunks(width).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::medium::Family;

    fn extent(idx: usize) -> Extent {
        Extent {
            uuid: idx as u128,
            layout_idx: idx,
            offset: 0,
            size: 4,
            media_ref: MediumRef::new(Family::Dir, "lib0", format!("dir{idx}")),
            address: format!("addr{idx}"),
            fs_type: "posix".into(),
            address_type: "path".into(),
            md5: None,
            xxh128: None,
            state: ExtentState::Pending,
            grouping: None,
        }
    }

    fn layout_with(n: usize) -> Layout {
        Layout {
            object_uuid: 1,
            object_version: 1,
            object_size: 4 * n as u64,
            descriptor: LayoutDescriptor {
                name: "plain".into(),
                version: 1,
            },
            params: BTreeMap::new(),
            extents: (0..n).map(extent).collect(),
        }
    }

    #[test]
    fn validate_splits_accepts_contiguous_layout() {
        let layout = layout_with(6);
        assert_eq!(layout.validate_splits(3).unwrap(), 2);
    }

    #[test]
    fn validate_splits_rejects_non_multiple() {
        let layout = layout_with(5);
        assert!(layout.validate_splits(3).is_err());
    }

    #[test]
    fn validate_splits_rejects_shuffled_extents() {
        let mut layout = layout_with(6);
        layout.extents.swap(0, 3);
        assert!(layout.validate_splits(3).is_err());
    }

    #[test]
    fn mark_orphaned_flips_every_extent() {
        let mut layout = layout_with(3);
        layout.mark_orphaned();
        assert!(layout
            .extents
            .iter()
            .all(|e| e.state == ExtentState::Orphan));
    }
}
