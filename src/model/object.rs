//! Objects: the client-visible unit of storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::layout::Layout;

/// A stored object: human-readable `oid`, immutable `uuid`, monotonic
/// `version`, free-form attributes, and the [`Layout`] describing where its
/// bytes live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    /// Human-readable object identifier. Not required to be unique across
    /// versions; `uuid` is.
    pub oid: String,
    /// Immutable identifier, assigned once at creation.
    pub uuid: u128,
    /// Monotonically increasing version number.
    pub version: u32,
    /// Free-form user attributes, JSON-encodable, sorted on serialization.
    pub attrs: BTreeMap<String, String>,
    /// The layout describing this object's extents.
    pub layout: Layout,
}

impl Object {
    /// Size in bytes, derived from the sum of the layout's data extents.
    pub fn size(&self) -> u64 {
        self.layout.object_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layout::{Extent, ExtentState, LayoutDescriptor};
    use crate::model::medium::{Family, MediumRef};

    fn sample_layout() -> Layout {
        Layout {
            object_uuid: 42,
            object_version: 1,
            object_size: 10,
            descriptor: LayoutDescriptor {
                name: "plain".into(),
                version: 1,
            },
            params: BTreeMap::new(),
            extents: vec![Extent {
                uuid: 1,
                layout_idx: 0,
                offset: 0,
                size: 10,
                media_ref: MediumRef::new(Family::Dir, "lib0", "dir1"),
                address: "aa/bb/aabbccdd_obj".into(),
                fs_type: "posix".into(),
                address_type: "path".into(),
                md5: None,
                xxh128: None,
                state: ExtentState::Sync,
                grouping: None,
            }],
        }
    }


    #[test]
    fn object_size_reflects_layout() {
        let obj = Object {
            oid: "o1".into(),
            uuid: 42,
            version: 1,
            attrs: BTreeMap::new(),
            layout: sample_layout(),
        };
        assert_eq!(obj.size(), 10);
    }
}
