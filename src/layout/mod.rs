//! Layout engine: splits an object into extents according to a named
//! policy and drives the per-split state machine (spec.md §4.2).

pub(crate) mod io;
pub mod plain;
pub mod raid1;
pub mod raid4;
pub mod raid5;
pub mod registry;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::lrs::{ExtentAttrs, GrantedMedium, ReleaseMedium};
use crate::model::medium::MediumRef;
use crate::processor::Header;

/// Capability set every layout module implements. Method shapes mirror the
/// processor's own role split: `*_init` set up processor/layout state,
/// `*_split` move one split's worth of bytes.
pub trait LayoutModule: Send + Sync {
    /// Registry name, e.g. `"plain"`, `"raid1"`, `"raid4"`, `"raid5"`.
    fn name(&self) -> &'static str;

    /// `(n_data, n_parity)` for this module given its layout parameters.
    fn stripe(&self, params: &BTreeMap<String, String>) -> (usize, usize);

    /// Fill the target layout's descriptor and parameters at the start of a
    /// put.
    fn encode_init(&self, header: &mut Header) -> Result<()>;

    /// Validate a source layout and prepare to read it.
    fn decode_init(&self, header: &mut Header) -> Result<()>;

    /// Prepare to delete a layout's extents.
    fn erase_init(&self, header: &mut Header) -> Result<()>;

    /// Consume bytes from `header.reader`, derive parity/replicas, write all
    /// extents of the current split through their adapters, append them to
    /// `header.layout`, and return the per-medium release entries.
    fn write_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>>;

    /// Read the current split's extents (reconstructing from parity/replica
    /// if a data extent is unavailable), write the result to `header.writer`,
    /// and return the per-medium release entries.
    fn read_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>>;

    /// Delete the current split's extents.
    fn delete_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>>;

    /// Hook for a module to stash extra layout-specific extended attributes
    /// before a split is written. No-op by default.
    fn set_extra_attrs(&self, _header: &mut Header) {}
}

/// Look up the `GrantedMedium` matching `medium`, by value equality.
pub(crate) fn root_for<'a>(granted: &'a [GrantedMedium], medium: &MediumRef) -> Option<&'a GrantedMedium> {
    granted.iter().find(|g| &g.medium == medium)
}

/// Build the extended attributes recorded on every extent of `header`'s
/// layout, for the replica/data/parity slot named `copy_name`.
pub(crate) fn attrs_for(header: &Header, copy_name: &str, user_attrs: &BTreeMap<String, String>) -> ExtentAttrs {
    ExtentAttrs {
        user_md: ExtentAttrs::encode_user_md(user_attrs),
        object_size: header.state.object_size,
        object_version: header.layout.object_version,
        layout_name: header.layout.descriptor.name.clone(),
        copy_name: copy_name.to_string(),
        object_uuid: header.layout.object_uuid,
        id: header.oid.clone(),
    }
}
