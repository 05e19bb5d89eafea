//! Core data model: objects, layouts, extents, media references, and
//! transfers (spec.md §3).

pub mod layout;
pub mod medium;
pub mod object;
pub mod xfer;

pub use layout::{Extent, ExtentState, Layout, LayoutDescriptor};
pub use medium::{Family, MediaStats, MediumRef};
pub use object::Object;
pub use xfer::{GetParams, PutParams, Target, TargetParams, Xfer};
