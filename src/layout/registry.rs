//! Compile-time layout module registry (spec.md §9 "dynamic module
//! loading" → compile-time registry, same treatment as
//! [`crate::io_adapter::registry`]).

use std::sync::Arc;

use super::plain::Plain;
use super::raid1::Raid1;
use super::raid4::Raid4;
use super::raid5::Raid5;
use super::LayoutModule;

/// Resolve a layout module by its registry name. Add a new module by
/// implementing [`LayoutModule`] and matching its name here.
pub fn module_for(name: &str) -> Option<Arc<dyn LayoutModule>> {
    match name {
        "plain" => Some(Arc::new(Plain)),
        "raid1" => Some(Arc::new(Raid1)),
        "raid4" => Some(Arc::new(Raid4)),
        "raid5" => Some(Arc::new(Raid5)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        assert!(module_for("plain").is_some());
        assert!(module_for("raid1").is_some());
        assert!(module_for("raid4").is_some());
        assert!(module_for("raid5").is_some());
    }

    #[test]
    fn unknown_name_is_none() {
        assert!(module_for("nonexistent").is_none());
    }
}
