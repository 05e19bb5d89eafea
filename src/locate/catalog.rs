//! The catalog (DSS) surface the locate engine consumes (spec.md §6).
//!
//! The persistent metadata store itself is out of scope (spec.md §1); this
//! is the minimal queryable-catalog-plus-lock-table contract the data path
//! needs. Production code supplies its own [`Catalog`] backed by the real
//! DSS; [`InMemoryCatalog`] is a fake for tests.

use crate::error::{ErrorKind, PhobosError, Result};
use crate::model::layout::Layout;
use crate::model::medium::{Family, MediumRef};

/// One drive/mount point the locate engine can route a get through.
#[derive(Debug, Clone)]
pub struct Device {
    /// Host this device is attached to.
    pub host: String,
    /// Drive/mount model string, used for tape compatibility lookups.
    pub model: String,
    /// Administrative lock state; a locked device is never a candidate.
    pub admin_locked: bool,
}

/// Catalog surface consumed by the locate engine.
pub trait Catalog: Send + Sync {
    /// Look up the layout of the object named `oid`/`uuid`/`version`.
    /// `None` means no such object is known to the catalog (already
    /// deleted, never existed, or version mismatch) — the caller's cue to
    /// reject the request rather than operate on a layout it was handed
    /// out of band.
    fn lookup_layout(&self, oid: &str, uuid: u128, version: u32) -> Option<Layout>;

    /// Devices of `family`, across every host.
    fn devices(&self, family: Family) -> Vec<Device>;

    /// True if `medium` is administratively locked (taken out of service).
    fn medium_admin_locked(&self, medium: &MediumRef) -> bool;

    /// True if the caller has read permission on `medium`.
    fn medium_readable(&self, medium: &MediumRef) -> bool;

    /// The cartridge/device model of `medium`, when meaningful (tape).
    fn medium_model(&self, medium: &MediumRef) -> Option<String>;

    /// Host currently holding the concurrency lock on `medium`, if any.
    fn lock_holder(&self, medium: &MediumRef) -> Option<String>;

    /// Take the concurrency lock on `medium` for `host`. Fails with
    /// [`ErrorKind::TryAgain`]-adjacent `already-exists` semantics, modeled
    /// here as a plain `Err` the locate engine interprets, when the medium
    /// is already locked by anyone.
    fn lock(&self, medium: &MediumRef, host: &str) -> Result<()>;

    /// Release a lock previously taken by `host` on `medium`.
    fn unlock(&self, medium: &MediumRef, host: &str);

    /// True if `drive_model` can read/write `tape_model`.
    fn drive_compatible(&self, drive_model: &str, tape_model: &str) -> bool;
}

/// Marker error used by [`Catalog::lock`] to signal the medium was already
/// taken by a concurrent locker.
pub fn already_locked() -> PhobosError {
    PhobosError::new(ErrorKind::TryAgain)
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    //! In-memory catalog for tests.

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct State {
        devices: Vec<Device>,
        admin_locked_media: HashSet<MediumRef>,
        unreadable_media: HashSet<MediumRef>,
        medium_models: HashMap<MediumRef, String>,
        locks: HashMap<MediumRef, String>,
        compatibility: HashSet<(String, String)>,
        objects: HashMap<(String, u128, u32), Layout>,
    }

    /// A fully in-memory [`Catalog`], configured directly by tests.
    #[derive(Default)]
    pub struct InMemoryCatalog {
        state: Mutex<State>,
    }

    impl InMemoryCatalog {
        /// Register a device.
        pub fn add_device(&self, host: &str, model: &str) {
            self.state.lock().unwrap().devices.push(Device {
                host: host.to_string(),
                model: model.to_string(),
                admin_locked: false,
            });
        }

        /// Mark a medium as administratively locked.
        pub fn admin_lock_medium(&self, medium: MediumRef) {
            self.state.lock().unwrap().admin_locked_media.insert(medium);
        }

        /// Mark a medium as unreadable (no read permission).
        pub fn deny_read(&self, medium: MediumRef) {
            self.state.lock().unwrap().unreadable_media.insert(medium);
        }

        /// Set the cartridge model for a tape medium.
        pub fn set_medium_model(&self, medium: MediumRef, model: &str) {
            self.state
                .lock()
                .unwrap()
                .medium_models
                .insert(medium, model.to_string());
        }

        /// Seed a pre-existing lock, as if `host` already holds it.
        pub fn seed_lock(&self, medium: MediumRef, host: &str) {
            self.state
                .lock()
                .unwrap()
                .locks
                .insert(medium, host.to_string());
        }

        /// Declare `drive_model` compatible with `tape_model`.
        pub fn allow_drive(&self, drive_model: &str, tape_model: &str) {
            self.state
                .lock()
                .unwrap()
                .compatibility
                .insert((drive_model.to_string(), tape_model.to_string()));
        }

        /// Register an object's layout, as if a put had just completed.
        pub fn put_object(&self, oid: &str, uuid: u128, version: u32, layout: Layout) {
            self.state
                .lock()
                .unwrap()
                .objects
                .insert((oid.to_string(), uuid, version), layout);
        }

        /// Remove an object's layout, as if a delete had just completed.
        /// A second caller racing the same erase then sees `lookup_layout`
        /// return `None` rather than a stale layout.
        pub fn remove_object(&self, oid: &str, uuid: u128, version: u32) {
            self.state
                .lock()
                .unwrap()
                .objects
                .remove(&(oid.to_string(), uuid, version));
        }
    }

    impl Catalog for InMemoryCatalog {
        fn lookup_layout(&self, oid: &str, uuid: u128, version: u32) -> Option<Layout> {
            self.state
                .lock()
                .unwrap()
                .objects
                .get(&(oid.to_string(), uuid, version))
                .cloned()
        }

        fn devices(&self, family: Family) -> Vec<Device> {
            // This fake catalog doesn't key devices by family (a single
            // pool is enough for the tests that exercise it); callers that
            // need per-family devices add disjoint host sets.
            let _ = family;
            self.state.lock().unwrap().devices.clone()
        }

        fn medium_admin_locked(&self, medium: &MediumRef) -> bool {
            self.state.lock().unwrap().admin_locked_media.contains(medium)
        }

        fn medium_readable(&self, medium: &MediumRef) -> bool {
            !self.state.lock().unwrap().unreadable_media.contains(medium)
        }

        fn medium_model(&self, medium: &MediumRef) -> Option<String> {
            self.state.lock().unwrap().medium_models.get(medium).cloned()
        }

        fn lock_holder(&self, medium: &MediumRef) -> Option<String> {
            self.state.lock().unwrap().locks.get(medium).cloned()
        }

        fn lock(&self, medium: &MediumRef, host: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.locks.contains_key(medium) {
                return Err(already_locked());
            }
            state.locks.insert(medium.clone(), host.to_string());
            Ok(())
        }

        fn unlock(&self, medium: &MediumRef, host: &str) {
            let mut state = self.state.lock().unwrap();
            if state.locks.get(medium).map(String::as_str) == Some(host) {
                state.locks.remove(medium);
            }
        }

        fn drive_compatible(&self, drive_model: &str, tape_model: &str) -> bool {
            self.state
                .lock()
                .unwrap()
                .compatibility
                .contains(&(drive_model.to_string(), tape_model.to_string()))
        }
    }
}
