//! Compile-time I/O adapter registry.
//!
//! The original source dynamically loads a `.so` per family via `dlopen`,
//! guarded by a process-wide read/write lock with double-checked locking
//! (spec.md §5, §9). There is no runtime loading here: every adapter is a
//! type known at compile time, registered once into a process-wide map
//! behind a [`parking_lot::RwLock`]. The lock still matters because
//! constructing an adapter (e.g. opening a connection pool) can be
//! expensive and adapters are looked up on every transfer.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ErrorKind, PhobosError, Result};
use crate::io_adapter::posix::PosixAdapter;
use crate::io_adapter::IoAdapter;
use crate::model::medium::{Family, MediumRef};

static LOADED: RwLock<Option<HashMap<Family, Arc<dyn IoAdapter>>>> = RwLock::new(None);

fn default_adapter(family: Family) -> Option<Arc<dyn IoAdapter>> {
    match family {
        Family::Dir | Family::Disk => Some(Arc::new(PosixAdapter::default())),
        // No real sequential-access backend ships with this core (spec.md §1
        // treats tape media handling as out of scope beyond the adapter
        // trait shape); callers that need one register it explicitly via
        // `register`, e.g. the test-only `NullAdapter` in sequential mode.
        Family::Tape => None,
    }
}

/// Look up (loading on first use) the adapter for `family`.
pub fn adapter_for(family: Family) -> Result<Arc<dyn IoAdapter>> {
    {
        let guard = LOADED.read();
        if let Some(map) = guard.as_ref() {
            if let Some(adapter) = map.get(&family) {
                return Ok(adapter.clone());
            }
        }
    }
    let mut guard = LOADED.write();
    let map = guard.get_or_insert_with(HashMap::new);
    if let Some(adapter) = map.get(&family) {
        return Ok(adapter.clone());
    }
    let adapter = default_adapter(family).ok_or_else(|| {
        PhobosError::new(ErrorKind::NoMedium(MediumRef::new(family, "", "")))
    })?;
    map.insert(family, adapter.clone());
    Ok(adapter)
}

/// Register (or replace) the adapter used for `family`. Intended for tests
/// that stand in a fake adapter for a family with no production backend.
pub fn register(family: Family, adapter: Arc<dyn IoAdapter>) {
    let mut guard = LOADED.write();
    let map = guard.get_or_insert_with(HashMap::new);
    map.insert(family, adapter);
}
