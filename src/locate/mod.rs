//! Locate engine: choose the best host to run a get from (spec.md §4.4).

pub mod catalog;

#[cfg(any(test, feature = "test-util"))]
pub use catalog::fake::InMemoryCatalog;
pub use catalog::{Catalog, Device};

use std::collections::HashMap;

use crate::error::{ErrorKind, PhobosError, Result};
use crate::model::layout::{Extent, Layout};
use crate::model::medium::{Family, MediumRef};

/// Outcome of a successful [`locate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateResult {
    /// Host a get should be launched on.
    pub host: String,
    /// Number of new concurrency locks taken to secure this result.
    pub nb_new_locks: usize,
}

struct ExtentAccess<'a> {
    medium: &'a MediumRef,
    usable: bool,
    owning_host: Option<String>,
    tape_model: Option<String>,
}

fn access_table<'a>(catalog: &dyn Catalog, split: &'a [Extent]) -> Vec<ExtentAccess<'a>> {
    split
        .iter()
        .map(|extent| {
            let medium = &extent.media_ref;
            let usable = !catalog.medium_admin_locked(medium) && catalog.medium_readable(medium);
            let owning_host = catalog.lock_holder(medium);
            let tape_model = (medium.family == Family::Tape)
                .then(|| catalog.medium_model(medium))
                .flatten();
            ExtentAccess {
                medium,
                usable,
                owning_host,
                tape_model,
            }
        })
        .collect()
}

fn reachable_by(catalog: &dyn Catalog, row: &[ExtentAccess], host: &str, models: &[String]) -> bool {
    row.iter().any(|e| {
        if e.owning_host.as_deref() == Some(host) {
            return true;
        }
        if e.owning_host.is_some() || !e.usable {
            return false;
        }
        if e.medium.family == Family::Tape {
            match &e.tape_model {
                Some(tape_model) => models.iter().any(|drive| catalog.drive_compatible(drive, tape_model)),
                None => false,
            }
        } else {
            true
        }
    })
}

/// Find the best host to read `layout` (of media family `family`) from,
/// preferring `focus_host` on ties, pre-locking media on the winner.
pub fn locate(
    catalog: &dyn Catalog,
    layout: &Layout,
    family: Family,
    focus_host: &str,
) -> Result<LocateResult> {
    let splits = layout
        .splits()
        .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("layout has no coherent splits".into())))?;

    let mut hosts: HashMap<String, Vec<String>> = HashMap::new();
    for device in catalog.devices(family).into_iter().filter(|d| !d.admin_locked) {
        hosts.entry(device.host).or_default().push(device.model);
    }
    if hosts.is_empty() {
        return Err(PhobosError::new(ErrorKind::UnreachableSplit));
    }

    let tables: Vec<Vec<ExtentAccess>> = splits.iter().map(|split| access_table(catalog, split)).collect();

    struct Score {
        nb_locked: usize,
        nb_unreachable: usize,
    }
    let mut scores: HashMap<&str, Score> = HashMap::new();
    for (host, models) in &hosts {
        let mut nb_locked = 0usize;
        let mut nb_unreachable = 0usize;
        for row in &tables {
            if row.iter().any(|e| e.owning_host.as_deref() == Some(host.as_str())) {
                nb_locked += 1;
            }
            if !reachable_by(catalog, row, host, models) {
                nb_unreachable += 1;
            }
        }
        scores.insert(host.as_str(), Score { nb_locked, nb_unreachable });
    }

    let best_host = scores
        .iter()
        .min_by(|(h1, s1), (h2, s2)| {
            s1.nb_unreachable
                .cmp(&s2.nb_unreachable)
                .then(s2.nb_locked.cmp(&s1.nb_locked))
                .then_with(|| (*h2 == focus_host).cmp(&(*h1 == focus_host)))
                .then_with(|| h1.cmp(h2))
        })
        .map(|(h, _)| h.to_string())
        .expect("hosts is non-empty");

    if scores[best_host.as_str()].nb_unreachable > 0 {
        return Err(PhobosError::new(ErrorKind::UnreachableSplit));
    }

    let best_models = &hosts[&best_host];
    let mut acquired: Vec<MediumRef> = Vec::new();
    for row in &tables {
        if row.iter().any(|e| e.owning_host.as_deref() == Some(best_host.as_str())) {
            continue;
        }
        let mut locked_this_split = false;
        for extent in row {
            if extent.owning_host.is_some() || !extent.usable {
                continue;
            }
            if extent.medium.family == Family::Tape {
                let compatible = match &extent.tape_model {
                    Some(tape_model) => best_models.iter().any(|drive| catalog.drive_compatible(drive, tape_model)),
                    None => false,
                };
                if !compatible {
                    continue;
                }
            }
            match catalog.lock(extent.medium, &best_host) {
                Ok(()) => {
                    acquired.push(extent.medium.clone());
                    locked_this_split = true;
                    break;
                }
                Err(_) => continue,
            }
        }
        if !locked_this_split {
            for medium in &acquired {
                catalog.unlock(medium, &best_host);
            }
            return Err(PhobosError::new(ErrorKind::TryAgain));
        }
    }

    Ok(LocateResult {
        host: best_host,
        nb_new_locks: acquired.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::catalog::fake::InMemoryCatalog;
    use crate::model::layout::{ExtentState, LayoutDescriptor};
    use std::collections::BTreeMap;

    fn extent(idx: usize, medium: MediumRef) -> Extent {
        Extent {
            uuid: idx as u128,
            layout_idx: idx,
            offset: 0,
            size: 4,
            media_ref: medium,
            address: format!("addr{idx}"),
            fs_type: "posix".into(),
            address_type: "path".into(),
            md5: None,
            xxh128: None,
            state: ExtentState::Sync,
            grouping: None,
        }
    }

    fn layout(extents: Vec<Extent>) -> Layout {
        let mut params = BTreeMap::new();
        params.insert("n_data".into(), "2".into());
        params.insert("n_parity".into(), "0".into());
        Layout {
            object_uuid: 1,
            object_version: 1,
            object_size: 8,
            descriptor: LayoutDescriptor {
                name: "raid1".into(),
                version: 1,
            },
            params,
            extents,
        }
    }

    #[test]
    fn prefers_focus_host_on_tie() {
        let catalog = InMemoryCatalog::default();
        catalog.add_device("host-a", "any");
        catalog.add_device("host-b", "any");

        let m1 = MediumRef::new(Family::Dir, "lib0", "dir1");
        let m2 = MediumRef::new(Family::Dir, "lib0", "dir2");
        catalog.seed_lock(m1.clone(), "host-a");
        catalog.seed_lock(m2.clone(), "host-b");

        let l = layout(vec![extent(0, m1), extent(1, m2)]);

        let result = locate(&catalog, &l, Family::Dir, "host-b").unwrap();
        assert_eq!(result.host, "host-b");
        assert_eq!(result.nb_new_locks, 0);
    }

    #[test]
    fn no_devices_is_unreachable() {
        let catalog = InMemoryCatalog::default();
        let m1 = MediumRef::new(Family::Dir, "lib0", "dir1");
        let l = layout(vec![extent(0, m1.clone()), extent(1, m1)]);
        assert!(matches!(
            locate(&catalog, &l, Family::Dir, "host-a").unwrap_err().kind,
            ErrorKind::UnreachableSplit
        ));
    }

    #[test]
    fn admin_locked_medium_makes_split_unreachable() {
        let catalog = InMemoryCatalog::default();
        catalog.add_device("host-a", "any");
        let m1 = MediumRef::new(Family::Dir, "lib0", "dir1");
        catalog.admin_lock_medium(m1.clone());
        let l = layout(vec![extent(0, m1.clone()), extent(0, m1)]);
        assert!(matches!(
            locate(&catalog, &l, Family::Dir, "host-a").unwrap_err().kind,
            ErrorKind::UnreachableSplit
        ));
    }

    #[test]
    fn early_locking_secures_unlocked_split() {
        let catalog = InMemoryCatalog::default();
        catalog.add_device("host-a", "any");
        let m1 = MediumRef::new(Family::Dir, "lib0", "dir1");
        let l = layout(vec![extent(0, m1.clone()), extent(1, m1.clone())]);

        let result = locate(&catalog, &l, Family::Dir, "host-a").unwrap();
        assert_eq!(result.host, "host-a");
        assert_eq!(result.nb_new_locks, 1);
        assert_eq!(catalog.lock_holder(&m1), Some("host-a".to_string()));
    }
}
