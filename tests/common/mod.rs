//! Shared test harness: a synchronous stand-in for the LRS peer, driving a
//! [`Processor`] to completion one `step` at a time.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use phobos_core::io_adapter::null::NullAdapter;
use phobos_core::io_adapter::registry;
use phobos_core::lrs::{GrantedMedium, LrsRequest, LrsResponse, SyncThreshold};
use phobos_core::model::medium::{Family, MediumRef};
use phobos_core::Processor;

static DIR_NULL_ADAPTER: OnceLock<Arc<NullAdapter>> = OnceLock::new();

/// Swap in a shared [`NullAdapter`] for [`Family::Dir`], once per test
/// binary. `cargo test` runs a binary's tests concurrently on one process;
/// registering more than once would race on the adapter registry and could
/// drop another test's in-flight extents, so every test that needs
/// destroy/corrupt hooks on directory media goes through this instead of
/// calling `registry::register` directly.
pub fn dir_null_adapter() -> Arc<NullAdapter> {
    DIR_NULL_ADAPTER
        .get_or_init(|| {
            let adapter = Arc::new(NullAdapter::default());
            registry::register(Family::Dir, adapter.clone() as Arc<dyn phobos_core::io_adapter::IoAdapter>);
            adapter
        })
        .clone()
}

/// A sync-threshold that never triggers a partial release on its own (the
/// processor still emits one on the final split).
pub fn never_sync() -> SyncThreshold {
    SyncThreshold {
        sync_nb_req: u64::MAX,
        sync_wsize_kb: u64::MAX,
        sync_time_sec: u64::MAX,
        sync_time_nsec: 0,
    }
}

/// A sync-threshold that fires after every single extent, for the
/// partial-release seed scenario.
pub fn sync_every_extent() -> SyncThreshold {
    SyncThreshold {
        sync_nb_req: 1,
        sync_wsize_kb: u64::MAX,
        sync_time_sec: u64::MAX,
        sync_time_nsec: 0,
    }
}

/// A pool of pre-existing media this test's fake LRS can grant from, each
/// backed by a real directory on disk.
#[derive(Default)]
pub struct MediaPool {
    roots: HashMap<MediumRef, String>,
}

impl MediaPool {
    pub fn add(&mut self, medium: MediumRef, root_path: &str) {
        self.roots.insert(medium, root_path.to_string());
    }

    fn grant(&self, medium: &MediumRef, avail_size: u64) -> GrantedMedium {
        let root_path = self
            .roots
            .get(medium)
            .unwrap_or_else(|| panic!("no root path registered for {medium:?}"))
            .clone();
        GrantedMedium {
            medium: medium.clone(),
            avail_size,
            root_path,
            fs_type: "posix".into(),
            addr_type: "path".into(),
        }
    }
}

/// Drive `processor` to completion. `next_write_media` is called once per
/// write-allocation request and must return one medium per requested slot,
/// in order. `readable` decides, for a read/delete allocation, which of the
/// candidate media are currently grantable (e.g. not destroyed/admin-locked);
/// the harness grants the first `n_required` of those.
pub fn drive<FW, FR>(
    processor: &mut Processor,
    pool: &MediaPool,
    sync_threshold: SyncThreshold,
    mut next_write_media: FW,
    mut readable: FR,
) where
    FW: FnMut(usize) -> Vec<MediumRef>,
    FR: FnMut(&MediumRef) -> bool,
{
    let mut response = None;
    for _ in 0..10_000 {
        let (requests, done) = processor.step(response.take()).expect("processor step failed");
        if requests.is_empty() {
            assert!(done, "no outstanding request but processor is not done");
            return;
        }
        assert_eq!(requests.len(), 1, "one request in flight at a time");
        response = Some(match &requests[0] {
            LrsRequest::WriteAlloc { id, media, .. } => {
                let chosen = next_write_media(media.len());
                assert_eq!(chosen.len(), media.len());
                let granted = chosen
                    .iter()
                    .zip(media.iter())
                    .map(|(medium, spec)| pool.grant(medium, spec.size))
                    .collect();
                LrsResponse::WriteAlloc {
                    req_id: *id,
                    granted,
                    sync_threshold,
                }
            }
            LrsRequest::ReadAlloc {
                id,
                n_required,
                candidate_media,
                ..
            } => {
                let granted = candidate_media
                    .iter()
                    .filter(|m| readable(m))
                    .take(*n_required)
                    .map(|m| pool.grant(m, u64::MAX))
                    .collect::<Vec<_>>();
                assert!(
                    granted.len() >= *n_required,
                    "fake LRS could not satisfy n_required={n_required}"
                );
                LrsResponse::ReadAlloc {
                    req_id: *id,
                    granted,
                }
            }
            LrsRequest::Release { id, .. } => LrsResponse::Release { req_id: *id },
        });
        if done {
            return;
        }
    }
    panic!("processor did not finish within the step budget");
}

/// Build a directory medium.
pub fn dir_medium(library: &str, name: &str) -> MediumRef {
    MediumRef::new(Family::Dir, library, name)
}
