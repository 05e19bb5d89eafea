//! Wire protocol between the data path and the LRS peer (spec.md §6).
//!
//! The LRS itself — the resource scheduler that mounts media and assigns
//! drives — is an external collaborator; this module only models the
//! request/response contract the data path expects from it. Protobuf
//! encoding is out of scope; these are plain Rust types the caller is
//! responsible for wiring to whatever transport it uses.

use std::collections::BTreeMap;

use crate::model::medium::{Family, MediumRef};

/// Kind of LRS operation a read-allocation request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOp {
    /// Read an object's bytes.
    Read,
    /// Read in order to delete (eraser role).
    Delete,
}

/// Kind of release this request represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseKind {
    /// Release following a read/delete allocation.
    Read,
    /// Release following a write allocation.
    Write,
}

/// One medium asked for in a write-allocation request.
#[derive(Debug, Clone)]
pub struct WriteAllocMedium {
    /// Tags narrowing eligible media.
    pub tags: Vec<String>,
    /// Family to allocate from.
    pub family: Family,
    /// Requested size in bytes (already over-asked for filesystem/metadata
    /// overhead, see §4.2 split-sizing policy).
    pub size: u64,
}

/// Per-medium outcome of a release request.
#[derive(Debug, Clone)]
pub struct ReleaseMedium {
    /// Medium being released.
    pub medium: MediumRef,
    /// Return code for this medium (`0` on success).
    pub rc: i32,
    /// Bytes written/read on this medium during the split(s) this release
    /// covers.
    pub size_written: u64,
    /// Number of extents written/read on this medium during the split(s)
    /// this release covers.
    pub nb_extents_written: u64,
    /// Grouping tag, threaded through from the target.
    pub grouping: Option<String>,
    /// If true, this is a sync-only partial release: the medium stays
    /// allocated for further writes rather than being relinquished.
    pub to_sync: bool,
}

/// A request the data path emits toward the LRS peer.
#[derive(Debug, Clone)]
pub enum LrsRequest {
    /// Ask for `media.len()` media to write extents to.
    WriteAlloc {
        /// Request identifier, echoed back in the response as `req_id`.
        id: u32,
        /// Media requested, one per data/parity slot of the split.
        media: Vec<WriteAllocMedium>,
        /// If true, every extent must land on a distinct medium (spec.md
        /// `no_split`).
        no_split: bool,
        /// Grouping tag.
        grouping: Option<String>,
    },
    /// Ask for at least `n_required` of `candidate_media` to be made
    /// available for reading (or deleting).
    ReadAlloc {
        /// Request identifier.
        id: u32,
        /// Minimum number of media that must be granted.
        n_required: usize,
        /// Candidate media to choose from (superset of `n_required`, e.g.
        /// every extent of a split for RAID variants).
        candidate_media: Vec<MediumRef>,
        /// Read vs. delete.
        operation: ReadOp,
    },
    /// Release previously allocated media.
    Release {
        /// Request identifier.
        id: u32,
        /// Kind of release.
        kind: ReleaseKind,
        /// Per-medium outcome.
        media: Vec<ReleaseMedium>,
        /// True if every medium in this request is a partial (sync-only)
        /// release.
        partial: bool,
    },
}

impl LrsRequest {
    /// The request identifier, common to every variant.
    pub fn id(&self) -> u32 {
        match self {
            LrsRequest::WriteAlloc { id, .. } => *id,
            LrsRequest::ReadAlloc { id, .. } => *id,
            LrsRequest::Release { id, .. } => *id,
        }
    }
}

/// Sync-threshold parameters carried in a write-allocation response,
/// driving the partial-release rule of spec.md §4.1.
#[derive(Debug, Clone, Copy)]
pub struct SyncThreshold {
    /// Trigger a partial release once this many requests have written
    /// since the last one.
    pub sync_nb_req: u64,
    /// Trigger a partial release once this many KiB have been written
    /// since the last one.
    pub sync_wsize_kb: u64,
    /// Trigger a partial release once this much wall-clock time has
    /// elapsed since the allocation.
    pub sync_time_sec: u64,
    /// Sub-second component of `sync_time_sec`.
    pub sync_time_nsec: u32,
}

/// Everything the LRS tells the data path about a granted medium.
#[derive(Debug, Clone)]
pub struct GrantedMedium {
    /// The medium granted.
    pub medium: MediumRef,
    /// Bytes still available on it, as observed by the LRS at grant time.
    pub avail_size: u64,
    /// Backend root path (for path-addressed families).
    pub root_path: String,
    /// Filesystem type string to record on extents written here.
    pub fs_type: String,
    /// Addressing scheme to record on extents written here.
    pub addr_type: String,
}

/// A response the data path receives from the LRS peer.
#[derive(Debug, Clone)]
pub enum LrsResponse {
    /// Successful write allocation.
    WriteAlloc {
        /// Echoes the request id.
        req_id: u32,
        /// One granted medium per requested slot, in request order.
        granted: Vec<GrantedMedium>,
        /// Sync-threshold to apply to subsequent writes on these media.
        sync_threshold: SyncThreshold,
    },
    /// Successful read allocation.
    ReadAlloc {
        /// Echoes the request id.
        req_id: u32,
        /// Granted media (at least `n_required` of the candidates).
        granted: Vec<GrantedMedium>,
    },
    /// Acknowledged release.
    Release {
        /// Echoes the request id.
        req_id: u32,
    },
    /// The LRS rejected the request.
    Error {
        /// Echoes the request id of the request that failed.
        req_id: u32,
        /// `-errno` style payload.
        rc: i32,
        /// Kind name of the request that failed, for diagnostics.
        req_kind: &'static str,
    },
}

impl LrsResponse {
    /// The request id this response answers.
    pub fn req_id(&self) -> u32 {
        match self {
            LrsResponse::WriteAlloc { req_id, .. }
            | LrsResponse::ReadAlloc { req_id, .. }
            | LrsResponse::Release { req_id, .. }
            | LrsResponse::Error { req_id, .. } => *req_id,
        }
    }

    /// True if this response reports an LRS-side error.
    pub fn is_error(&self) -> bool {
        matches!(self, LrsResponse::Error { .. })
    }
}

/// Per-extent extended attributes written alongside the payload (the
/// on-medium format of spec.md §6). Normative attribute names.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExtentAttrs {
    /// Compact, sorted-keys JSON blob of the object's user attributes.
    pub user_md: String,
    /// Total object size.
    pub object_size: u64,
    /// Object version.
    pub object_version: u32,
    /// Layout module name.
    pub layout_name: String,
    /// Copy/replica name (e.g. `"r0"`, `"r1"` for raid1; `"p"` for parity).
    pub copy_name: String,
    /// Object uuid.
    pub object_uuid: u128,
    /// Object id.
    pub id: String,
}

impl ExtentAttrs {
    /// Serialize `attrs` into the compact, sorted-keys `user_md` JSON blob.
    pub fn encode_user_md(attrs: &BTreeMap<String, String>) -> String {
        serde_json::to_string(attrs).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_md_keys_are_sorted() {
        let mut attrs = BTreeMap::new();
        attrs.insert("zeta".to_string(), "1".to_string());
        attrs.insert("alpha".to_string(), "2".to_string());
        let encoded = ExtentAttrs::encode_user_md(&attrs);
        assert!(encoded.find("alpha").unwrap() < encoded.find("zeta").unwrap());
    }

    #[test]
    fn response_echoes_request_id() {
        let resp = LrsResponse::Release { req_id: 7 };
        assert_eq!(resp.req_id(), 7);
        assert!(!resp.is_error());
    }
}
