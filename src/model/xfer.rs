//! Transfers: one client operation over N targets.

use std::collections::BTreeMap;

use crate::model::medium::Family;

/// Per-target parameters specific to a put.
#[derive(Debug, Clone)]
pub struct PutParams {
    /// Medium family to allocate on.
    pub family: Family,
    /// Tags narrowing which media within the family are eligible.
    pub tags: Vec<String>,
    /// Name of the layout module to encode with, e.g. `"raid1"`.
    pub layout_name: String,
    /// Layout-specific parameters, e.g. `{"repl_count": "2"}`.
    pub layout_params: BTreeMap<String, String>,
    /// Grouping tag threaded through to allocation/release requests.
    pub grouping: Option<String>,
    /// If true, force every extent of every split onto separate media (no
    /// reuse of a medium already holding another extent of this object).
    pub no_split: bool,
    /// If true, a pre-existing object of the same `oid` is replaced rather
    /// than versioned.
    pub overwrite: bool,
}

/// Per-target parameters specific to a get.
#[derive(Debug, Clone, Default)]
pub struct GetParams {
    /// If true, run the locate engine and prefer the resulting host rather
    /// than reading locally.
    pub best_host_flag: bool,
    /// Host name chosen by locate, filled in once resolved.
    pub node_name_out: Option<String>,
}

/// Role-specific parameters for one transfer target.
#[derive(Debug, Clone)]
pub enum TargetParams {
    /// Put: write a new object or version.
    Put(PutParams),
    /// Get: read an existing object.
    Get(GetParams),
    /// Delete: erase an existing object's extents.
    Delete,
}

/// One object within a transfer.
#[derive(Debug, Clone)]
pub struct Target {
    /// Human-readable object id.
    pub objid: String,
    /// Object uuid, known for get/delete, assigned for put.
    pub uuid: Option<u128>,
    /// Object version, known for get/delete, assigned for put.
    pub version: Option<u32>,
    /// Opaque handle to the client's source (get) or sink (put) file
    /// descriptor. The data path never interprets this beyond passing it to
    /// the reader/writer callback.
    pub fd: i32,
    /// Size in bytes: for put, the size to be written; for get/delete,
    /// filled in once the object's layout is known.
    pub size: u64,
    /// User attributes.
    pub attrs: BTreeMap<String, String>,
    /// Per-target return code, set once this target's processing finishes
    /// or fails.
    pub xt_rc: Option<i32>,
    /// Role-specific parameters.
    pub params: TargetParams,
}

impl Target {
    /// True once this target has a terminal return code.
    pub fn is_done(&self) -> bool {
        self.xt_rc.is_some()
    }
}

/// One client transfer operation over N targets.
#[derive(Debug, Clone)]
pub struct Xfer {
    /// Targets, processed in order.
    pub targets: Vec<Target>,
    /// Overall return code for the transfer, set once any target fails
    /// fatally or all targets complete.
    pub rc: Option<i32>,
}

impl Xfer {
    /// Build a transfer over the given targets.
    pub fn new(targets: Vec<Target>) -> Self {
        Xfer { targets, rc: None }
    }

    /// True once every target has a terminal return code.
    pub fn is_done(&self) -> bool {
        self.targets.iter().all(Target::is_done)
    }
}
