//! Multi-target transfer: one `Processor` drives every target of an `Xfer`
//! in order, handing each its own byte source and layout (spec.md §3/§4.1).

mod common;

use std::collections::BTreeMap;
use std::io::Cursor;

use phobos_core::model::medium::Family;
use phobos_core::model::{PutParams, Target, TargetParams, Xfer};
use phobos_core::{Config, Processor, Role};

fn put_target(objid: &str, size: u64) -> Target {
    Target {
        objid: objid.to_string(),
        uuid: None,
        version: None,
        fd: -1,
        size,
        attrs: BTreeMap::new(),
        xt_rc: None,
        params: TargetParams::Put(PutParams {
            family: Family::Dir,
            tags: Vec::new(),
            layout_name: "plain".into(),
            layout_params: BTreeMap::new(),
            grouping: None,
            no_split: false,
            overwrite: false,
        }),
    }
}

#[test]
fn encoder_advances_through_every_target_in_order() {
    common::dir_null_adapter();
    let medium = common::dir_medium("lib0", "xfer-medium");
    let mut pool = common::MediaPool::default();
    pool.add(medium.clone(), "unused-root");

    let xfer = Xfer::new(vec![put_target("xfer-a", 10), put_target("xfer-b", 20)]);
    let mut encoder = Processor::init(&xfer, Role::Encoder, Config::default()).unwrap();
    encoder.bind_reader(Box::new(Cursor::new(vec![1u8; 10])));
    encoder.bind_readers(vec![Box::new(Cursor::new(vec![2u8; 20]))]);

    common::drive(&mut encoder, &pool, common::never_sync(), |_n| vec![medium.clone()], |_m| true);

    assert!(encoder.is_done());
    assert!(encoder.xt_rc().is_none());
    assert_eq!(encoder.completed_layouts().len(), 2, "both targets finish and are recorded in order");
    assert_eq!(encoder.completed_layouts()[0].object_size, 10);
    assert_eq!(encoder.completed_layouts()[1].object_size, 20);
    assert_eq!(encoder.layout().object_size, 20, "the last-finished layout is also the processor's final layout");
}

#[test]
fn decoder_xfer_requires_one_layout_per_target() {
    let xfer = Xfer::new(vec![put_target("only-one", 10), put_target("needs-two", 10)]);
    let layout = Processor::init_encoder(&xfer.targets[0], Config::default())
        .unwrap()
        .layout()
        .clone();
    let err = Processor::init_decoder_xfer(&xfer, vec![layout], Config::default());
    assert!(err.is_err(), "target count mismatch against supplied layouts must be rejected");
}
