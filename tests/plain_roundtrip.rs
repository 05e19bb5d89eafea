//! Seed scenario 1: plain round-trip, directory family.

mod common;

use std::collections::BTreeMap;
use std::io::Cursor;

use phobos_core::model::medium::Family;
use phobos_core::model::{PutParams, Target, TargetParams};
use phobos_core::{Config, Processor};

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

fn get_target(objid: &str, size: u64) -> Target {
    Target {
        objid: objid.to_string(),
        uuid: None,
        version: None,
        fd: -1,
        size,
        attrs: BTreeMap::new(),
        xt_rc: None,
        params: TargetParams::Get(Default::default()),
    }
}

#[test]
fn ten_byte_object_round_trips_through_a_single_extent() {
    let root = tempfile::tempdir().unwrap();
    let medium = common::dir_medium("lib0", "dir0");
    let mut pool = common::MediaPool::default();
    pool.add(medium.clone(), root.path().to_str().unwrap());

    let payload = b"0123456789".to_vec();
    let mut encoder = Processor::init_encoder(&put_target("round-trip-obj", payload.len() as u64), Config::default()).unwrap();
    encoder.bind_reader(Box::new(Cursor::new(payload.clone())));
    common::drive(
        &mut encoder,
        &pool,
        common::never_sync(),
        |_n| vec![medium.clone()],
        |_m| true,
    );
    assert!(encoder.is_done());
    assert!(encoder.xt_rc().is_none());

    let layout = encoder.layout().clone();
    assert_eq!(layout.extents.len(), 1);

    let mut dest = Vec::new();
    {
        let mut decoder = Processor::init_decoder(&get_target("round-trip-obj", payload.len() as u64), layout, Config::default()).unwrap();
        decoder.bind_writer(Box::new(std::io::Cursor::new(&mut dest)));
        common::drive(
            &mut decoder,
            &pool,
            common::never_sync(),
            |_n| vec![medium.clone()],
            |_m| true,
        );
        assert!(decoder.is_done());
        assert!(decoder.xt_rc().is_none());
    }

    assert_eq!(dest, payload);
}
