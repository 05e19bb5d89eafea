//! Seed scenario 2: raid1(2), one replica lost after the fact.

mod common;

use std::collections::BTreeMap;
use std::io::Cursor;

use phobos_core::model::medium::Family;
use phobos_core::model::{PutParams, Target, TargetParams};
use phobos_core::{Config, Processor};

fn put_target(objid: &str, size: u64) -> Target {
    let mut layout_params = BTreeMap::new();
    layout_params.insert("repl_count".into(), "2".into());
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
            layout_name: "raid1".into(),
            layout_params,
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
fn get_succeeds_from_surviving_replica_after_one_is_destroyed() {
    let adapter = common::dir_null_adapter();
    let m1 = common::dir_medium("lib0", "replica-a");
    let m2 = common::dir_medium("lib0", "replica-b");
    let mut pool = common::MediaPool::default();
    pool.add(m1.clone(), "unused-root-a");
    pool.add(m2.clone(), "unused-root-b");

    let size = 1024 * 1024;
    let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();

    let mut encoder = Processor::init_encoder(&put_target("raid1-obj", size as u64), Config::default()).unwrap();
    encoder.bind_reader(Box::new(Cursor::new(payload.clone())));
    let replicas = [m1.clone(), m2.clone()];
    common::drive(
        &mut encoder,
        &pool,
        common::never_sync(),
        |n| replicas[..n].to_vec(),
        |_m| true,
    );
    assert!(encoder.is_done());
    assert!(encoder.xt_rc().is_none());

    let layout = encoder.layout().clone();
    assert_eq!(layout.extents.len(), 2);

    let destroyed = layout.extents[0].address.clone();
    adapter.destroy(&destroyed);

    let mut dest = Vec::new();
    {
        let mut decoder = Processor::init_decoder(&get_target("raid1-obj", size as u64), layout, Config::default()).unwrap();
        decoder.bind_writer(Box::new(Cursor::new(&mut dest)));
        common::drive(
            &mut decoder,
            &pool,
            common::never_sync(),
            |n| replicas[..n].to_vec(),
            |m| *m != m1,
        );
        assert!(decoder.is_done());
        assert!(decoder.xt_rc().is_none());
    }

    assert_eq!(dest, payload);
}
