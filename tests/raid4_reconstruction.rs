//! Seed scenario 3: raid4, one data stripe reconstructed from the survivor
//! and parity after its medium is destroyed.

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
            layout_name: "raid4".into(),
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
fn lost_data_stripe_reconstructs_from_survivor_and_parity() {
    let adapter = common::dir_null_adapter();
    let m1 = common::dir_medium("lib0", "m1");
    let m2 = common::dir_medium("lib0", "m2");
    let p = common::dir_medium("lib0", "p");
    let mut pool = common::MediaPool::default();
    pool.add(m1.clone(), "unused-m1");
    pool.add(m2.clone(), "unused-m2");
    pool.add(p.clone(), "unused-p");

    let size = 777u64;
    let payload: Vec<u8> = (0..size).map(|i| (i % 199) as u8).collect();

    let mut encoder = Processor::init_encoder(&put_target("raid4-obj", size), Config::default()).unwrap();
    encoder.bind_reader(Box::new(Cursor::new(payload.clone())));
    let media = [m1.clone(), m2.clone(), p.clone()];
    common::drive(
        &mut encoder,
        &pool,
        common::never_sync(),
        |n| media[..n].to_vec(),
        |_m| true,
    );
    assert!(encoder.is_done());
    assert!(encoder.xt_rc().is_none());

    let layout = encoder.layout().clone();
    assert_eq!(layout.extents.len(), 3);

    // M2 holds the second data stripe (position 1 within the split).
    let destroyed = layout.extents[1].address.clone();
    adapter.destroy(&destroyed);

    let mut dest = Vec::new();
    {
        let mut decoder = Processor::init_decoder(&get_target("raid4-obj", size), layout, Config::default()).unwrap();
        decoder.bind_writer(Box::new(Cursor::new(&mut dest)));
        common::drive(
            &mut decoder,
            &pool,
            common::never_sync(),
            |n| media[..n].to_vec(),
            |m| *m != m2,
        );
        assert!(decoder.is_done());
        assert!(decoder.xt_rc().is_none());
    }

    assert_eq!(dest, payload);
}
