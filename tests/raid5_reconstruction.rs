//! raid5(m): one data stripe reconstructed from the rotating-parity XOR
//! after its medium is destroyed.

mod common;

use std::collections::BTreeMap;
use std::io::Cursor;

use phobos_core::model::medium::Family;
use phobos_core::model::{PutParams, Target, TargetParams};
use phobos_core::{Config, Processor};

fn put_target(objid: &str, size: u64) -> Target {
    let mut layout_params = BTreeMap::new();
    layout_params.insert("m".into(), "4".into());
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
            layout_name: "raid5".into(),
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
fn lost_data_stripe_reconstructs_from_rotating_parity() {
    let adapter = common::dir_null_adapter();
    let media: Vec<_> = (0..4).map(|i| common::dir_medium("lib0", &format!("m{i}"))).collect();
    let mut pool = common::MediaPool::default();
    for m in &media {
        pool.add(m.clone(), "unused-root");
    }

    let size = 999u64;
    let payload: Vec<u8> = (0..size).map(|i| (i % 241) as u8).collect();

    let mut encoder = Processor::init_encoder(&put_target("raid5-obj", size), Config::default()).unwrap();
    encoder.bind_reader(Box::new(Cursor::new(payload.clone())));
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
    assert_eq!(layout.extents.len(), 4);

    // Split 0's parity slot is split_idx % m == 0, so position 1 is a data
    // stripe; destroy it to force reconstruction.
    let destroyed_medium = media[1].clone();
    let destroyed = layout.extents[1].address.clone();
    adapter.destroy(&destroyed);

    let mut dest = Vec::new();
    {
        let mut decoder = Processor::init_decoder(&get_target("raid5-obj", size), layout, Config::default()).unwrap();
        decoder.bind_writer(Box::new(Cursor::new(&mut dest)));
        common::drive(
            &mut decoder,
            &pool,
            common::never_sync(),
            |n| media[..n].to_vec(),
            |m| *m != destroyed_medium,
        );
        assert!(decoder.is_done());
        assert!(decoder.xt_rc().is_none());
    }

    assert_eq!(dest, payload);
}
