//! `raid1(k)`: `k` identical replicas, no XOR parity.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use super::io::{delete_extent, read_extent, write_extent};
use super::{attrs_for, root_for, LayoutModule};
use crate::error::{ErrorKind, PhobosError, Result};
use crate::io_adapter::registry::adapter_for;
use crate::lrs::{GrantedMedium, ReleaseMedium};
use crate::mapper::map_path;
use crate::model::layout::ExtentState;
use crate::processor::{align_split_size, new_extent, Header};

fn repl_count(params: &BTreeMap<String, String>, default: u32) -> usize {
    params
        .get("repl_count")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default as usize)
        .max(1)
}

/// `k`-way replication: `n_data = 1`, `n_parity = k - 1`.
pub struct Raid1;

impl LayoutModule for Raid1 {
    fn name(&self) -> &'static str {
        "raid1"
    }

    fn stripe(&self, params: &BTreeMap<String, String>) -> (usize, usize) {
        // repl_count's default is only known once a Config is in hand, so
        // callers that need the configured default call stripe() after
        // encode_init has recorded repl_count on the layout.
        let k = repl_count(params, 2);
        (1, k - 1)
    }

    fn encode_init(&self, header: &mut Header) -> Result<()> {
        let k = header
            .layout
            .params
            .get("repl_count")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(header.config.raid1_repl_count)
            .max(1);
        header.layout.params.insert("repl_count".into(), k.to_string());
        header.layout.params.insert("n_data".into(), "1".into());
        header.layout.params.insert("n_parity".into(), (k - 1).to_string());
        Ok(())
    }

    fn decode_init(&self, header: &mut Header) -> Result<()> {
        header
            .layout
            .splits()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("raid1 layout has no coherent splits".into())))?;
        Ok(())
    }

    fn erase_init(&self, header: &mut Header) -> Result<()> {
        self.decode_init(header)
    }

    fn write_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        if granted.is_empty() {
            return Err(PhobosError::new(ErrorKind::Protocol("raid1 write needs at least one medium".into())));
        }
        let remaining = header.remaining();
        let raw_size = granted.iter().fold(remaining, |acc, g| acc.min(g.avail_size));
        let split_size = align_split_size(raw_size, remaining, header.state.io_block_size) as usize;

        let mut buf = vec![0u8; split_size];
        header
            .reader
            .as_mut()
            .ok_or_else(|| PhobosError::new(ErrorKind::BadFd))?
            .read_exact(&mut buf)
            .map_err(|e| PhobosError::new(ErrorKind::Io(e.to_string())))?;

        let offset = header.state.reader_offset;
        let split_idx = header.state.current_split;
        let mut released = Vec::with_capacity(granted.len());
        for (slot, medium) in granted.iter().enumerate() {
            let copy_name = format!("r{slot}");
            let tag = format!("s{split_idx}.data.{slot}");
            let adapter = adapter_for(medium.medium.family)?;
            let address = map_path(&header.oid, Some(&tag));
            let attrs = attrs_for(header, &copy_name, &BTreeMap::new());
            // Any single replica's open/write failure aborts the whole
            // split: already-written replicas become orphans (spec.md §4.2
            // failure semantics), the error propagates to the caller.
            let hashes = write_extent(&header.config, adapter.as_ref(), &medium.medium, &medium.root_path, &address, attrs, &buf)?;

            let idx = header.layout.extents.len();
            let mut extent = new_extent(
                idx,
                offset,
                split_size as u64,
                medium.medium.clone(),
                address,
                medium.fs_type.clone(),
                medium.addr_type.clone(),
                header.grouping.clone(),
            );
            extent.md5 = hashes.md5;
            extent.xxh128 = hashes.xxh128;
            header.layout.extents.push(extent);
            released.push(ReleaseMedium {
                medium: medium.medium.clone(),
                rc: 0,
                size_written: split_size as u64,
                nb_extents_written: 1,
                grouping: header.grouping.clone(),
                to_sync: false,
            });
        }
        header.state.reader_offset += split_size as u64;
        Ok(released)
    }

    fn read_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        let idx = header.state.current_split;
        let width = header
            .layout
            .stripe_width()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("raid1 layout has no stripe width".into())))?;
        let split = &header.layout.extents[idx * width..(idx + 1) * width];

        let (extent, granted_medium) = split
            .iter()
            .find_map(|e| root_for(granted, &e.media_ref).map(|g| (e.clone(), g)))
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("no replica granted for split".into())))?;

        let (bytes, hashes) = read_extent(
            &header.config,
            adapter_for(extent.media_ref.family)?.as_ref(),
            &extent.media_ref,
            &granted_medium.root_path,
            &extent.address,
            extent.size as usize,
        )?;
        let recorded = crate::hash::ExtentHashes {
            md5: extent.md5,
            xxh128: extent.xxh128,
        };
        if !hashes.verify(&recorded) {
            return Err(PhobosError::new(ErrorKind::Corrupted { extent_uuid: extent.uuid }));
        }

        header
            .writer
            .as_mut()
            .ok_or_else(|| PhobosError::new(ErrorKind::BadFd))?
            .write_all(&bytes)
            .map_err(|e| PhobosError::new(ErrorKind::Io(e.to_string())))?;
        header.state.reader_offset += bytes.len() as u64;

        Ok(vec![ReleaseMedium {
            medium: extent.media_ref,
            rc: 0,
            size_written: 0,
            nb_extents_written: 1,
            grouping: None,
            to_sync: false,
        }])
    }

    fn delete_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        let idx = header.state.current_split;
        let width = header
            .layout
            .stripe_width()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("raid1 layout has no stripe width".into())))?;
        let split: Vec<_> = header.layout.extents[idx * width..(idx + 1) * width].to_vec();

        let mut released = Vec::with_capacity(split.len());
        for extent in &split {
            let granted_medium = match root_for(granted, &extent.media_ref) {
                Some(g) => g,
                None => continue,
            };
            delete_extent(
                adapter_for(extent.media_ref.family)?.as_ref(),
                &extent.media_ref,
                &granted_medium.root_path,
                &extent.address,
                extent.size,
            )?;
            released.push(ReleaseMedium {
                medium: extent.media_ref.clone(),
                rc: 0,
                size_written: 0,
                nb_extents_written: 1,
                grouping: None,
                to_sync: false,
            });
        }
        for extent in header.layout.extents[idx * width..(idx + 1) * width].iter_mut() {
            extent.state = ExtentState::Orphan;
        }
        if let Some(last) = split.last() {
            header.state.reader_offset += last.size;
        }
        Ok(released)
    }
}
