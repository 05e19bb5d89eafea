//! `plain`: one data extent per split, no redundancy.

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

/// No-redundancy layout: `n_data = 1, n_parity = 0`.
pub struct Plain;

impl LayoutModule for Plain {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn stripe(&self, _params: &BTreeMap<String, String>) -> (usize, usize) {
        (1, 0)
    }

    fn encode_init(&self, header: &mut Header) -> Result<()> {
        header.layout.params.insert("n_data".into(), "1".into());
        header.layout.params.insert("n_parity".into(), "0".into());
        Ok(())
    }

    fn decode_init(&self, header: &mut Header) -> Result<()> {
        header
            .layout
            .splits()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("plain layout has no coherent splits".into())))?;
        Ok(())
    }

    fn erase_init(&self, header: &mut Header) -> Result<()> {
        self.decode_init(header)
    }

    fn write_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        let medium = granted
            .first()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("plain write needs one medium".into())))?;

        let remaining = header.remaining();
        let raw_size = remaining.min(medium.avail_size);
        let split_size = align_split_size(raw_size, remaining, header.state.io_block_size) as usize;
        let mut buf = vec![0u8; split_size];
        header
            .reader
            .as_mut()
            .ok_or_else(|| PhobosError::new(ErrorKind::BadFd))?
            .read_exact(&mut buf)
            .map_err(|e| PhobosError::new(ErrorKind::Io(e.to_string())))?;

        let adapter = adapter_for(medium.medium.family)?;
        let tag = format!("s{}.data.0", header.state.current_split);
        let address = map_path(&header.oid, Some(&tag));
        let attrs = attrs_for(header, "r0", &BTreeMap::new());
        let hashes = write_extent(&header.config, adapter.as_ref(), &medium.medium, &medium.root_path, &address, attrs, &buf)?;

        let offset = header.state.reader_offset;
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
        header.state.reader_offset += split_size as u64;

        Ok(vec![ReleaseMedium {
            medium: medium.medium.clone(),
            rc: 0,
            size_written: split_size as u64,
            nb_extents_written: 1,
            grouping: header.grouping.clone(),
            to_sync: false,
        }])
    }

    fn read_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        let idx = header.state.current_split;
        let extent = header
            .layout
            .extents
            .get(idx)
            .cloned()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("no such split".into())))?;
        let granted_medium = root_for(granted, &extent.media_ref)
            .ok_or_else(|| PhobosError::new(ErrorKind::NoMedium(extent.media_ref.clone())))?;

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
        let extent = header
            .layout
            .extents
            .get(idx)
            .cloned()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("no such split".into())))?;
        let granted_medium = root_for(granted, &extent.media_ref)
            .ok_or_else(|| PhobosError::new(ErrorKind::NoMedium(extent.media_ref.clone())))?;

        delete_extent(
            adapter_for(extent.media_ref.family)?.as_ref(),
            &extent.media_ref,
            &granted_medium.root_path,
            &extent.address,
            extent.size,
        )?;
        header.layout.extents[idx].state = ExtentState::Orphan;
        header.state.reader_offset += extent.size;

        Ok(vec![ReleaseMedium {
            medium: extent.media_ref,
            rc: 0,
            size_written: 0,
            nb_extents_written: 1,
            grouping: None,
            to_sync: false,
        }])
    }
}
