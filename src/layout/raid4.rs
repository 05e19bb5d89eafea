//! `raid4`: two data stripes, one fixed XOR parity stripe.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use super::io::{delete_extent, pad_to, read_extent, write_extent, xor_into};
use super::{attrs_for, root_for, LayoutModule};
use crate::error::{ErrorKind, PhobosError, Result};
use crate::hash::{ExtentHashes, ExtentHasher};
use crate::io_adapter::registry::adapter_for;
use crate::lrs::{GrantedMedium, ReleaseMedium};
use crate::mapper::map_path;
use crate::model::layout::{Extent, ExtentState};
use crate::processor::{floor_to_chunk, new_extent, Header};

/// Fixed two-data, one-parity XOR layout: `n_data = 2`, `n_parity = 1`.
pub struct Raid4;

fn recorded_hashes(e: &Extent) -> ExtentHashes {
    ExtentHashes {
        md5: e.md5,
        xxh128: e.xxh128,
    }
}

impl LayoutModule for Raid4 {
    fn name(&self) -> &'static str {
        "raid4"
    }

    fn stripe(&self, _params: &BTreeMap<String, String>) -> (usize, usize) {
        (2, 1)
    }

    fn encode_init(&self, header: &mut Header) -> Result<()> {
        header.layout.params.insert("n_data".into(), "2".into());
        header.layout.params.insert("n_parity".into(), "1".into());
        Ok(())
    }

    fn decode_init(&self, header: &mut Header) -> Result<()> {
        header
            .layout
            .splits()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("raid4 layout has no coherent splits".into())))?;
        Ok(())
    }

    fn erase_init(&self, header: &mut Header) -> Result<()> {
        self.decode_init(header)
    }

    fn write_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        if granted.len() != 3 {
            return Err(PhobosError::new(ErrorKind::Protocol("raid4 write needs exactly 3 media".into())));
        }
        let (data0, data1, parity) = (&granted[0], &granted[1], &granted[2]);

        let remaining = header.remaining();
        let per_stripe = remaining.div_ceil(2);
        let mut max_chunk = per_stripe.min(data0.avail_size).min(data1.avail_size);
        let is_final = remaining <= max_chunk.saturating_mul(2);
        if !is_final {
            max_chunk = floor_to_chunk(max_chunk, header.state.io_block_size);
        }
        let chunk0_len = remaining.min(max_chunk) as usize;
        let mut chunk0 = vec![0u8; chunk0_len];
        let reader = header.reader.as_mut().ok_or_else(|| PhobosError::new(ErrorKind::BadFd))?;
        reader
            .read_exact(&mut chunk0)
            .map_err(|e| PhobosError::new(ErrorKind::Io(e.to_string())))?;

        let remaining_after0 = remaining - chunk0_len as u64;
        let chunk1_len = remaining_after0.min(max_chunk) as usize;
        let mut chunk1 = vec![0u8; chunk1_len];
        reader
            .read_exact(&mut chunk1)
            .map_err(|e| PhobosError::new(ErrorKind::Io(e.to_string())))?;

        let stripe_len = chunk0_len.max(chunk1_len);
        let mut parity_buf = chunk0.clone();
        pad_to(&mut parity_buf, stripe_len);
        let mut chunk1_padded = chunk1.clone();
        pad_to(&mut chunk1_padded, stripe_len);
        xor_into(&mut parity_buf, &chunk1_padded);

        let offset = header.state.reader_offset;
        let base_idx = header.layout.extents.len();

        let mut released = Vec::with_capacity(3);
        for (slot, (medium, bytes, copy_name)) in [
            (data0, &chunk0, "d0"),
            (data1, &chunk1, "d1"),
            (parity, &parity_buf, "p0"),
        ]
        .into_iter()
        .enumerate()
        {
            let split_idx = header.state.current_split;
            let tag = match slot {
                0 => format!("s{split_idx}.data.0"),
                1 => format!("s{split_idx}.data.1"),
                _ => format!("s{split_idx}.parity.0"),
            };
            let adapter = adapter_for(medium.medium.family)?;
            let address = map_path(&header.oid, Some(&tag));
            let attrs = attrs_for(header, copy_name, &BTreeMap::new());
            let hashes = write_extent(&header.config, adapter.as_ref(), &medium.medium, &medium.root_path, &address, attrs, bytes)?;

            let idx = base_idx + slot;
            let mut extent = new_extent(
                idx,
                offset,
                bytes.len() as u64,
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
                size_written: bytes.len() as u64,
                nb_extents_written: 1,
                grouping: header.grouping.clone(),
                to_sync: false,
            });
        }
        header.state.reader_offset += (chunk0_len + chunk1_len) as u64;
        Ok(released)
    }

    fn read_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        let idx = header.state.current_split;
        let base = idx * 3;
        let (data0, data1, parity) = (
            header.layout.extents[base].clone(),
            header.layout.extents[base + 1].clone(),
            header.layout.extents[base + 2].clone(),
        );

        let have0 = root_for(granted, &data0.media_ref);
        let have1 = root_for(granted, &data1.media_ref);

        let (bytes0, bytes1, released) = match (have0, have1) {
            (Some(g0), Some(g1)) => {
                let (b0, h0) = read_extent(&header.config, adapter_for(data0.media_ref.family)?.as_ref(), &data0.media_ref, &g0.root_path, &data0.address, data0.size as usize)?;
                if !h0.verify(&recorded_hashes(&data0)) {
                    return Err(PhobosError::new(ErrorKind::Corrupted { extent_uuid: data0.uuid }));
                }
                let (b1, h1) = read_extent(&header.config, adapter_for(data1.media_ref.family)?.as_ref(), &data1.media_ref, &g1.root_path, &data1.address, data1.size as usize)?;
                if !h1.verify(&recorded_hashes(&data1)) {
                    return Err(PhobosError::new(ErrorKind::Corrupted { extent_uuid: data1.uuid }));
                }
                let released = vec![
                    release_of(&data0.media_ref),
                    release_of(&data1.media_ref),
                ];
                (b0, b1, released)
            }
            (Some(g0), None) => {
                let (b0, h0) = read_extent(&header.config, adapter_for(data0.media_ref.family)?.as_ref(), &data0.media_ref, &g0.root_path, &data0.address, data0.size as usize)?;
                if !h0.verify(&recorded_hashes(&data0)) {
                    return Err(PhobosError::new(ErrorKind::Corrupted { extent_uuid: data0.uuid }));
                }
                let gp = root_for(granted, &parity.media_ref)
                    .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("raid4 needs parity to reconstruct".into())))?;
                let (bp, _) = read_extent(&header.config, adapter_for(parity.media_ref.family)?.as_ref(), &parity.media_ref, &gp.root_path, &parity.address, parity.size as usize)?;
                let b1 = reconstruct(&b0, &bp, data1.size as usize, &data1)?;
                (b0, b1, vec![release_of(&data0.media_ref), release_of(&parity.media_ref)])
            }
            (None, Some(g1)) => {
                let (b1, h1) = read_extent(&header.config, adapter_for(data1.media_ref.family)?.as_ref(), &data1.media_ref, &g1.root_path, &data1.address, data1.size as usize)?;
                if !h1.verify(&recorded_hashes(&data1)) {
                    return Err(PhobosError::new(ErrorKind::Corrupted { extent_uuid: data1.uuid }));
                }
                let gp = root_for(granted, &parity.media_ref)
                    .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("raid4 needs parity to reconstruct".into())))?;
                let (bp, _) = read_extent(&header.config, adapter_for(parity.media_ref.family)?.as_ref(), &parity.media_ref, &gp.root_path, &parity.address, parity.size as usize)?;
                let b0 = reconstruct(&b1, &bp, data0.size as usize, &data0)?;
                (b0, b1, vec![release_of(&data1.media_ref), release_of(&parity.media_ref)])
            }
            (None, None) => {
                return Err(PhobosError::new(ErrorKind::Protocol("raid4 split has more than one extent missing".into())));
            }
        };

        let writer = header.writer.as_mut().ok_or_else(|| PhobosError::new(ErrorKind::BadFd))?;
        writer
            .write_all(&bytes0)
            .map_err(|e| PhobosError::new(ErrorKind::Io(e.to_string())))?;
        writer
            .write_all(&bytes1)
            .map_err(|e| PhobosError::new(ErrorKind::Io(e.to_string())))?;
        header.state.reader_offset += (bytes0.len() + bytes1.len()) as u64;
        Ok(released)
    }

    fn delete_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        let idx = header.state.current_split;
        let base = idx * 3;
        let extents: Vec<Extent> = header.layout.extents[base..base + 3].to_vec();
        let mut released = Vec::with_capacity(3);
        let mut advanced = 0u64;
        for extent in &extents {
            if let Some(g) = root_for(granted, &extent.media_ref) {
                delete_extent(adapter_for(extent.media_ref.family)?.as_ref(), &extent.media_ref, &g.root_path, &extent.address, extent.size)?;
                released.push(release_of(&extent.media_ref));
            }
            advanced = advanced.max(extent.size);
        }
        for extent in header.layout.extents[base..base + 3].iter_mut() {
            extent.state = ExtentState::Orphan;
        }
        header.state.reader_offset += advanced;
        Ok(released)
    }
}

fn release_of(medium: &crate::model::medium::MediumRef) -> ReleaseMedium {
    ReleaseMedium {
        medium: medium.clone(),
        rc: 0,
        size_written: 0,
        nb_extents_written: 1,
        grouping: None,
        to_sync: false,
    }
}

/// Recover a missing data stripe as `present ⊕ parity`, truncated to its
/// recorded true length, and verify it against the missing extent's stored
/// hash.
fn reconstruct(present: &[u8], parity: &[u8], true_len: usize, missing: &Extent) -> Result<Vec<u8>> {
    let mut recovered = present.to_vec();
    pad_to(&mut recovered, parity.len());
    xor_into(&mut recovered, parity);
    recovered.truncate(true_len);

    let mut hasher = ExtentHasher::new(missing.md5.is_some(), missing.xxh128.is_some());
    hasher.update(&recovered);
    if !hasher.finish().verify(&recorded_hashes(missing)) {
        return Err(PhobosError::new(ErrorKind::Corrupted { extent_uuid: missing.uuid }));
    }
    Ok(recovered)
}
