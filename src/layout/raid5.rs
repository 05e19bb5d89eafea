//! `raid5(m)`: `m - 1` data stripes, one XOR parity stripe whose slot among
//! the `m` extents rotates with the split index.

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

/// Rotating-parity XOR layout: `n_data = m - 1`, `n_parity = 1`.
pub struct Raid5;

fn recorded_hashes(e: &Extent) -> ExtentHashes {
    ExtentHashes {
        md5: e.md5,
        xxh128: e.xxh128,
    }
}

fn m_of(params: &BTreeMap<String, String>, default: u32) -> usize {
    params
        .get("m")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default as usize)
        .max(2)
}

/// Which of the `m` extents in split `split_idx` carries parity. A pure
/// function of split index, never stored on the layout.
fn parity_slot(split_idx: usize, m: usize) -> usize {
    split_idx % m
}

impl LayoutModule for Raid5 {
    fn name(&self) -> &'static str {
        "raid5"
    }

    fn stripe(&self, params: &BTreeMap<String, String>) -> (usize, usize) {
        let m = m_of(params, 4);
        (m - 1, 1)
    }

    fn encode_init(&self, header: &mut Header) -> Result<()> {
        let m = header
            .layout
            .params
            .get("m")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(header.config.raid5_m)
            .max(2);
        header.layout.params.insert("m".into(), m.to_string());
        header.layout.params.insert("n_data".into(), (m - 1).to_string());
        header.layout.params.insert("n_parity".into(), "1".into());
        Ok(())
    }

    fn decode_init(&self, header: &mut Header) -> Result<()> {
        header
            .layout
            .splits()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("raid5 layout has no coherent splits".into())))?;
        Ok(())
    }

    fn erase_init(&self, header: &mut Header) -> Result<()> {
        self.decode_init(header)
    }

    fn write_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        let m = m_of(&header.layout.params, header.config.raid5_m);
        if granted.len() != m {
            return Err(PhobosError::new(ErrorKind::Protocol(format!("raid5 write needs exactly {m} media"))));
        }
        let split_idx = header.state.current_split;
        let pslot = parity_slot(split_idx, m);
        let data_slots: Vec<usize> = (0..m).filter(|&i| i != pslot).collect();

        let remaining = header.remaining();
        let per_stripe = remaining.div_ceil(data_slots.len() as u64);
        let mut max_chunk = data_slots
            .iter()
            .map(|&i| granted[i].avail_size)
            .fold(per_stripe, u64::min);
        let is_final = remaining <= max_chunk.saturating_mul(data_slots.len() as u64);
        if !is_final {
            max_chunk = floor_to_chunk(max_chunk, header.state.io_block_size);
        }
        let mut remaining = remaining;
        let mut chunks: Vec<Vec<u8>> = Vec::with_capacity(data_slots.len());
        {
            let reader = header.reader.as_mut().ok_or_else(|| PhobosError::new(ErrorKind::BadFd))?;
            for _ in &data_slots {
                let len = remaining.min(max_chunk) as usize;
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf).map_err(|e| PhobosError::new(ErrorKind::Io(e.to_string())))?;
                remaining -= len as u64;
                chunks.push(buf);
            }
        }

        let stripe_len = chunks.iter().map(|c| c.len()).max().unwrap_or(0);
        let mut parity_buf = vec![0u8; stripe_len];
        for chunk in &chunks {
            let mut padded = chunk.clone();
            pad_to(&mut padded, stripe_len);
            xor_into(&mut parity_buf, &padded);
        }

        let offset = header.state.reader_offset;
        let base_idx = header.layout.extents.len();
        let mut released = Vec::with_capacity(m);
        let mut data_iter = data_slots.iter().copied().zip(chunks.iter()).enumerate();

        for pos in 0..m {
            let (medium, bytes, copy_name, tag) = if pos == pslot {
                (&granted[pos], &parity_buf, "p0".to_string(), format!("s{split_idx}.parity.0"))
            } else {
                let (data_idx, (_, chunk)) = data_iter.next().expect("one chunk per non-parity slot");
                (&granted[pos], chunk, format!("d{data_idx}"), format!("s{split_idx}.data.{data_idx}"))
            };
            let adapter = adapter_for(medium.medium.family)?;
            let address = map_path(&header.oid, Some(&tag));
            let attrs = attrs_for(header, &copy_name, &BTreeMap::new());
            let hashes = write_extent(&header.config, adapter.as_ref(), &medium.medium, &medium.root_path, &address, attrs, bytes)?;

            let idx = base_idx + pos;
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

        let consumed: u64 = chunks.iter().map(|c| c.len() as u64).sum();
        header.state.reader_offset += consumed;
        Ok(released)
    }

    fn read_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        let m = m_of(&header.layout.params, header.config.raid5_m);
        let split_idx = header.state.current_split;
        let pslot = parity_slot(split_idx, m);
        let base = split_idx * m;
        let extents: Vec<Extent> = header.layout.extents[base..base + m].to_vec();

        let mut missing: Option<usize> = None;
        let mut present: Vec<(usize, Vec<u8>)> = Vec::new();
        let mut released = Vec::with_capacity(m);
        for (pos, extent) in extents.iter().enumerate() {
            match root_for(granted, &extent.media_ref) {
                Some(g) => {
                    let (bytes, hashes) = read_extent(&header.config, adapter_for(extent.media_ref.family)?.as_ref(), &extent.media_ref, &g.root_path, &extent.address, extent.size as usize)?;
                    if !hashes.verify(&recorded_hashes(extent)) {
                        return Err(PhobosError::new(ErrorKind::Corrupted { extent_uuid: extent.uuid }));
                    }
                    released.push(release_of(&extent.media_ref));
                    present.push((pos, bytes));
                }
                None => {
                    if missing.is_some() {
                        return Err(PhobosError::new(ErrorKind::Protocol("raid5 split has more than one extent missing".into())));
                    }
                    missing = Some(pos);
                }
            }
        }

        let recovered = match missing {
            None => None,
            Some(pos) => {
                let stripe_len = present.iter().map(|(_, b)| b.len()).max().unwrap_or(0);
                let mut acc = vec![0u8; stripe_len];
                for (_, bytes) in &present {
                    let mut padded = bytes.clone();
                    pad_to(&mut padded, stripe_len);
                    xor_into(&mut acc, &padded);
                }
                let missing_extent = &extents[pos];
                acc.truncate(missing_extent.size as usize);
                let mut hasher = ExtentHasher::new(missing_extent.md5.is_some(), missing_extent.xxh128.is_some());
                hasher.update(&acc);
                if !hasher.finish().verify(&recorded_hashes(missing_extent)) {
                    return Err(PhobosError::new(ErrorKind::Corrupted { extent_uuid: missing_extent.uuid }));
                }
                Some((pos, acc))
            }
        };

        let mut by_pos: Vec<(usize, Vec<u8>)> = present;
        if let Some((pos, bytes)) = recovered {
            by_pos.push((pos, bytes));
        }
        by_pos.sort_by_key(|(pos, _)| *pos);

        let writer = header.writer.as_mut().ok_or_else(|| PhobosError::new(ErrorKind::BadFd))?;
        let mut advanced = 0u64;
        for (pos, bytes) in &by_pos {
            if *pos == pslot {
                continue;
            }
            writer.write_all(bytes).map_err(|e| PhobosError::new(ErrorKind::Io(e.to_string())))?;
            advanced += bytes.len() as u64;
        }
        header.state.reader_offset += advanced;
        Ok(released)
    }

    fn delete_split(&self, header: &mut Header, granted: &[GrantedMedium]) -> Result<Vec<ReleaseMedium>> {
        let m = m_of(&header.layout.params, header.config.raid5_m);
        let split_idx = header.state.current_split;
        let base = split_idx * m;
        let extents: Vec<Extent> = header.layout.extents[base..base + m].to_vec();
        let mut released = Vec::with_capacity(m);
        let mut advanced = 0u64;
        for extent in &extents {
            if let Some(g) = root_for(granted, &extent.media_ref) {
                delete_extent(adapter_for(extent.media_ref.family)?.as_ref(), &extent.media_ref, &g.root_path, &extent.address, extent.size)?;
                released.push(release_of(&extent.media_ref));
            }
            advanced = advanced.max(extent.size);
        }
        for extent in header.layout.extents[base..base + m].iter_mut() {
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
