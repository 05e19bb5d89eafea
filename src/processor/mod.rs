//! Data Processor: orchestrates one transfer target by cooperatively
//! interleaving byte movance with the LRS request/response protocol
//! (spec.md §4.1).

pub mod ring;

use std::collections::{BTreeMap, VecDeque};
use std::io::{Read, Write};
use std::sync::Arc;

use log::{debug, warn};

use crate::config::Config;
use crate::error::{ErrorKind, PhobosError, Result};
use crate::hash::ExtentHasher;
use crate::io_adapter::registry::adapter_for;
use crate::layout::registry::module_for;
use crate::layout::LayoutModule;
use crate::lrs::{
    LrsRequest, LrsResponse, ReadOp, ReleaseKind, ReleaseMedium, SyncThreshold, WriteAllocMedium,
};
use crate::model::layout::{Extent, ExtentState, Layout, LayoutDescriptor};
use crate::model::medium::{Family, MediumRef};
use crate::model::xfer::{PutParams, Target, TargetParams, Xfer};
use ring::RingBuffer;

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        0
    } else {
        a / gcd(a, b) * b
    }
}

/// Effective I/O chunk size for a step touching `families`: the configured
/// override, else the LCM of the distinct families' adapter
/// `preferred_io_size` hints, else the system page size (spec.md §3/§9).
pub(crate) fn effective_chunk_size(config: &Config, families: impl Iterator<Item = Family>) -> Result<u64> {
    if let Some(forced) = config.io_block_size {
        return Ok(forced);
    }
    let mut seen = std::collections::HashSet::new();
    let mut acc: Option<u64> = None;
    for family in families {
        if !seen.insert(family) {
            continue;
        }
        if let Some(hint) = adapter_for(family)?.preferred_io_size() {
            acc = Some(match acc {
                Some(cur) => lcm(cur, hint),
                None => hint,
            });
        }
    }
    Ok(acc.unwrap_or_else(|| page_size::get() as u64))
}

/// Ring buffer capacity: the LCM of reader/writer stripe, or whichever one
/// is set when only one side is active (decoder-only or encoder-only).
fn stripe_capacity(reader_stripe: u64, writer_stripe: u64) -> usize {
    let bytes = match (reader_stripe, writer_stripe) {
        (0, w) => w,
        (r, 0) => r,
        (r, w) => lcm(r, w),
    };
    bytes.max(1) as usize
}

/// Round `candidate` down to a multiple of `chunk`, unless this split
/// already consumes everything left of the object (the final split is never
/// truncated, per spec.md §3's stripe-alignment rule) or no chunk size is in
/// effect. Never rounds down to zero.
pub(crate) fn align_split_size(candidate: u64, remaining: u64, chunk: u64) -> u64 {
    if chunk == 0 || candidate >= remaining {
        return candidate.min(remaining);
    }
    let aligned = (candidate / chunk) * chunk;
    if aligned == 0 {
        candidate
    } else {
        aligned
    }
}

/// Round `candidate` down to a multiple of `chunk`, never to zero. For
/// striped layouts where a split spans several per-slot chunks at once,
/// the caller decides separately whether this split is the final one.
pub(crate) fn floor_to_chunk(candidate: u64, chunk: u64) -> u64 {
    if chunk == 0 {
        return candidate;
    }
    let floored = (candidate / chunk) * chunk;
    if floored == 0 {
        candidate
    } else {
        floored
    }
}

/// Which of the four capability roles a [`Processor`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Writes a new object version.
    Encoder,
    /// Reads an existing object.
    Decoder,
    /// Deletes an existing object's extents.
    Eraser,
    /// Reader and writer both active (object migration); shares the
    /// Encoder/Decoder machinery but never exposed a raw fd to the client.
    Copier,
}

/// Shared processor state, named and invariant-checked exactly as spec.md
/// §3 "Processor state".
#[derive(Debug)]
pub struct ProcessorState {
    /// Total bytes this target moves.
    pub object_size: u64,
    /// Bytes consumed from the external source so far (encoder) or produced
    /// into it (decoder).
    pub reader_offset: u64,
    /// Bytes handed to the layout module's writer path so far.
    pub writer_offset: u64,
    /// Bytes currently sitting in `ring_buffer` that have been read from the
    /// source but not yet consumed by the writer (or vice versa).
    pub buffer_offset: u64,
    /// Byte queue between source/sink and I/O adapters.
    pub ring_buffer: RingBuffer,
    /// Stripe size on the read side (bytes per data extent per split, for a
    /// decoder).
    pub reader_stripe: u64,
    /// Stripe size on the write side.
    pub writer_stripe: u64,
    /// Effective I/O chunk size (config override, extent metadata, or LCM
    /// of adapter preferred sizes).
    pub io_block_size: u64,
    /// Index of the split currently in flight.
    pub current_split: usize,
    /// Byte offset of `current_split` within the object.
    pub current_split_offset: u64,
    /// Index, within the owning transfer's target list, of the target
    /// currently being processed.
    pub current_target: usize,
    /// Request id of an allocation this processor is waiting on, if any.
    pub requested_alloc: Option<u32>,
    /// True once this processor has nothing further to do.
    pub done: bool,
}

impl ProcessorState {
    fn new(object_size: u64) -> Self {
        ProcessorState {
            object_size,
            reader_offset: 0,
            writer_offset: 0,
            buffer_offset: 0,
            ring_buffer: RingBuffer::with_capacity(0),
            reader_stripe: 0,
            writer_stripe: 0,
            io_block_size: 0,
            current_split: 0,
            current_split_offset: 0,
            current_target: 0,
            requested_alloc: None,
            done: false,
        }
    }
}

/// Accounting kept against an allocation while its split is in flight,
/// driving the sync-threshold rule of spec.md §4.1.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncAccounting {
    /// Bytes written/read since the last release on this allocation.
    pub size_written: u64,
    /// Extents written/read since the last release.
    pub nb_extents_written: u64,
    /// Threshold supplied by the LRS for the current allocation.
    pub threshold: Option<SyncThresholdCopy>,
}

/// Plain copy of [`SyncThreshold`] (kept separate so this module does not
/// need to depend on the wire type being `Copy`).
#[derive(Debug, Clone, Copy)]
pub struct SyncThresholdCopy {
    pub sync_nb_req: u64,
    pub sync_wsize_kb: u64,
}

impl From<SyncThreshold> for SyncThresholdCopy {
    fn from(t: SyncThreshold) -> Self {
        SyncThresholdCopy {
            sync_nb_req: t.sync_nb_req,
            sync_wsize_kb: t.sync_wsize_kb,
        }
    }
}

impl SyncAccounting {
    fn should_sync(&self) -> bool {
        match self.threshold {
            Some(t) => {
                self.nb_extents_written >= t.sync_nb_req.max(1)
                    || self.size_written >= t.sync_wsize_kb.saturating_mul(1024).max(1)
            }
            None => false,
        }
    }
}

/// Shared header threaded through every role. `Processor` is a tagged enum
/// over [`Role`] wrapping one of these rather than a single struct with an
/// `is_decoder` flag.
pub struct Header {
    /// Role this processor drives.
    pub role: Role,
    /// Object id being processed.
    pub oid: String,
    /// Layout-specific knobs (names/params), consulted at `encode_init`.
    pub put_params: Option<PutParams>,
    /// The layout this processor is building (encoder) or consuming
    /// (decoder/eraser).
    pub layout: Layout,
    /// Layout module driving the split state machine.
    pub layout_module: Arc<dyn LayoutModule>,
    /// Effective configuration.
    pub config: Config,
    /// Shared state.
    pub state: ProcessorState,
    /// External byte source (encoder/copier).
    pub reader: Option<Box<dyn Read + Send>>,
    /// External byte sink (decoder/copier).
    pub writer: Option<Box<dyn Write + Send>>,
    /// Next LRS request id this processor will mint.
    next_req_id: u32,
    /// Accounting for the in-flight allocation.
    sync: SyncAccounting,
    /// Grouping tag threaded from the put/get request.
    pub grouping: Option<String>,
    /// Set once a fatal error has been recorded.
    pub xt_rc: Option<i32>,
    /// Targets of this transfer not yet started. `None` alongside a target
    /// means "build a fresh layout from its put params" (encoder/copier);
    /// `Some(layout)` means the layout was already resolved by the caller
    /// (decoder/eraser), since the catalog lookup that supplies it sits
    /// outside `step()`'s allocation-only I/O contract.
    targets_remaining: VecDeque<(Target, Option<Layout>)>,
    /// Byte sources queued for not-yet-started targets, matched 1:1 with
    /// `targets_remaining` in order (encoder/copier only).
    pending_readers: VecDeque<Box<dyn Read + Send>>,
    /// Byte sinks queued for not-yet-started targets (decoder/copier only).
    pending_writers: VecDeque<Box<dyn Write + Send>>,
    /// Layouts of targets that have already finished, in completion order.
    pub completed_layouts: Vec<Layout>,
}

impl Header {
    fn next_id(&mut self) -> u32 {
        self.next_req_id += 1;
        self.next_req_id
    }

    /// Bytes still to be moved for this target.
    pub fn remaining(&self) -> u64 {
        self.state.object_size.saturating_sub(self.state.reader_offset)
    }
}

/// A data processor: one transfer target, one layout module, one role.
pub enum Processor {
    /// Writes a new object version.
    Encoder(Header),
    /// Reads an existing object.
    Decoder(Header),
    /// Deletes an existing object's extents.
    Eraser(Header),
    /// Migrates an object between media.
    Copier(Header),
}

impl Processor {
    fn header(&self) -> &Header {
        match self {
            Processor::Encoder(h) | Processor::Decoder(h) | Processor::Eraser(h) | Processor::Copier(h) => h,
        }
    }

    fn header_mut(&mut self) -> &mut Header {
        match self {
            Processor::Encoder(h) | Processor::Decoder(h) | Processor::Eraser(h) | Processor::Copier(h) => h,
        }
    }

    /// Role this processor drives.
    pub fn role(&self) -> Role {
        self.header().role
    }

    /// True once this processor has nothing further to do.
    pub fn is_done(&self) -> bool {
        self.header().state.done
    }

    /// The layout this processor has built (encoder) or is consuming
    /// (decoder/eraser). A caller persists this once the encoder finishes,
    /// and supplies it back to [`Processor::init_decoder`]/
    /// [`Processor::init_eraser`] for a later target.
    pub fn layout(&self) -> &Layout {
        &self.header().layout
    }

    /// Terminal return code, set once this processor has failed.
    /// `None` while still running or after a clean finish.
    pub fn xt_rc(&self) -> Option<i32> {
        self.header().xt_rc
    }

    /// Build an encoder for a put target against a freshly-named layout.
    pub fn init_encoder(target: &Target, config: Config) -> Result<Self> {
        let put = match &target.params {
            TargetParams::Put(p) => p.clone(),
            _ => return Err(PhobosError::new(ErrorKind::Protocol("encoder needs a put target".into()))),
        };
        let layout_module = module_for(&put.layout_name)
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol(format!("unknown layout module {}", put.layout_name))))?;
        let layout = Layout {
            object_uuid: 0,
            object_version: target.version.unwrap_or(1),
            object_size: target.size,
            descriptor: LayoutDescriptor {
                name: layout_module.name().to_string(),
                version: 1,
            },
            params: put.layout_params.clone(),
            extents: Vec::new(),
        };
        let grouping = put.grouping.clone();
        let mut header = Header {
            role: Role::Encoder,
            oid: target.objid.clone(),
            put_params: Some(put),
            layout,
            layout_module,
            config,
            state: ProcessorState::new(target.size),
            reader: None,
            writer: None,
            next_req_id: 0,
            sync: SyncAccounting::default(),
            grouping,
            xt_rc: None,
            targets_remaining: VecDeque::new(),
            pending_readers: VecDeque::new(),
            pending_writers: VecDeque::new(),
            completed_layouts: Vec::new(),
        };
        header.layout_module.clone().encode_init(&mut header)?;
        Ok(Processor::Encoder(header))
    }

    /// Build an encoder driving every put target of `xfer` in order, the
    /// literal `init(xfer, role, layout_module)` entry point of spec.md
    /// §4.1. Every target must carry [`TargetParams::Put`]. Bind one byte
    /// source per target, in target order, with [`Processor::bind_readers`]
    /// before stepping.
    pub fn init_encoder_xfer(xfer: &Xfer, config: Config) -> Result<Self> {
        let mut targets = xfer.targets.clone();
        if targets.is_empty() {
            return Err(PhobosError::new(ErrorKind::Protocol("xfer has no targets".into())));
        }
        let first = targets.remove(0);
        let mut processor = Self::init_encoder(&first, config)?;
        processor.header_mut().targets_remaining = targets.into_iter().map(|t| (t, None)).collect();
        Ok(processor)
    }

    /// Build a decoder against a known layout.
    pub fn init_decoder(target: &Target, layout: Layout, config: Config) -> Result<Self> {
        let layout_module = module_for(&layout.descriptor.name)
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("unknown layout module on layout".into())))?;
        let mut header = Header {
            role: Role::Decoder,
            oid: target.objid.clone(),
            put_params: None,
            layout,
            layout_module,
            config,
            state: ProcessorState::new(target.size),
            reader: None,
            writer: None,
            next_req_id: 0,
            sync: SyncAccounting::default(),
            grouping: None,
            xt_rc: None,
            targets_remaining: VecDeque::new(),
            pending_readers: VecDeque::new(),
            pending_writers: VecDeque::new(),
            completed_layouts: Vec::new(),
        };
        header.layout_module.clone().decode_init(&mut header)?;
        Ok(Processor::Decoder(header))
    }

    /// Build a decoder driving every get target of `xfer` in order, each
    /// against its already-resolved `layouts[i]` (the catalog lookup that
    /// supplies a layout sits outside the allocation-only `step()` loop, so
    /// the caller must resolve every target's layout up front). Bind one
    /// byte sink per target, in target order, with
    /// [`Processor::bind_writers`] before stepping.
    pub fn init_decoder_xfer(xfer: &Xfer, mut layouts: Vec<Layout>, config: Config) -> Result<Self> {
        if xfer.targets.len() != layouts.len() {
            return Err(PhobosError::new(ErrorKind::Protocol(
                "xfer target count does not match supplied layout count".into(),
            )));
        }
        let mut targets = xfer.targets.clone();
        if targets.is_empty() {
            return Err(PhobosError::new(ErrorKind::Protocol("xfer has no targets".into())));
        }
        let first_target = targets.remove(0);
        let first_layout = layouts.remove(0);
        let mut processor = Self::init_decoder(&first_target, first_layout, config)?;
        processor.header_mut().targets_remaining =
            targets.into_iter().zip(layouts).map(|(t, l)| (t, Some(l))).collect();
        Ok(processor)
    }

    /// Build an eraser against a known layout.
    pub fn init_eraser(target: &Target, layout: Layout, config: Config) -> Result<Self> {
        let layout_module = module_for(&layout.descriptor.name)
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("unknown layout module on layout".into())))?;
        let mut header = Header {
            role: Role::Eraser,
            oid: target.objid.clone(),
            put_params: None,
            layout,
            layout_module,
            config,
            state: ProcessorState::new(target.size),
            reader: None,
            writer: None,
            next_req_id: 0,
            sync: SyncAccounting::default(),
            grouping: None,
            xt_rc: None,
            targets_remaining: VecDeque::new(),
            pending_readers: VecDeque::new(),
            pending_writers: VecDeque::new(),
            completed_layouts: Vec::new(),
        };
        header.layout_module.clone().erase_init(&mut header)?;
        Ok(Processor::Eraser(header))
    }

    /// Build an eraser driving every delete target of `xfer` in order,
    /// each against its already-resolved `layouts[i]`. See
    /// [`Processor::init_decoder_xfer`] for why layouts are supplied rather
    /// than resolved internally.
    pub fn init_eraser_xfer(xfer: &Xfer, mut layouts: Vec<Layout>, config: Config) -> Result<Self> {
        if xfer.targets.len() != layouts.len() {
            return Err(PhobosError::new(ErrorKind::Protocol(
                "xfer target count does not match supplied layout count".into(),
            )));
        }
        let mut targets = xfer.targets.clone();
        if targets.is_empty() {
            return Err(PhobosError::new(ErrorKind::Protocol("xfer has no targets".into())));
        }
        let first_target = targets.remove(0);
        let first_layout = layouts.remove(0);
        let mut processor = Self::init_eraser(&first_target, first_layout, config)?;
        processor.header_mut().targets_remaining =
            targets.into_iter().zip(layouts).map(|(t, l)| (t, Some(l))).collect();
        Ok(processor)
    }

    /// The literal `init(xfer, role, layout_module)` entry point of
    /// spec.md §4.1. `role` selects which of the per-role constructors
    /// drives every target of `xfer`; `Decoder`/`Eraser` need each target's
    /// layout resolved ahead of time (see [`Processor::init_decoder_xfer`]),
    /// so this dispatches to [`Processor::init_encoder_xfer`] for
    /// `Encoder`/`Copier` and expects the caller to use
    /// [`Processor::init_decoder_xfer`]/[`Processor::init_eraser_xfer`]
    /// directly otherwise.
    pub fn init(xfer: &Xfer, role: Role, config: Config) -> Result<Self> {
        match role {
            Role::Encoder | Role::Copier => Self::init_encoder_xfer(xfer, config),
            Role::Decoder => Err(PhobosError::new(ErrorKind::Protocol(
                "decoder targets need resolved layouts; use init_decoder_xfer".into(),
            ))),
            Role::Eraser => Err(PhobosError::new(ErrorKind::Protocol(
                "eraser targets need resolved layouts; use init_eraser_xfer".into(),
            ))),
        }
    }

    /// Attach the external byte source (encoder) or sink (decoder).
    pub fn bind_reader(&mut self, reader: Box<dyn Read + Send>) {
        self.header_mut().reader = Some(reader);
    }

    /// See [`Processor::bind_reader`].
    pub fn bind_writer(&mut self, writer: Box<dyn Write + Send>) {
        self.header_mut().writer = Some(writer);
    }

    /// Queue byte sources for every target queued up after the first, in
    /// target order (encoder/copier multi-target transfers). The first
    /// target's reader is still bound with [`Processor::bind_reader`].
    pub fn bind_readers(&mut self, readers: Vec<Box<dyn Read + Send>>) {
        self.header_mut().pending_readers = readers.into_iter().collect();
    }

    /// See [`Processor::bind_readers`], for decoder/copier sinks.
    pub fn bind_writers(&mut self, writers: Vec<Box<dyn Write + Send>>) {
        self.header_mut().pending_writers = writers.into_iter().collect();
    }

    /// Layouts of targets that have already finished, in completion order.
    /// The in-flight target's layout, if any, is not included until it
    /// finishes too; use [`Processor::layout`] for that one.
    pub fn completed_layouts(&self) -> &[Layout] {
        &self.header().completed_layouts
    }

    fn fail(&mut self, err: PhobosError) -> (Vec<LrsRequest>, bool) {
        warn!("processor for {} failed: {err}", self.header().oid);
        let rc = err.errno.unwrap_or(-1);
        self.header_mut().xt_rc = Some(rc);
        self.header_mut().state.done = true;
        (Vec::new(), true)
    }

    /// Drive exactly one unit of progress (spec.md §4.1 `step` contract).
    pub fn step(&mut self, response: Option<LrsResponse>) -> Result<(Vec<LrsRequest>, bool)> {
        if self.header().state.done {
            return Ok((Vec::new(), true));
        }

        if let Some(resp) = &response {
            if resp.is_error() {
                let LrsResponse::Error { rc, req_kind, .. } = resp else {
                    unreachable!()
                };
                let err = PhobosError::with_errno(ErrorKind::AllocationRefused, *rc);
                warn!("LRS rejected {req_kind} request: rc={rc}");
                return Ok(self.fail(err));
            }
        }

        let result = match response {
            None => self.start(),
            Some(LrsResponse::WriteAlloc {
                granted,
                sync_threshold,
                ..
            }) => self.on_write_alloc(granted, sync_threshold),
            Some(LrsResponse::ReadAlloc { granted, .. }) => self.on_read_alloc(granted),
            Some(LrsResponse::Release { .. }) => self.on_release_ack(),
            Some(LrsResponse::Error { .. }) => unreachable!("handled above"),
        };

        match result {
            Ok(out) => Ok(out),
            Err(err) => Ok(self.fail(err)),
        }
    }

    fn start(&mut self) -> Result<(Vec<LrsRequest>, bool)> {
        match self.role() {
            Role::Encoder | Role::Copier => self.request_write_alloc(),
            Role::Decoder => self.request_read_alloc(ReadOp::Read),
            Role::Eraser => self.request_read_alloc(ReadOp::Delete),
        }
    }

    fn request_write_alloc(&mut self) -> Result<(Vec<LrsRequest>, bool)> {
        let header = self.header_mut();
        let (n_data, n_parity) = (header.layout_module.stripe(&header.layout.params));
        let remaining = header.remaining();
        if remaining == 0 {
            header.state.done = true;
            return Ok((Vec::new(), true));
        }
        let put = header.put_params.clone().ok_or_else(|| {
            PhobosError::new(ErrorKind::Protocol("encoder missing put params".into()))
        })?;
        if header.state.current_split == 0 && header.state.io_block_size == 0 {
            let chunk_size = effective_chunk_size(&header.config, std::iter::once(put.family))?;
            header.state.io_block_size = chunk_size;
            header.state.writer_stripe = chunk_size * n_data.max(1) as u64;
            header.state.ring_buffer = RingBuffer::with_capacity(stripe_capacity(header.state.reader_stripe, header.state.writer_stripe));
        }
        let per_extent = remaining.div_ceil(n_data.max(1) as u64);
        let padded = match header.config.fs_block_size_for(put.family) {
            Some(block) => per_extent.div_ceil(block) * block + 3 * block,
            None => per_extent,
        };
        let media = (0..(n_data + n_parity))
            .map(|_| WriteAllocMedium {
                tags: put.tags.clone(),
                family: put.family,
                size: padded,
            })
            .collect();
        let id = header.next_id();
        header.state.requested_alloc = Some(id);
        Ok((
            vec![LrsRequest::WriteAlloc {
                id,
                media,
                no_split: put.no_split,
                grouping: header.grouping.clone(),
            }],
            false,
        ))
    }

    fn request_read_alloc(&mut self, op: ReadOp) -> Result<(Vec<LrsRequest>, bool)> {
        let header = self.header_mut();
        let (n_data, n_parity) = header.layout_module.stripe(&header.layout.params);
        let splits = header
            .layout
            .splits()
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("layout has no coherent splits".into())))?;
        let split = splits
            .get(header.state.current_split)
            .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("no such split".into())))?;
        let candidate_media: Vec<MediumRef> = split.iter().map(|e| e.media_ref.clone()).collect();
        if header.state.current_split == 0 && header.state.io_block_size == 0 {
            let families = candidate_media.iter().map(|m| m.family);
            let chunk_size = effective_chunk_size(&header.config, families)?;
            header.state.io_block_size = chunk_size;
            header.state.reader_stripe = chunk_size * n_data.max(1) as u64;
            header.state.ring_buffer = RingBuffer::with_capacity(stripe_capacity(header.state.reader_stripe, header.state.writer_stripe));
        }
        let _ = n_parity;
        let id = header.next_id();
        header.state.requested_alloc = Some(id);
        Ok((
            vec![LrsRequest::ReadAlloc {
                id,
                n_required: n_data,
                candidate_media,
                operation: op,
            }],
            false,
        ))
    }

    fn on_write_alloc(
        &mut self,
        granted: Vec<crate::lrs::GrantedMedium>,
        sync_threshold: SyncThreshold,
    ) -> Result<(Vec<LrsRequest>, bool)> {
        let header = self.header_mut();
        header.sync.threshold = Some(sync_threshold.into());
        let module = header.layout_module.clone();
        let released = module.write_split(header, &granted)?;
        self.after_split(released)
    }

    fn on_read_alloc(&mut self, granted: Vec<crate::lrs::GrantedMedium>) -> Result<(Vec<LrsRequest>, bool)> {
        let header = self.header_mut();
        let module = header.layout_module.clone();
        let released = match header.role {
            Role::Eraser => module.delete_split(header, &granted)?,
            _ => module.read_split(header, &granted)?,
        };
        self.after_split(released)
    }

    fn after_split(&mut self, mut released: Vec<ReleaseMedium>) -> Result<(Vec<LrsRequest>, bool)> {
        let header = self.header_mut();
        header.state.current_split += 1;
        header.sync.size_written += released.iter().map(|r| r.size_written).sum::<u64>();
        header.sync.nb_extents_written += released.len() as u64;

        let remaining = header.remaining();
        let is_final = remaining == 0;
        let partial = !is_final && header.sync.should_sync();

        for r in &mut released {
            r.to_sync = partial;
        }
        if partial || is_final {
            if partial {
                debug!("{}: emitting partial (sync-only) release", header.oid);
            }
            header.sync = SyncAccounting::default();
        }

        let id = header.next_id();
        let kind = match header.role {
            Role::Decoder | Role::Eraser => ReleaseKind::Read,
            Role::Encoder | Role::Copier => ReleaseKind::Write,
        };
        let request = LrsRequest::Release {
            id,
            kind,
            media: released,
            partial,
        };
        header.state.requested_alloc = Some(id);
        Ok((vec![request], false))
    }

    fn on_release_ack(&mut self) -> Result<(Vec<LrsRequest>, bool)> {
        let remaining = self.header().remaining();
        if remaining == 0 {
            let header = self.header_mut();
            header.layout.extents.iter_mut().for_each(|e| e.state = ExtentState::Sync);
            // When the last target finishes, the next queued target (if
            // any) takes over this processor rather than handing back
            // control, per spec.md §4.1 step contract point 7.
            header.completed_layouts.push(header.layout.clone());
            match header.targets_remaining.pop_front() {
                None => {
                    header.state.done = true;
                    Ok((Vec::new(), true))
                }
                Some((target, layout)) => {
                    self.advance_to_target(target, layout)?;
                    self.start()
                }
            }
        } else {
            match self.role() {
                Role::Encoder | Role::Copier => self.request_write_alloc(),
                Role::Decoder => self.request_read_alloc(ReadOp::Read),
                Role::Eraser => self.request_read_alloc(ReadOp::Delete),
            }
        }
    }

    /// Rebind this processor onto `target`, the next entry popped from
    /// `targets_remaining`, reusing the role's `_init` hook to rebuild
    /// `oid`/`put_params`/`layout`/`layout_module`/`state` and re-resolving
    /// the target's own byte source/sink from the matching queued entry.
    fn advance_to_target(&mut self, target: Target, layout: Option<Layout>) -> Result<()> {
        let next_index = self.header().state.current_target + 1;
        let header = self.header_mut();

        let (layout, put_params) = match header.role {
            Role::Encoder | Role::Copier => {
                let put = match &target.params {
                    TargetParams::Put(p) => p.clone(),
                    _ => return Err(PhobosError::new(ErrorKind::Protocol("encoder needs a put target".into()))),
                };
                let module = module_for(&put.layout_name)
                    .ok_or_else(|| PhobosError::new(ErrorKind::Protocol(format!("unknown layout module {}", put.layout_name))))?;
                let fresh = Layout {
                    object_uuid: 0,
                    object_version: target.version.unwrap_or(1),
                    object_size: target.size,
                    descriptor: LayoutDescriptor {
                        name: module.name().to_string(),
                        version: 1,
                    },
                    params: put.layout_params.clone(),
                    extents: Vec::new(),
                };
                header.layout_module = module;
                (fresh, Some(put))
            }
            Role::Decoder | Role::Eraser => {
                let layout = layout.ok_or_else(|| {
                    PhobosError::new(ErrorKind::Protocol("decoder/eraser target missing resolved layout".into()))
                })?;
                let module = module_for(&layout.descriptor.name)
                    .ok_or_else(|| PhobosError::new(ErrorKind::Protocol("unknown layout module on layout".into())))?;
                header.layout_module = module;
                (layout, None)
            }
        };

        header.oid = target.objid.clone();
        header.put_params = put_params;
        header.grouping = match &target.params {
            TargetParams::Put(p) => p.grouping.clone(),
            _ => None,
        };
        header.layout = layout;
        header.state = ProcessorState::new(target.size);
        header.state.current_target = next_index;
        header.sync = SyncAccounting::default();

        match header.role {
            Role::Encoder | Role::Copier => {
                header.reader = header.pending_readers.pop_front();
                let module = header.layout_module.clone();
                module.encode_init(header)?;
            }
            Role::Decoder => {
                header.writer = header.pending_writers.pop_front();
                let module = header.layout_module.clone();
                module.decode_init(header)?;
            }
            Role::Eraser => {
                let module = header.layout_module.clone();
                module.erase_init(header)?;
            }
        }
        Ok(())
    }

    /// Release buffers, close any still-open descriptors. Idempotent.
    pub fn destroy(&mut self) {
        let header = self.header_mut();
        header.reader = None;
        header.writer = None;
        header.state.ring_buffer = RingBuffer::with_capacity(0);
        header.state.done = true;
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Newly allocated extents for one split, keyed in request order. Layout
/// modules build this before opening I/O adapters.
pub fn new_extent(
    layout_idx: usize,
    offset: u64,
    size: u64,
    medium: MediumRef,
    address: String,
    fs_type: String,
    address_type: String,
    grouping: Option<String>,
) -> Extent {
    Extent {
        uuid: rand_like_uuid(layout_idx, offset),
        layout_idx,
        offset,
        size,
        media_ref: medium,
        address,
        fs_type,
        address_type,
        md5: None,
        xxh128: None,
        state: ExtentState::Pending,
        grouping,
    }
}

/// Deterministic, collision-resistant-enough stand-in for a random UUID: a
/// real deployment mints extent uuids from the catalog sequence; this core
/// has no catalog counter so it derives one from split position and offset.
fn rand_like_uuid(layout_idx: usize, offset: u64) -> u128 {
    ((layout_idx as u128) << 64) | offset as u128
}

pub(crate) fn hasher_for(config: &Config) -> ExtentHasher {
    ExtentHasher::new(config.hash_md5, config.hash_xxh128)
}

pub(crate) fn user_md(attrs: &BTreeMap<String, String>) -> String {
    crate::lrs::ExtentAttrs::encode_user_md(attrs)
}
