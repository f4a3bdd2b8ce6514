//! Offline rendering of a selection through the effect chain
//!
//! The editor uses this on the control thread for two jobs: producing
//! the buffer behind `PreviewMode::OfflineBuffer`, and applying a
//! preview destructively once the user commits. The chain here is a
//! private [`StageRack`], so an offline render never disturbs the
//! realtime chain's filter state.

use basedrop::Owned;
use rayon::prelude::*;

use crate::effect::{
    DcBlockParams, EqParams, FadeParams, GainParams, MultiEqParams, PluginChain, StageKind,
    StageOrder, StageRack, GAIN_DB_RANGE, STAGE_SLOTS,
};
use crate::engine::gc_handle;
use crate::source::SourceBuffer;
use crate::types::{gain_to_db, AudioBuffer};

/// Frames per offline processing chunk. Chunking exists for the plugin
/// slot, which was prepared for a bounded block size; the built-in
/// stages are indifferent to it.
pub const RENDER_BLOCK_FRAMES: usize = 4096;

/// Parameters for one offline render: which stages run, in what order,
/// and with what settings. Every stage defaults to disabled, so an
/// empty plan renders a dry copy of the selection.
#[derive(Debug, Clone, Default)]
pub struct RenderPlan {
    pub order: StageOrder,
    pub enabled: [bool; STAGE_SLOTS],
    pub gain: GainParams,
    pub normalize: GainParams,
    pub fade: FadeParams,
    pub dc_block: DcBlockParams,
    pub parametric_eq: EqParams,
    pub multi_eq: MultiEqParams,
}

impl RenderPlan {
    pub fn enable(&mut self, kind: StageKind) {
        self.enabled[kind.index()] = true;
    }
}

/// Render `frames` frames starting at `start` through the plan's
/// stages and return the processed audio. The selection is clamped
/// into the source. A plugin chain passed here is consumed; it runs in
/// the plan's `Plugins` slot, freshly prepared for the render.
///
/// Stage state starts clean: fades begin at the selection start and
/// filters carry no history from any previous render or preview.
pub fn render_selection(
    source: &SourceBuffer,
    start: u64,
    frames: u64,
    plan: &RenderPlan,
    plugins: Option<PluginChain>,
) -> AudioBuffer {
    let start = start.min(source.frames());
    let frames = frames.min(source.frames() - start) as usize;
    let channels = source.channels();

    let mut out = AudioBuffer::silence(channels, frames);
    let begin = start as usize;
    for c in 0..channels {
        out.channel_mut(c)
            .copy_from_slice(&source.channel(c)[begin..begin + frames]);
    }

    let mut rack = configure_rack(plan, source.sample_rate());
    let mut enabled = plan.enabled;
    if let Some(chain) = plugins {
        rack.plugins.install(Owned::new(&gc_handle(), chain));
        rack.plugins.prepare(source.sample_rate(), RENDER_BLOCK_FRAMES);
        enabled[StageKind::Plugins.index()] = true;
    }

    let mut scratch = AudioBuffer::with_capacity(channels, RENDER_BLOCK_FRAMES);
    let mut offset = 0;
    while offset < frames {
        let n = RENDER_BLOCK_FRAMES.min(frames - offset);
        scratch.set_layout(channels, n);
        for c in 0..channels {
            scratch
                .channel_mut(c)
                .copy_from_slice(&out.channel(c)[offset..offset + n]);
        }
        for &kind in plan.order.as_slice() {
            if enabled[kind.index()] {
                rack.process_stage(kind, &mut scratch);
            }
        }
        for c in 0..channels {
            out.channel_mut(c)[offset..offset + n].copy_from_slice(scratch.channel(c));
        }
        offset += n;
    }
    out
}

fn configure_rack(plan: &RenderPlan, sample_rate: u32) -> StageRack {
    let mut rack = StageRack::new();
    let cells = rack.param_cells();
    cells.gain.store(plan.gain);
    cells.normalize.store(plan.normalize);
    cells.fade.store(plan.fade);
    cells.dc_block.store(plan.dc_block);
    cells.parametric_eq.store(plan.parametric_eq);
    cells.multi_eq.store(plan.multi_eq);
    rack.apply_pending();
    rack.prepare(sample_rate, RENDER_BLOCK_FRAMES);
    rack
}

/// Peak level of the whole buffer in dBFS, scanned channel-parallel.
/// Silence reports negative infinity.
pub fn peak_db(buffer: &AudioBuffer) -> f32 {
    let peak = (0..buffer.channels())
        .into_par_iter()
        .map(|c| buffer.peak_of(c))
        .reduce(|| 0.0, f32::max);
    gain_to_db(peak)
}

/// Gain in dB that brings the buffer's peak to `target_db`, clamped to
/// the range the gain stages accept. Silence gets no gain at all.
pub fn normalize_gain_db(buffer: &AudioBuffer, target_db: f32) -> f32 {
    let peak = peak_db(buffer);
    if peak == f32::NEG_INFINITY {
        return 0.0;
    }
    (target_db - peak).clamp(GAIN_DB_RANGE.0, GAIN_DB_RANGE.1)
}
