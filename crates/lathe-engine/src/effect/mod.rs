//! Effect preview chain
//!
//! A fixed set of built-in stages plus one plugin slot. The set is
//! closed on purpose: each stage has a typed parameter struct published
//! through a [`ParamCell`](crate::params::ParamCell), and the chain
//! order is plain data so the UI can reorder stages without the engine
//! growing a generic routing graph.

mod biquad;
mod dc_block;
mod fade;
mod gain;
mod multi_eq;
mod parametric_eq;
mod plugin;

pub use biquad::{clamp_band_freq, BiquadCoeffs, BiquadState, MIN_BAND_FREQ};
pub use dc_block::{DcBlockParams, DcBlockStage, DEFAULT_DC_CUTOFF_HZ};
pub use fade::{FadeCurve, FadeDirection, FadeParams, FadeStage};
pub use gain::{GainParams, GainStage, GAIN_DB_RANGE};
pub use multi_eq::{BandParams, BandShape, MultiEqParams, MultiEqStage, MAX_EQ_BANDS};
pub use parametric_eq::{EqBandParams, EqParams, ParametricEqStage};
pub use plugin::{PluginChain, PluginProcessor, PluginStage};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::params::ParamCell;
use crate::types::AudioBuffer;

/// Number of chain slots.
pub const STAGE_SLOTS: usize = 7;

/// Identifies one slot of the preview chain.
///
/// `Gain` and `Normalize` are both flat gain stages; they exist as
/// separate slots so a normalize preview can sit at a different chain
/// position than a manual gain ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Gain = 0,
    Normalize = 1,
    Fade = 2,
    DcBlock = 3,
    ParametricEq = 4,
    MultiEq = 5,
    Plugins = 6,
}

impl StageKind {
    /// Default processing order.
    pub const DEFAULT_ORDER: [StageKind; STAGE_SLOTS] = [
        StageKind::Gain,
        StageKind::Normalize,
        StageKind::Fade,
        StageKind::DcBlock,
        StageKind::ParametricEq,
        StageKind::MultiEq,
        StageKind::Plugins,
    ];

    /// Slot index for enable-flag arrays.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Chain order as data.
///
/// Holds each stage at most once; stages absent from the order do not
/// run at all, enabled or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOrder {
    slots: [StageKind; STAGE_SLOTS],
    len: usize,
}

impl Default for StageOrder {
    fn default() -> Self {
        Self {
            slots: StageKind::DEFAULT_ORDER,
            len: STAGE_SLOTS,
        }
    }
}

impl StageOrder {
    /// Build an order from a kind list, keeping the first occurrence of
    /// each stage and dropping duplicates.
    pub fn from_kinds(kinds: &[StageKind]) -> Self {
        let mut slots = StageKind::DEFAULT_ORDER;
        let mut seen = [false; STAGE_SLOTS];
        let mut len = 0;
        for &kind in kinds {
            if seen[kind.index()] {
                continue;
            }
            seen[kind.index()] = true;
            slots[len] = kind;
            len += 1;
        }
        Self { slots, len }
    }

    #[inline]
    pub fn as_slice(&self) -> &[StageKind] {
        &self.slots[..self.len]
    }

    pub fn contains(&self, kind: StageKind) -> bool {
        self.as_slice().contains(&kind)
    }
}

/// Control-thread handles for publishing stage parameters.
#[derive(Clone)]
pub struct ChainParams {
    pub gain: Arc<ParamCell<GainParams>>,
    pub normalize: Arc<ParamCell<GainParams>>,
    pub fade: Arc<ParamCell<FadeParams>>,
    pub dc_block: Arc<ParamCell<DcBlockParams>>,
    pub parametric_eq: Arc<ParamCell<EqParams>>,
    pub multi_eq: Arc<ParamCell<MultiEqParams>>,
}

/// The full set of chain stages, one instance per slot.
///
/// Owned by the engine on the callback thread; offline rendering builds
/// a private rack of its own (see [`crate::render`]).
pub struct StageRack {
    pub gain: GainStage,
    pub normalize: GainStage,
    pub fade: FadeStage,
    pub dc_block: DcBlockStage,
    pub parametric_eq: ParametricEqStage,
    pub multi_eq: MultiEqStage,
    pub plugins: PluginStage,
}

impl StageRack {
    pub fn new() -> Self {
        Self {
            gain: GainStage::new(),
            normalize: GainStage::new(),
            fade: FadeStage::new(),
            dc_block: DcBlockStage::new(),
            parametric_eq: ParametricEqStage::new(),
            multi_eq: MultiEqStage::new(),
            plugins: PluginStage::new(),
        }
    }

    /// Re-derive every rate dependent quantity. Safe to call repeatedly,
    /// on device changes in particular.
    pub fn prepare(&mut self, sample_rate: u32, max_block: usize) {
        self.fade.prepare(sample_rate);
        self.dc_block.prepare(sample_rate);
        self.parametric_eq.prepare(sample_rate);
        self.multi_eq.prepare(sample_rate);
        self.plugins.prepare(sample_rate, max_block);
    }

    /// Swap in pending parameter publishes on every stage.
    pub fn apply_pending(&mut self) {
        self.gain.apply_pending();
        self.normalize.apply_pending();
        self.fade.apply_pending();
        self.dc_block.apply_pending();
        self.parametric_eq.apply_pending();
        self.multi_eq.apply_pending();
    }

    /// Reset all runtime state: filter memory, fade counters, plugin
    /// tails. Parameters are left alone.
    pub fn reset_all(&mut self) {
        self.gain.reset();
        self.normalize.reset();
        self.fade.reset();
        self.dc_block.reset();
        self.parametric_eq.reset();
        self.multi_eq.reset();
        self.plugins.reset();
    }

    /// Run one slot over the buffer.
    pub fn process_stage(&mut self, kind: StageKind, buffer: &mut AudioBuffer) {
        match kind {
            StageKind::Gain => self.gain.process(buffer),
            StageKind::Normalize => self.normalize.process(buffer),
            StageKind::Fade => self.fade.process(buffer),
            StageKind::DcBlock => self.dc_block.process(buffer),
            StageKind::ParametricEq => self.parametric_eq.process(buffer),
            StageKind::MultiEq => self.multi_eq.process(buffer),
            StageKind::Plugins => self.plugins.process(buffer),
        }
    }

    /// Parameter handles for the control thread.
    pub fn param_cells(&self) -> ChainParams {
        ChainParams {
            gain: self.gain.cell(),
            normalize: self.normalize.cell(),
            fade: self.fade.cell(),
            dc_block: self.dc_block.cell(),
            parametric_eq: self.parametric_eq.cell(),
            multi_eq: self.multi_eq.cell(),
        }
    }
}

impl Default for StageRack {
    fn default() -> Self {
        Self::new()
    }
}
