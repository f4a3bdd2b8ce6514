//! DC offset removal stage
//!
//! One-pole high pass per channel: y[n] = a * (y[n-1] + x[n] - x[n-1])
//! with a = RC / (RC + dt) and RC = 1 / (2 * pi * cutoff). At the 5 Hz
//! default the filter is inaudible on program material but removes the
//! constant offset some converters and plugins leave behind.

use std::sync::Arc;

use crate::params::ParamCell;
use crate::types::{AudioBuffer, MAX_CHANNELS};

pub const DEFAULT_DC_CUTOFF_HZ: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcBlockParams {
    pub cutoff_hz: f32,
}

impl Default for DcBlockParams {
    fn default() -> Self {
        Self {
            cutoff_hz: DEFAULT_DC_CUTOFF_HZ,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DcState {
    x1: f32,
    y1: f32,
}

pub struct DcBlockStage {
    cell: Arc<ParamCell<DcBlockParams>>,
    params: DcBlockParams,
    sample_rate: u32,
    alpha: f32,
    states: [DcState; MAX_CHANNELS],
}

impl DcBlockStage {
    pub fn new() -> Self {
        Self::with_params(DcBlockParams::default())
    }

    pub fn with_params(params: DcBlockParams) -> Self {
        let mut stage = Self {
            cell: Arc::new(ParamCell::new(params)),
            params,
            sample_rate: 48000,
            alpha: 0.0,
            states: [DcState::default(); MAX_CHANNELS],
        };
        stage.update_alpha();
        stage
    }

    pub fn cell(&self) -> Arc<ParamCell<DcBlockParams>> {
        Arc::clone(&self.cell)
    }

    pub fn prepare(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.update_alpha();
        self.reset();
    }

    pub fn apply_pending(&mut self) {
        if let Some(params) = self.cell.try_take() {
            self.params = params;
            self.update_alpha();
        }
    }

    fn update_alpha(&mut self) {
        let cutoff = self.params.cutoff_hz.clamp(0.1, 200.0);
        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff);
        let dt = 1.0 / self.sample_rate as f32;
        self.alpha = rc / (rc + dt);
    }

    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        let alpha = self.alpha;
        for c in 0..buffer.channels().min(MAX_CHANNELS) {
            let state = &mut self.states[c];
            for sample in buffer.channel_mut(c) {
                let x = *sample;
                let y = alpha * (state.y1 + x - state.x1);
                state.x1 = x;
                state.y1 = y;
                *sample = y;
            }
        }
    }

    /// Clear filter memory on all channels.
    pub fn reset(&mut self) {
        self.states = [DcState::default(); MAX_CHANNELS];
    }
}

impl Default for DcBlockStage {
    fn default() -> Self {
        Self::new()
    }
}
