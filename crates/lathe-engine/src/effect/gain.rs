//! Flat gain stage
//!
//! Two chain slots use this stage: the plain gain preview and the
//! normalize preview. Normalize differs only in how the UI computes the
//! decibel value it publishes (from a peak scan against a target level,
//! see [`crate::render::normalize_gain_db`]).

use std::sync::Arc;

use crate::params::ParamCell;
use crate::types::{db_to_gain, AudioBuffer};

/// Widest gain swing a slot will apply. Values beyond this are clamped
/// at the point of use.
pub const GAIN_DB_RANGE: (f32, f32) = (-96.0, 96.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainParams {
    pub gain_db: f32,
}

impl Default for GainParams {
    fn default() -> Self {
        Self { gain_db: 0.0 }
    }
}

pub struct GainStage {
    cell: Arc<ParamCell<GainParams>>,
    params: GainParams,
}

impl GainStage {
    pub fn new() -> Self {
        Self::with_params(GainParams::default())
    }

    pub fn with_params(params: GainParams) -> Self {
        Self {
            cell: Arc::new(ParamCell::new(params)),
            params,
        }
    }

    /// Handle the control thread uses to publish new parameters.
    pub fn cell(&self) -> Arc<ParamCell<GainParams>> {
        Arc::clone(&self.cell)
    }

    /// Swap in pending parameters, if any.
    pub fn apply_pending(&mut self) {
        if let Some(params) = self.cell.try_take() {
            self.params = params;
        }
    }

    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        let db = self.params.gain_db.clamp(GAIN_DB_RANGE.0, GAIN_DB_RANGE.1);
        if db == 0.0 {
            return;
        }
        buffer.scale(db_to_gain(db));
    }

    pub fn reset(&mut self) {}
}

impl Default for GainStage {
    fn default() -> Self {
        Self::new()
    }
}
