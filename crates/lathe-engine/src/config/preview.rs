//! Persisted preview chain defaults
//!
//! What the app remembers between sessions about the preview chain:
//! the stage order and a couple of stage defaults. Live parameter
//! values are not persisted; they belong to whichever edit dialog is
//! open.

use serde::{Deserialize, Serialize};

use crate::effect::{DcBlockParams, StageKind, StageOrder, DEFAULT_DC_CUTOFF_HZ};

/// Preview chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Chain order. Duplicates are dropped; stages left out of the
    /// list never run, even when enabled.
    pub stage_order: Vec<StageKind>,

    /// Default fade length in seconds offered by the fade dialog.
    pub fade_seconds: f32,

    /// DC blocker corner frequency in Hz.
    pub dc_cutoff_hz: f32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            stage_order: StageKind::DEFAULT_ORDER.to_vec(),
            fade_seconds: 1.0,
            dc_cutoff_hz: DEFAULT_DC_CUTOFF_HZ,
        }
    }
}

impl PreviewConfig {
    /// The configured order as the engine consumes it.
    pub fn order(&self) -> StageOrder {
        StageOrder::from_kinds(&self.stage_order)
    }

    /// DC blocker parameters from the configured cutoff.
    pub fn dc_params(&self) -> DcBlockParams {
        DcBlockParams {
            cutoff_hz: self.dc_cutoff_hz,
        }
    }
}
