//! Fade preview stage
//!
//! Applies a fade envelope continuously while previewing: an internal
//! sample counter advances with every processed block and wraps at the
//! fade duration, so a looping preview re-runs the envelope each pass.
//! The gain curve is evaluated per sample, not per block, so short fades
//! stay smooth at large block sizes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::params::ParamCell;
use crate::types::AudioBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeDirection {
    #[default]
    In,
    Out,
}

/// Envelope shape, all normalized to gain 0 at progress 0 and gain 1 at
/// progress 1 (before the fade-out inversion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    #[default]
    Linear,
    Logarithmic,
    Exponential,
    SCurve,
}

impl FadeCurve {
    /// Gain for normalized progress `p` in `[0, 1)`.
    #[inline]
    pub fn gain(self, p: f32) -> f32 {
        const EXP_NORM: f32 = std::f32::consts::E * std::f32::consts::E - 1.0;
        match self {
            FadeCurve::Linear => p,
            FadeCurve::Logarithmic => (1.0 + 9.0 * p).log10(),
            FadeCurve::Exponential => ((2.0 * p).exp() - 1.0) / EXP_NORM,
            FadeCurve::SCurve => 0.5 * (1.0 + (6.0 * (p - 0.5)).tanh()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeParams {
    pub direction: FadeDirection,
    pub curve: FadeCurve,
    /// Envelope length in seconds; converted to samples against the
    /// prepared rate.
    pub duration_seconds: f32,
}

impl Default for FadeParams {
    fn default() -> Self {
        Self {
            direction: FadeDirection::In,
            curve: FadeCurve::Linear,
            duration_seconds: 1.0,
        }
    }
}

pub struct FadeStage {
    cell: Arc<ParamCell<FadeParams>>,
    params: FadeParams,
    sample_rate: u32,
    duration_samples: u64,
    counter: u64,
}

impl FadeStage {
    pub fn new() -> Self {
        Self::with_params(FadeParams::default())
    }

    pub fn with_params(params: FadeParams) -> Self {
        let mut stage = Self {
            cell: Arc::new(ParamCell::new(params)),
            params,
            sample_rate: 48000,
            duration_samples: 1,
            counter: 0,
        };
        stage.update_duration();
        stage
    }

    pub fn cell(&self) -> Arc<ParamCell<FadeParams>> {
        Arc::clone(&self.cell)
    }

    pub fn prepare(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.update_duration();
        self.counter = 0;
    }

    pub fn apply_pending(&mut self) {
        if let Some(params) = self.cell.try_take() {
            self.params = params;
            self.update_duration();
        }
    }

    fn update_duration(&mut self) {
        let seconds = self.params.duration_seconds.max(0.0);
        self.duration_samples = ((seconds * self.sample_rate as f32) as u64).max(1);
    }

    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        let duration = self.duration_samples;
        let frames = buffer.frames() as u64;
        let start = self.counter;

        for c in 0..buffer.channels() {
            let channel = buffer.channel_mut(c);
            for (i, sample) in channel.iter_mut().enumerate() {
                let p = ((start + i as u64) % duration) as f32 / duration as f32;
                let mut gain = self.params.curve.gain(p);
                if self.params.direction == FadeDirection::Out {
                    gain = 1.0 - gain;
                }
                *sample *= gain;
            }
        }

        self.counter = (start + frames) % duration;
    }

    /// Restart the envelope from the beginning.
    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

impl Default for FadeStage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVES: [FadeCurve; 4] = [
        FadeCurve::Linear,
        FadeCurve::Logarithmic,
        FadeCurve::Exponential,
        FadeCurve::SCurve,
    ];

    #[test]
    fn test_all_curves_start_near_zero_and_end_near_one() {
        for curve in CURVES {
            let start = curve.gain(0.0);
            let end = curve.gain(0.9999);
            assert!(start.abs() < 0.01, "{:?} starts at {}", curve, start);
            assert!((end - 1.0).abs() < 0.01, "{:?} ends at {}", curve, end);
        }
    }

    #[test]
    fn test_curve_midpoints() {
        assert!((FadeCurve::Linear.gain(0.5) - 0.5).abs() < 1e-6);
        assert!((FadeCurve::Logarithmic.gain(0.5) - 0.7404).abs() < 0.001);
        assert!((FadeCurve::Exponential.gain(0.5) - 0.2689).abs() < 0.001);
        assert!((FadeCurve::SCurve.gain(0.5) - 0.5).abs() < 1e-6);
    }

    fn ones(frames: usize) -> AudioBuffer {
        let mut buf = AudioBuffer::silence(1, frames);
        buf.channel_mut(0).fill(1.0);
        buf
    }

    #[test]
    fn test_fade_in_envelope_over_one_duration() {
        let mut stage = FadeStage::with_params(FadeParams {
            direction: FadeDirection::In,
            curve: FadeCurve::Linear,
            duration_seconds: 1.0,
        });
        stage.prepare(1000);

        let mut buf = ones(1000);
        stage.process(&mut buf);
        let out = buf.channel(0);
        assert!(out[0].abs() < 0.01);
        assert!((out[500] - 0.5).abs() < 0.01);
        assert!((out[999] - 0.999).abs() < 0.01);
    }

    #[test]
    fn test_fade_out_inverts_envelope() {
        let mut stage = FadeStage::with_params(FadeParams {
            direction: FadeDirection::Out,
            curve: FadeCurve::Linear,
            duration_seconds: 1.0,
        });
        stage.prepare(1000);

        let mut buf = ones(1000);
        stage.process(&mut buf);
        let out = buf.channel(0);
        assert!((out[0] - 1.0).abs() < 0.01);
        assert!(out[999].abs() < 0.01);
    }

    #[test]
    fn test_counter_wraps_across_blocks() {
        let mut stage = FadeStage::with_params(FadeParams {
            direction: FadeDirection::In,
            curve: FadeCurve::Linear,
            duration_seconds: 0.008,
        });
        stage.prepare(1000);
        // duration is 8 samples, blocks of 8 restart the envelope exactly
        let mut first = ones(8);
        stage.process(&mut first);
        let mut second = ones(8);
        stage.process(&mut second);
        assert_eq!(first.channel(0), second.channel(0));
    }

    #[test]
    fn test_reset_restarts_envelope() {
        let mut stage = FadeStage::with_params(FadeParams {
            duration_seconds: 1.0,
            ..FadeParams::default()
        });
        stage.prepare(1000);
        let mut buf = ones(500);
        stage.process(&mut buf);
        stage.reset();
        let mut after = ones(1);
        stage.process(&mut after);
        assert!(after.channel(0)[0].abs() < 0.01);
    }
}
