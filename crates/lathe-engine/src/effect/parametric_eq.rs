//! Three band parametric EQ stage
//!
//! Low shelf, mid peak and high shelf in series. Coefficients are cached
//! and rebuilt only when a parameter publish marks them dirty or the
//! engine is re-prepared at a new sample rate; the per-sample path is
//! three biquad evaluations per channel.

use std::sync::Arc;

use crate::effect::biquad::{clamp_band_freq, BiquadCoeffs, BiquadState};
use crate::params::ParamCell;
use crate::types::{AudioBuffer, MAX_CHANNELS};

const BAND_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBandParams {
    pub enabled: bool,
    pub freq: f32,
    pub gain_db: f32,
    pub q: f32,
}

impl EqBandParams {
    fn new(freq: f32) -> Self {
        Self {
            enabled: true,
            freq,
            gain_db: 0.0,
            q: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqParams {
    pub low_shelf: EqBandParams,
    pub mid_peak: EqBandParams,
    pub high_shelf: EqBandParams,
}

impl Default for EqParams {
    fn default() -> Self {
        Self {
            low_shelf: EqBandParams::new(100.0),
            mid_peak: EqBandParams::new(1000.0),
            high_shelf: EqBandParams::new(10000.0),
        }
    }
}

pub struct ParametricEqStage {
    cell: Arc<ParamCell<EqParams>>,
    params: EqParams,
    sample_rate: u32,
    coeffs: [BiquadCoeffs; BAND_COUNT],
    active: [bool; BAND_COUNT],
    states: [[BiquadState; MAX_CHANNELS]; BAND_COUNT],
}

impl ParametricEqStage {
    pub fn new() -> Self {
        Self::with_params(EqParams::default())
    }

    pub fn with_params(params: EqParams) -> Self {
        let mut stage = Self {
            cell: Arc::new(ParamCell::new(params)),
            params,
            sample_rate: 48000,
            coeffs: [BiquadCoeffs::passthrough(); BAND_COUNT],
            active: [false; BAND_COUNT],
            states: [[BiquadState::default(); MAX_CHANNELS]; BAND_COUNT],
        };
        stage.rebuild_coeffs();
        stage
    }

    pub fn cell(&self) -> Arc<ParamCell<EqParams>> {
        Arc::clone(&self.cell)
    }

    pub fn prepare(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.rebuild_coeffs();
        self.reset();
    }

    pub fn apply_pending(&mut self) {
        if let Some(params) = self.cell.try_take() {
            self.params = params;
            self.rebuild_coeffs();
        }
    }

    fn rebuild_coeffs(&mut self) {
        let sr = self.sample_rate;
        let bands = [
            self.params.low_shelf,
            self.params.mid_peak,
            self.params.high_shelf,
        ];
        for (i, band) in bands.iter().enumerate() {
            self.active[i] = band.enabled && band.gain_db != 0.0;
            if !self.active[i] {
                self.coeffs[i] = BiquadCoeffs::passthrough();
                continue;
            }
            let freq = clamp_band_freq(band.freq, sr);
            self.coeffs[i] = match i {
                0 => BiquadCoeffs::low_shelf(freq, band.gain_db, sr),
                1 => BiquadCoeffs::peaking(freq, band.gain_db, band.q.max(0.1), sr),
                _ => BiquadCoeffs::high_shelf(freq, band.gain_db, sr),
            };
        }
    }

    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        for c in 0..buffer.channels().min(MAX_CHANNELS) {
            let channel = buffer.channel_mut(c);
            for band in 0..BAND_COUNT {
                if !self.active[band] {
                    continue;
                }
                let coeffs = self.coeffs[band];
                let state = &mut self.states[band][c];
                for sample in channel.iter_mut() {
                    *sample = state.process(&coeffs, *sample);
                }
            }
        }
    }

    /// Clear filter memory on all bands and channels.
    pub fn reset(&mut self) {
        for band in &mut self.states {
            for state in band.iter_mut() {
                state.reset();
            }
        }
    }
}

impl Default for ParametricEqStage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> AudioBuffer {
        let mut buf = AudioBuffer::silence(1, frames);
        for (i, s) in buf.channel_mut(0).iter_mut().enumerate() {
            let t = i as f32 / sample_rate as f32;
            *s = (2.0 * std::f32::consts::PI * freq * t).sin();
        }
        buf
    }

    fn settled_peak(buf: &AudioBuffer) -> f32 {
        let ch = buf.channel(0);
        ch[ch.len() / 2..]
            .iter()
            .fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn test_flat_settings_pass_audio_unchanged() {
        let mut stage = ParametricEqStage::new();
        stage.prepare(48000);
        let mut buf = sine(1000.0, 48000, 4800);
        let original = buf.channel(0).to_vec();
        stage.process(&mut buf);
        assert_eq!(buf.channel(0), &original[..]);
    }

    #[test]
    fn test_low_shelf_boost_raises_low_end() {
        let mut params = EqParams::default();
        params.low_shelf.gain_db = 6.0;
        let mut stage = ParametricEqStage::with_params(params);
        stage.prepare(48000);

        let mut low = sine(50.0, 48000, 48000);
        stage.process(&mut low);
        assert!(settled_peak(&low) > 1.7, "low end peak {}", settled_peak(&low));

        stage.reset();
        let mut high = sine(8000.0, 48000, 9600);
        stage.process(&mut high);
        assert!(settled_peak(&high) < 1.1, "high leaked {}", settled_peak(&high));
    }

    #[test]
    fn test_disabled_band_is_skipped() {
        let mut params = EqParams::default();
        params.mid_peak.gain_db = 12.0;
        params.mid_peak.enabled = false;
        let mut stage = ParametricEqStage::with_params(params);
        stage.prepare(48000);

        let mut buf = sine(1000.0, 48000, 4800);
        let original = buf.channel(0).to_vec();
        stage.process(&mut buf);
        assert_eq!(buf.channel(0), &original[..]);
    }

    #[test]
    fn test_band_freq_outside_range_is_clamped() {
        let mut params = EqParams::default();
        params.high_shelf.freq = 90000.0;
        params.high_shelf.gain_db = 6.0;
        let mut stage = ParametricEqStage::with_params(params);
        stage.prepare(48000);

        let mut buf = sine(1000.0, 48000, 4800);
        stage.process(&mut buf);
        assert!(buf.channel(0).iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_param_publish_rebuilds_coefficients() {
        let mut stage = ParametricEqStage::new();
        stage.prepare(48000);
        let cell = stage.cell();

        let mut params = EqParams::default();
        params.mid_peak.gain_db = 6.0;
        cell.store(params);
        stage.apply_pending();

        let mut buf = sine(1000.0, 48000, 48000);
        stage.process(&mut buf);
        assert!(settled_peak(&buf) > 1.7);
    }
}
