//! N-band EQ stage
//!
//! Independent of the fixed three band EQ: up to [`MAX_EQ_BANDS`] typed
//! bands (bell, shelves, cuts, notch, band pass) applied in series.
//! The whole band table travels as one parameter struct so a multi-band
//! edit lands atomically.

use std::sync::Arc;

use crate::effect::biquad::{clamp_band_freq, BiquadCoeffs, BiquadState};
use crate::params::ParamCell;
use crate::types::{AudioBuffer, MAX_CHANNELS};

/// Hard cap on bands; the parameter struct is sized to this.
pub const MAX_EQ_BANDS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BandShape {
    #[default]
    Bell,
    LowShelf,
    HighShelf,
    LowCut,
    HighCut,
    Notch,
    BandPass,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandParams {
    pub enabled: bool,
    pub shape: BandShape,
    pub freq: f32,
    pub gain_db: f32,
    pub q: f32,
}

impl Default for BandParams {
    fn default() -> Self {
        Self {
            enabled: false,
            shape: BandShape::Bell,
            freq: 1000.0,
            gain_db: 0.0,
            q: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiEqParams {
    pub bands: [BandParams; MAX_EQ_BANDS],
    /// Bands `0..band_count` are considered; the rest are ignored.
    pub band_count: usize,
}

impl Default for MultiEqParams {
    fn default() -> Self {
        Self {
            bands: [BandParams::default(); MAX_EQ_BANDS],
            band_count: 0,
        }
    }
}

impl MultiEqParams {
    /// Build a parameter set from a band slice, truncating past the cap.
    pub fn from_bands(bands: &[BandParams]) -> Self {
        let mut params = Self::default();
        let count = bands.len().min(MAX_EQ_BANDS);
        params.bands[..count].copy_from_slice(&bands[..count]);
        params.band_count = count;
        params
    }
}

pub struct MultiEqStage {
    cell: Arc<ParamCell<MultiEqParams>>,
    params: MultiEqParams,
    sample_rate: u32,
    coeffs: [BiquadCoeffs; MAX_EQ_BANDS],
    active: [bool; MAX_EQ_BANDS],
    states: [[BiquadState; MAX_CHANNELS]; MAX_EQ_BANDS],
}

impl MultiEqStage {
    pub fn new() -> Self {
        Self::with_params(MultiEqParams::default())
    }

    pub fn with_params(params: MultiEqParams) -> Self {
        let mut stage = Self {
            cell: Arc::new(ParamCell::new(params)),
            params,
            sample_rate: 48000,
            coeffs: [BiquadCoeffs::passthrough(); MAX_EQ_BANDS],
            active: [false; MAX_EQ_BANDS],
            states: [[BiquadState::default(); MAX_CHANNELS]; MAX_EQ_BANDS],
        };
        stage.rebuild_coeffs();
        stage
    }

    pub fn cell(&self) -> Arc<ParamCell<MultiEqParams>> {
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
        let count = self.params.band_count.min(MAX_EQ_BANDS);
        for i in 0..MAX_EQ_BANDS {
            let band = self.params.bands[i];
            let in_use = i < count && band.enabled;
            // gain-shaped bands at 0 dB are no-ops, filter-shaped bands are not
            let shaping = !matches!(
                band.shape,
                BandShape::Bell | BandShape::LowShelf | BandShape::HighShelf
            );
            self.active[i] = in_use && (shaping || band.gain_db != 0.0);
            if !self.active[i] {
                self.coeffs[i] = BiquadCoeffs::passthrough();
                continue;
            }
            let freq = clamp_band_freq(band.freq, sr);
            let q = band.q.max(0.1);
            self.coeffs[i] = match band.shape {
                BandShape::Bell => BiquadCoeffs::peaking(freq, band.gain_db, q, sr),
                BandShape::LowShelf => BiquadCoeffs::low_shelf(freq, band.gain_db, sr),
                BandShape::HighShelf => BiquadCoeffs::high_shelf(freq, band.gain_db, sr),
                BandShape::LowCut => BiquadCoeffs::high_pass(freq, q, sr),
                BandShape::HighCut => BiquadCoeffs::low_pass(freq, q, sr),
                BandShape::Notch => BiquadCoeffs::notch(freq, q, sr),
                BandShape::BandPass => BiquadCoeffs::band_pass(freq, q, sr),
            };
        }
    }

    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        let count = self.params.band_count.min(MAX_EQ_BANDS);
        for c in 0..buffer.channels().min(MAX_CHANNELS) {
            let channel = buffer.channel_mut(c);
            for band in 0..count {
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

impl Default for MultiEqStage {
    fn default() -> Self {
        Self::new()
    }
}
