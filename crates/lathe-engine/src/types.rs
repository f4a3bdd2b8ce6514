//! Core audio types shared across the engine
//!
//! The engine works on planar (channel-major) f32 buffers. Planar layout
//! keeps per-channel DSP loops contiguous and lets offline helpers hand
//! whole channels to rayon without restriding.

/// A single audio sample.
pub type Sample = f32;

/// Upper bound on channels the engine processes per document.
///
/// Metering slots, filter states and solo/mute flags are all sized to
/// this at construction so the callback never allocates.
pub const MAX_CHANNELS: usize = 8;

/// Convert decibels to a linear gain factor.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear gain factor to decibels.
///
/// Gains at or below zero return -inf dB rather than NaN.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain > 0.0 {
        20.0 * gain.log10()
    } else {
        f32::NEG_INFINITY
    }
}

/// Transport playback state.
///
/// Stored in an `AtomicU8` for the UI thread, so the discriminants are
/// fixed and round-trip through `as_u8`/`from_u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlayState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl PlayState {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayState::Playing,
            2 => PlayState::Paused,
            _ => PlayState::Stopped,
        }
    }
}

/// How the preview chain is routed into playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PreviewMode {
    /// Play the source unmodified, chain not consulted.
    #[default]
    Disabled = 0,
    /// Run the effect chain over pulled blocks inside the callback.
    RealtimeDsp = 1,
    /// Ignore the main source and play a pre-rendered buffer instead.
    OfflineBuffer = 2,
}

impl PreviewMode {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PreviewMode::RealtimeDsp,
            2 => PreviewMode::OfflineBuffer,
            _ => PreviewMode::Disabled,
        }
    }
}

/// Planar multichannel sample buffer.
///
/// Channels are stored back to back in one allocation; `channel(c)`
/// yields the contiguous slice for channel `c`. The callback-side buffer
/// is created once with `with_capacity` and relaid out per block with
/// `set_layout`, which never reallocates within that capacity.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    data: Vec<Sample>,
    channels: usize,
    frames: usize,
}

impl AudioBuffer {
    /// Create an empty buffer able to hold `channels * frames` samples
    /// without reallocating.
    pub fn with_capacity(channels: usize, frames: usize) -> Self {
        Self {
            data: Vec::with_capacity(channels * frames),
            channels: 0,
            frames: 0,
        }
    }

    /// Create a zeroed buffer with the given layout.
    pub fn silence(channels: usize, frames: usize) -> Self {
        Self {
            data: vec![0.0; channels * frames],
            channels,
            frames,
        }
    }

    /// Build a buffer from per-channel sample vectors.
    ///
    /// All channels must have equal length; shorter channels are padded
    /// with silence to the longest so decoder hiccups cannot skew the
    /// layout.
    pub fn from_planar(channels: &[Vec<Sample>]) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        let mut data = Vec::with_capacity(channels.len() * frames);
        for ch in channels {
            data.extend_from_slice(ch);
            data.resize(data.len() + (frames - ch.len()), 0.0);
        }
        Self {
            data,
            channels: channels.len(),
            frames,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels == 0 || self.frames == 0
    }

    /// Relayout in place without allocating, valid up to the capacity the
    /// buffer was created with. Newly exposed samples are zeroed.
    pub fn set_layout(&mut self, channels: usize, frames: usize) {
        let needed = channels * frames;
        debug_assert!(
            needed <= self.data.capacity(),
            "layout {}x{} exceeds buffer capacity {}",
            channels,
            frames,
            self.data.capacity()
        );
        self.data.clear();
        self.data.resize(needed, 0.0);
        self.channels = channels;
        self.frames = frames;
    }

    /// Zero every sample, keeping the layout.
    #[inline]
    pub fn fill_silence(&mut self) {
        self.data.fill(0.0);
    }

    #[inline]
    pub fn channel(&self, channel: usize) -> &[Sample] {
        debug_assert!(channel < self.channels);
        &self.data[channel * self.frames..(channel + 1) * self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [Sample] {
        debug_assert!(channel < self.channels);
        &mut self.data[channel * self.frames..(channel + 1) * self.frames]
    }

    /// All samples of all channels as one slice, channel-major.
    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.data
    }

    /// Multiply every sample by `factor`.
    pub fn scale(&mut self, factor: f32) {
        for sample in &mut self.data {
            *sample *= factor;
        }
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.data.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    /// Largest absolute sample value in one channel.
    pub fn peak_of(&self, channel: usize) -> f32 {
        self.channel(channel)
            .iter()
            .fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    /// Root mean square of one channel.
    pub fn rms_of(&self, channel: usize) -> f32 {
        let ch = self.channel(channel);
        if ch.is_empty() {
            return 0.0;
        }
        let sum: f32 = ch.iter().map(|s| s * s).sum();
        (sum / ch.len() as f32).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_gain_known_points() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(6.0) - 1.9953).abs() < 0.001);
        assert!((db_to_gain(-6.0) - 0.5012).abs() < 0.001);
        assert!((gain_to_db(2.0) - 6.0206).abs() < 0.001);
        assert_eq!(gain_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_play_state_round_trip() {
        for state in [PlayState::Stopped, PlayState::Playing, PlayState::Paused] {
            assert_eq!(PlayState::from_u8(state.as_u8()), state);
        }
        assert_eq!(PlayState::from_u8(200), PlayState::Stopped);
    }

    #[test]
    fn test_preview_mode_round_trip() {
        for mode in [
            PreviewMode::Disabled,
            PreviewMode::RealtimeDsp,
            PreviewMode::OfflineBuffer,
        ] {
            assert_eq!(PreviewMode::from_u8(mode.as_u8()), mode);
        }
    }

    #[test]
    fn test_buffer_layout_and_channel_access() {
        let mut buf = AudioBuffer::silence(2, 4);
        buf.channel_mut(0).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        buf.channel_mut(1).copy_from_slice(&[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(buf.channel(0), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buf.channel(1), &[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(buf.peak(), 8.0);
        assert_eq!(buf.peak_of(0), 4.0);
    }

    #[test]
    fn test_set_layout_within_capacity_zeroes() {
        let mut buf = AudioBuffer::with_capacity(2, 8);
        buf.set_layout(2, 4);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.frames(), 4);
        assert!(buf.as_slice().iter().all(|s| *s == 0.0));

        buf.channel_mut(0)[0] = 1.0;
        buf.set_layout(2, 8);
        assert!(buf.as_slice().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_from_planar_pads_short_channels() {
        let buf = AudioBuffer::from_planar(&[vec![1.0, 2.0, 3.0], vec![4.0]]);
        assert_eq!(buf.frames(), 3);
        assert_eq!(buf.channel(1), &[4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_scale_and_rms() {
        let mut buf = AudioBuffer::silence(1, 4);
        buf.channel_mut(0).copy_from_slice(&[0.5, -0.5, 0.5, -0.5]);
        buf.scale(2.0);
        assert_eq!(buf.channel(0), &[1.0, -1.0, 1.0, -1.0]);
        assert!((buf.rms_of(0) - 1.0).abs() < 1e-6);
    }
}
