//! Per-channel level metering
//!
//! The callback computes peak and RMS per channel after the effect
//! chain but before solo/mute gating, so meters keep moving on muted
//! channels. Values are published as f32 bit patterns in `AtomicU32`
//! slots, overwritten every block; the UI samples whenever it repaints
//! and misses blocks without consequence.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::types::{AudioBuffer, MAX_CHANNELS};

#[derive(Debug, Default)]
pub struct ChannelLevels {
    peak: [AtomicU32; MAX_CHANNELS],
    rms: [AtomicU32; MAX_CHANNELS],
    channels: AtomicUsize,
}

impl ChannelLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure one processed block. Audio thread only.
    pub fn write_block(&self, buffer: &AudioBuffer) {
        let channels = buffer.channels().min(MAX_CHANNELS);
        self.channels.store(channels, Ordering::Relaxed);
        for c in 0..channels {
            self.peak[c].store(buffer.peak_of(c).to_bits(), Ordering::Relaxed);
            self.rms[c].store(buffer.rms_of(c).to_bits(), Ordering::Relaxed);
        }
        for c in channels..MAX_CHANNELS {
            self.peak[c].store(0, Ordering::Relaxed);
            self.rms[c].store(0, Ordering::Relaxed);
        }
    }

    /// Channels measured in the most recent block.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels.load(Ordering::Relaxed)
    }

    /// Peak of the most recent block, linear.
    #[inline]
    pub fn peak(&self, channel: usize) -> f32 {
        if channel >= MAX_CHANNELS {
            return 0.0;
        }
        f32::from_bits(self.peak[channel].load(Ordering::Relaxed))
    }

    /// RMS of the most recent block, linear.
    #[inline]
    pub fn rms(&self, channel: usize) -> f32 {
        if channel >= MAX_CHANNELS {
            return 0.0;
        }
        f32::from_bits(self.rms[channel].load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_of_known_block() {
        let levels = ChannelLevels::new();
        let mut buf = AudioBuffer::silence(2, 4);
        buf.channel_mut(0).copy_from_slice(&[0.5, -0.5, 0.5, -0.5]);
        buf.channel_mut(1).copy_from_slice(&[1.0, 0.0, 0.0, 0.0]);
        levels.write_block(&buf);

        assert_eq!(levels.channels(), 2);
        assert!((levels.peak(0) - 0.5).abs() < 1e-6);
        assert!((levels.rms(0) - 0.5).abs() < 1e-6);
        assert!((levels.peak(1) - 1.0).abs() < 1e-6);
        assert!((levels.rms(1) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_new_block_overwrites_old_levels() {
        let levels = ChannelLevels::new();
        let mut loud = AudioBuffer::silence(1, 2);
        loud.channel_mut(0).fill(0.9);
        levels.write_block(&loud);

        let quiet = AudioBuffer::silence(1, 2);
        levels.write_block(&quiet);
        assert_eq!(levels.peak(0), 0.0);
        assert_eq!(levels.channels(), 1);
    }

    #[test]
    fn test_stale_channels_are_cleared() {
        let levels = ChannelLevels::new();
        let mut wide = AudioBuffer::silence(4, 2);
        wide.channel_mut(3).fill(0.7);
        levels.write_block(&wide);
        assert!((levels.peak(3) - 0.7).abs() < 1e-6);

        let narrow = AudioBuffer::silence(2, 2);
        levels.write_block(&narrow);
        assert_eq!(levels.peak(3), 0.0);
        assert_eq!(levels.channels(), 2);
    }

    #[test]
    fn test_out_of_range_channel_reads_zero() {
        let levels = ChannelLevels::new();
        assert_eq!(levels.peak(MAX_CHANNELS + 1), 0.0);
        assert_eq!(levels.rms(MAX_CHANNELS), 0.0);
    }
}
