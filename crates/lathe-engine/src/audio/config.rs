//! Audio backend configuration
//!
//! Configuration for the playback device: which output to use, how
//! large the hardware buffer should be and at what rate to run.

use serde::{Deserialize, Serialize};

/// Maximum callback size we pre-allocate for (frames). Covers every
/// buffer size a device realistically hands us: 64 through 4096.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames).
/// 512 frames is a safe default that works on most systems,
/// about 11.6 ms at 44.1 kHz.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate for the audio system (48 kHz). Material at
/// other rates is resampled at load time, so playback itself never
/// rate-converts.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose the default buffer size
    #[default]
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system)
    Fixed(u32),
    /// Favor responsiveness over headroom with a small known-good buffer
    LowLatency,
}

impl BufferSize {
    /// Buffer size in frames, or None for system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
            BufferSize::LowLatency => Some(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate as f32) * 1000.0)
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, WASAPI,
/// CoreAudio, ...) so a saved selection survives on systems where
/// several hosts expose devices under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier; None means the default host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output device (None = use system default)
    pub output_device: Option<DeviceId>,

    /// Preferred buffer size
    #[serde(default)]
    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = [`DEFAULT_SAMPLE_RATE`])
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    /// Config optimized for responsiveness while scrubbing and
    /// previewing.
    pub fn low_latency() -> Self {
        Self {
            buffer_size: BufferSize::LowLatency,
            ..Default::default()
        }
    }

    /// Set the output device
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_frames_and_latency() {
        assert_eq!(BufferSize::Default.as_frames(), None);
        assert_eq!(BufferSize::Fixed(256).as_frames(), Some(256));
        assert_eq!(
            BufferSize::LowLatency.as_frames(),
            Some(DEFAULT_BUFFER_SIZE)
        );

        let latency = BufferSize::Fixed(441).latency_ms(44100).unwrap();
        assert!((latency - 10.0).abs() < 1e-3);
        assert_eq!(BufferSize::Default.latency_ms(44100), None);
    }

    #[test]
    fn test_device_id_display_label() {
        assert_eq!(DeviceId::new("hw:0,0").display_label(), "hw:0,0");
        assert_eq!(
            DeviceId::with_host("hw:0,0", "ALSA").display_label(),
            "[ALSA] hw:0,0"
        );
    }

    #[test]
    fn test_config_roundtrips_through_yaml() {
        let config = AudioConfig::default()
            .with_device(DeviceId::with_host("Scarlett 2i2", "ALSA"))
            .with_buffer_frames(256)
            .with_sample_rate(44100);

        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: AudioConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.output_device, config.output_device);
        assert_eq!(back.buffer_size, BufferSize::Fixed(256));
        assert_eq!(back.sample_rate, Some(44100));
    }

    #[test]
    fn test_config_defaults_survive_missing_fields() {
        let config: AudioConfig = serde_yaml::from_str("output_device:\n").unwrap();
        assert_eq!(config.output_device, None);
        assert_eq!(config.buffer_size, BufferSize::Default);
        assert_eq!(config.sample_rate, None);
    }
}
