//! Facade over the platform audio backend
//!
//! One lock-free architecture regardless of backend:
//! - UI sends commands via ringbuffer
//! - Audio thread owns the AudioEngine exclusively
//! - Atomics and parameter cells for everything else

use super::config::AudioConfig;
use super::cpal_backend;
use super::error::AudioResult;
use crate::engine::{EngineCommand, EngineHandles};

/// Result of starting the audio system
///
/// Contains all the handles and communication channels the UI keeps.
pub struct AudioSystemResult {
    /// Handle that keeps audio alive (drop to stop)
    pub handle: AudioHandle,
    /// Command sender for the UI thread (lock-free)
    pub commands: CommandSender,
    /// Engine state mirrors and parameter cells
    pub engine: EngineHandles,
    /// Sample rate of the audio system
    pub sample_rate: u32,
    /// Actual buffer size in frames
    pub buffer_size: u32,
    /// Audio latency in milliseconds (one-way, output only)
    pub latency_ms: f32,
}

/// Handle to the active audio system. Drop it to stop audio.
pub enum AudioHandle {
    Cpal(cpal_backend::CpalAudioHandle),
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        match self {
            AudioHandle::Cpal(h) => h.sample_rate(),
        }
    }

    pub fn buffer_size(&self) -> u32 {
        match self {
            AudioHandle::Cpal(h) => h.buffer_size(),
        }
    }

    pub fn latency_ms(&self) -> f32 {
        match self {
            AudioHandle::Cpal(h) => h.latency_ms(),
        }
    }
}

/// Command sender for the UI thread
///
/// Wraps the lock-free producer feeding the engine's command queue.
/// All operations are non-blocking.
pub struct CommandSender {
    pub(crate) producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Queue a command for the audio engine (non-blocking).
    ///
    /// Returns `Err(command)` if the queue is full, handing the
    /// command back so the caller can retry next frame.
    pub fn send(&mut self, command: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(command).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Check if the queue has space for more commands
    pub fn has_space(&self) -> bool {
        self.producer.slots() > 0
    }
}

/// Start the audio system with the given configuration.
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    cpal_backend::start_audio_system(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_hands_the_command_back() {
        let (producer, mut consumer) = rtrb::RingBuffer::<EngineCommand>::new(2);
        let mut sender = CommandSender { producer };

        assert!(sender.send(EngineCommand::Play).is_ok());
        assert!(sender.send(EngineCommand::Pause).is_ok());
        assert!(!sender.has_space());

        let rejected = sender.send(EngineCommand::Stop);
        assert!(matches!(rejected, Err(EngineCommand::Stop)));

        assert!(consumer.pop().is_ok());
        assert!(sender.has_space());
        assert!(sender.send(EngineCommand::Stop).is_ok());
    }
}
