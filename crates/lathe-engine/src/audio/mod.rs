//! Audio device backend
//!
//! Brings the engine up on a real output device via cpal and exposes
//! the lock-free control surface to the UI:
//!
//! - **UI thread**: sends commands via lock-free ringbuffer, publishes
//!   parameters through cells, reads state via relaxed atomics
//! - **Audio thread**: owns the AudioEngine exclusively inside the
//!   device callback

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;

pub use backend::{start_audio_system, AudioHandle, AudioSystemResult, CommandSender};
pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
pub use device::{
    find_device_by_id, get_available_output_devices, get_default_device, get_output_devices,
    AudioDevice,
};
pub use error::{AudioError, AudioResult};
