//! Core realtime engine for the Lathe audio editor
//!
//! Everything that has to meet the audio callback deadline lives here:
//! the playback transport, the preview effect chain, level metering and
//! the lock-free state exchange between the callback thread and the UI.

pub mod audio;
pub mod config;
pub mod effect;
pub mod engine;
pub mod monitor;
pub mod params;
pub mod render;
pub mod source;
pub mod types;

pub use types::*;
