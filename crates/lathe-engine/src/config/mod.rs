//! Configuration infrastructure
//!
//! Generic YAML config loading and saving, standard file locations,
//! and the persisted preview chain defaults. Audio device settings
//! live in [`crate::audio::AudioConfig`] and load through the same
//! generic helpers.

mod io;
mod paths;
mod preview;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use preview::PreviewConfig;
