//! The realtime engine: transport, commands and preview routing
//!
//! This module is the audio-thread half of the crate:
//! - Transport: sample accurate playhead with loop folding
//! - EngineCommand: SPSC command queue from the control thread
//! - PreviewRouter: effect chain routing for realtime preview
//! - PreviewArbiter: process-wide "one preview at a time" token
//! - AudioEngine: ties it all together inside the callback
//! - gc: deferred reclamation so nothing frees on the audio thread

mod arbiter;
mod command;
mod engine;
pub mod gc;
mod preview;
mod transport;

pub use arbiter::*;
pub use command::*;
pub use engine::*;
pub use gc::*;
pub use preview::*;
pub use transport::*;
