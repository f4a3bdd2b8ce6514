//! Lock-free monitoring taps read by the UI

mod levels;
mod scope;

pub use levels::ChannelLevels;
pub use scope::{ScopeRing, SCOPE_RING_FRAMES};
