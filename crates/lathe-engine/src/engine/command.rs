//! Control-to-engine command queue
//!
//! Commands flow from the UI thread to the audio callback through a
//! wait-free SPSC ring buffer. The callback drains the queue at the top
//! of every block, so a command is applied at a block boundary, never
//! mid-buffer. Commands stay small: anything bulky rides behind a
//! pointer (`Box`, `Shared`, `Owned`) allocated on the control side.

use basedrop::{Owned, Shared};

use crate::effect::{PluginChain, StageOrder};
use crate::source::{ActiveSource, SourceBuffer};
use crate::types::PreviewMode;

/// Capacity of the command ring. Large enough that a burst of UI
/// gestures between two callbacks cannot fill it.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

pub enum EngineCommand {
    // ─── Transport ───────────────────────────────────────────────
    Play,
    Pause,
    Stop,
    Seek { position: u64 },
    SetLooping(bool),
    SetLoopPoints { start: u64, end: u64 },
    ClearLoopPoints,

    // ─── Sources ─────────────────────────────────────────────────
    /// Replace the playback source and rewind. Boxed so the variant
    /// stays pointer sized.
    LoadSource(Box<ActiveSource>),
    /// Swap the sample data under the playhead, preserving transport
    /// state. Sent after every destructive edit.
    ReloadBuffer(Shared<SourceBuffer>),
    UnloadSource,

    // ─── Preview routing ─────────────────────────────────────────
    SetPreviewMode(PreviewMode),
    /// Install a rendered buffer for `PreviewMode::OfflineBuffer`,
    /// with the selection start for UI position mapping.
    SetOfflineBuffer {
        buffer: Shared<SourceBuffer>,
        selection_start: u64,
    },
    ClearOfflineBuffer,
    SetStageOrder(StageOrder),
    ResetPreview,

    // ─── Plugin chain ────────────────────────────────────────────
    /// Install an already prepared chain; the previous one is retired
    /// through the collector.
    SetPluginChain(Owned<PluginChain>),
    ClearPluginChain,
}

/// Create the SPSC command queue connecting a controller to an engine.
pub fn command_channel() -> (
    rtrb::Producer<EngineCommand>,
    rtrb::Consumer<EngineCommand>,
) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_stays_small() {
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 40, "EngineCommand is {} bytes, expected <= 40", size);
    }

    #[test]
    fn test_channel_round_trip() {
        let (mut tx, mut rx) = command_channel();
        tx.push(EngineCommand::Seek { position: 123 }).ok();
        match rx.pop() {
            Ok(EngineCommand::Seek { position }) => assert_eq!(position, 123),
            _ => panic!("expected the seek back"),
        }
    }

    #[test]
    fn test_empty_queue_pops_error() {
        let (_tx, mut rx) = command_channel();
        assert!(rx.pop().is_err());
    }
}
