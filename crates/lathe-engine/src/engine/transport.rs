//! Sample accurate playback transport
//!
//! Owns the playhead: play state, position, loop points and material
//! length, all in source frames. The canonical copies live in plain
//! fields touched only by the callback thread; every mutation is
//! mirrored into [`TransportAtomics`] so the UI can read position and
//! state without locks.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::types::PlayState;

/// Lock-free mirror of the transport for UI reads.
///
/// Plain atomic loads/stores with relaxed ordering; the values are
/// display state, nothing downstream is guarded by them.
#[derive(Debug, Default)]
pub struct TransportAtomics {
    position: AtomicU64,
    state: AtomicU8,
    looping: AtomicBool,
    loop_set: AtomicBool,
    loop_start: AtomicU64,
    loop_end: AtomicU64,
    total_frames: AtomicU64,
    sample_rate: AtomicU32,
}

impl TransportAtomics {
    /// Playhead in source frames.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Playhead in seconds against the prepared rate.
    pub fn position_seconds(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return 0.0;
        }
        self.position() as f64 / rate as f64
    }

    #[inline]
    pub fn play_state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    /// Loop points if set, `(start, end)` in frames.
    pub fn loop_points(&self) -> Option<(u64, u64)> {
        if self.loop_set.load(Ordering::Relaxed) {
            Some((
                self.loop_start.load(Ordering::Relaxed),
                self.loop_end.load(Ordering::Relaxed),
            ))
        } else {
            None
        }
    }

    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }
}

/// The transport proper. Lives on the callback thread inside the
/// engine; the UI talks to it through commands and reads it back
/// through the atomics mirror.
pub struct Transport {
    state: PlayState,
    position: u64,
    looping: bool,
    loop_points: Option<(u64, u64)>,
    total_frames: u64,
    sample_rate: u32,
    atomics: Arc<TransportAtomics>,
}

impl Transport {
    pub fn new(sample_rate: u32) -> Self {
        let transport = Self {
            state: PlayState::Stopped,
            position: 0,
            looping: false,
            loop_points: None,
            total_frames: 0,
            sample_rate,
            atomics: Arc::new(TransportAtomics::default()),
        };
        transport.atomics.sample_rate.store(sample_rate, Ordering::Relaxed);
        transport
    }

    pub fn atomics(&self) -> Arc<TransportAtomics> {
        Arc::clone(&self.atomics)
    }

    #[inline]
    pub fn play_state(&self) -> PlayState {
        self.state
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    #[inline]
    pub fn loop_points(&self) -> Option<(u64, u64)> {
        self.loop_points
    }

    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn has_material(&self) -> bool {
        self.total_frames > 0
    }

    /// Begin playback from the current position. Playing twice is a
    /// no-op; play never rewinds.
    pub fn play(&mut self) {
        if self.state == PlayState::Playing || self.total_frames == 0 {
            return;
        }
        self.state = PlayState::Playing;
        self.sync_state_atomic();
    }

    /// Halt playback, keeping the position for a later resume.
    pub fn pause(&mut self) {
        if self.state != PlayState::Playing {
            return;
        }
        self.state = PlayState::Paused;
        self.sync_state_atomic();
    }

    /// Halt playback and rewind to the loop start if loop points are
    /// set, else to zero. The loop points themselves survive.
    pub fn stop(&mut self) {
        self.state = PlayState::Stopped;
        self.position = self.loop_points.map(|(start, _)| start).unwrap_or(0);
        self.sync_state_atomic();
        self.sync_position_atomic();
    }

    /// Move the playhead, clamped into the material. Valid in any state.
    pub fn seek(&mut self, position: u64) {
        self.position = position.min(self.total_frames);
        self.sync_position_atomic();
    }

    /// Toggle looping. Orthogonal to loop points: looping with no
    /// points cycles the whole material.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        self.atomics.looping.store(looping, Ordering::Relaxed);
    }

    /// Set the loop window, silently clamped into the material. A
    /// malformed window collapses to the nearest valid one.
    pub fn set_loop_points(&mut self, start: u64, end: u64) {
        if self.total_frames == 0 {
            return;
        }
        let end = end.min(self.total_frames).max(1);
        let start = start.min(end - 1);
        self.loop_points = Some((start, end));
        self.sync_loop_atomic();
    }

    pub fn clear_loop_points(&mut self) {
        self.loop_points = None;
        self.sync_loop_atomic();
    }

    /// Install fresh material: playhead to zero, stopped, loop cleared.
    pub fn install_material(&mut self, total_frames: u64) {
        self.total_frames = total_frames;
        self.position = 0;
        self.state = PlayState::Stopped;
        self.loop_points = None;
        self.sync_all_atomics();
    }

    /// Replace the material under the playhead, preserving state and
    /// position. Anything pointing past the new end is clamped.
    pub fn reload_material(&mut self, total_frames: u64) {
        self.total_frames = total_frames;
        self.position = self.position.min(total_frames);
        self.loop_points = match self.loop_points {
            Some((start, end)) if total_frames > 0 => {
                let end = end.min(total_frames).max(1);
                Some((start.min(end - 1), end))
            }
            _ => None,
        };
        if total_frames == 0 {
            self.state = PlayState::Stopped;
        }
        self.sync_all_atomics();
    }

    /// Re-derive rate dependent state after a device change.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.atomics.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    /// Loop window in effect: the explicit points, else the whole
    /// material.
    pub fn effective_loop(&self) -> (u64, u64) {
        self.loop_points.unwrap_or((0, self.total_frames))
    }

    /// Move the playhead past a processed block.
    ///
    /// An overshoot past the loop end folds back by modulo, so a loop
    /// shorter than the block wraps as many times as needed and the
    /// playhead lands exactly where the pulled audio ended. Without
    /// looping the transport stops at the end of material.
    pub fn advance(&mut self, frames: u64) {
        if self.state != PlayState::Playing || self.total_frames == 0 {
            return;
        }
        let mut position = self.position + frames;
        if self.looping {
            let (start, end) = self.effective_loop();
            let len = end.saturating_sub(start);
            if len > 0 && position >= end {
                position = start + (position - end) % len;
            }
        } else if position >= self.total_frames {
            position = self.total_frames;
            self.state = PlayState::Stopped;
            self.sync_state_atomic();
        }
        self.position = position;
        self.sync_position_atomic();
    }

    /// Walk the source segments a block of `frames` will cover from the
    /// current position, calling `emit(src_pos, dst_offset, len)` for
    /// each. Crossing the loop end yields the tail up to the boundary
    /// and continues from the loop start; the segments concatenate to
    /// exactly the audio `advance(frames)` steps over.
    pub fn plan_block(&self, frames: usize, mut emit: impl FnMut(u64, usize, usize)) {
        if self.state != PlayState::Playing || self.total_frames == 0 {
            return;
        }
        let (start, end) = self.effective_loop();
        let loop_len = end.saturating_sub(start);
        let mut pos = self.position;
        let mut filled = 0;
        while filled < frames {
            let limit = if self.looping { end } else { self.total_frames };
            if pos >= limit {
                if self.looping && loop_len > 0 {
                    pos = start + (pos - end) % loop_len;
                    continue;
                }
                break;
            }
            let n = (limit - pos).min((frames - filled) as u64) as usize;
            emit(pos, filled, n);
            pos += n as u64;
            filled += n;
        }
    }

    #[inline]
    fn sync_state_atomic(&self) {
        self.atomics.state.store(self.state.as_u8(), Ordering::Relaxed);
    }

    #[inline]
    fn sync_position_atomic(&self) {
        self.atomics.position.store(self.position, Ordering::Relaxed);
    }

    #[inline]
    fn sync_loop_atomic(&self) {
        let (start, end) = self.loop_points.unwrap_or((0, 0));
        self.atomics.loop_start.store(start, Ordering::Relaxed);
        self.atomics.loop_end.store(end, Ordering::Relaxed);
        self.atomics
            .loop_set
            .store(self.loop_points.is_some(), Ordering::Relaxed);
    }

    fn sync_all_atomics(&self) {
        self.sync_state_atomic();
        self.sync_position_atomic();
        self.sync_loop_atomic();
        self.atomics.looping.store(self.looping, Ordering::Relaxed);
        self.atomics
            .total_frames
            .store(self.total_frames, Ordering::Relaxed);
    }
}
