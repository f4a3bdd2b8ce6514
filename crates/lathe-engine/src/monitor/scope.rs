//! Oscilloscope sample ring
//!
//! A fixed ring of `AtomicU32` slots the callback writes the latest
//! post-chain samples into, newest overwriting oldest. The UI copies
//! the whole ring out whenever it redraws. There is no block framing
//! and no ordering between slots and the head index, so a reader can
//! see a partially written block; for a scope trace that is
//! acceptable and keeps the writer wait-free.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Ring length in samples, about 185 ms at 44.1 kHz.
pub const SCOPE_RING_FRAMES: usize = 8192;

pub struct ScopeRing {
    slots: Vec<AtomicU32>,
    /// Next write position, always `< slots.len()`.
    head: AtomicUsize,
}

impl ScopeRing {
    pub fn new() -> Self {
        Self::with_capacity(SCOPE_RING_FRAMES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(capacity, || AtomicU32::new(0));
        Self {
            slots,
            head: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Append one block of samples. Audio thread only.
    pub fn push_block(&self, samples: &[f32]) {
        let cap = self.slots.len();
        if cap == 0 {
            return;
        }
        let start = self.head.load(Ordering::Relaxed);
        for (i, &sample) in samples.iter().enumerate() {
            self.slots[(start + i) % cap].store(sample.to_bits(), Ordering::Relaxed);
        }
        self.head.store((start + samples.len()) % cap, Ordering::Relaxed);
    }

    /// Copy the ring into `out`, oldest sample first. Slots that were
    /// never written read as silence.
    pub fn snapshot_into(&self, out: &mut Vec<f32>) {
        let cap = self.slots.len();
        out.clear();
        out.reserve(cap);
        let head = self.head.load(Ordering::Relaxed);
        for i in 0..cap {
            let bits = self.slots[(head + i) % cap].load(Ordering::Relaxed);
            out.push(f32::from_bits(bits));
        }
    }
}

impl Default for ScopeRing {
    fn default() -> Self {
        Self::new()
    }
}
