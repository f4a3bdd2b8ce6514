//! Tear-free parameter handoff between the UI and the audio callback
//!
//! Every effect stage keeps its live parameters as a plain struct owned
//! by the callback thread. The UI publishes whole replacement structs
//! through a [`ParamCell`]: writes land in a pending slot guarded by a
//! short spinlock, and the callback swaps the pending copy in at block
//! boundaries. A multi-field update (say all three EQ bands) is therefore
//! observed either entirely or not at all, never half-applied.
//!
//! The callback side never blocks: if it loses the lock race it skips the
//! swap and retries on the next block, a few milliseconds later.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-slot mailbox for `Copy` parameter structs.
///
/// `store` may briefly spin (the holder only ever copies a small struct),
/// `try_take` never does.
pub struct ParamCell<T: Copy> {
    pending: UnsafeCell<T>,
    dirty: AtomicBool,
    locked: AtomicBool,
}

// The UnsafeCell is only dereferenced while `locked` is held.
unsafe impl<T: Copy + Send> Send for ParamCell<T> {}
unsafe impl<T: Copy + Send> Sync for ParamCell<T> {}

impl<T: Copy> ParamCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            pending: UnsafeCell::new(value),
            dirty: AtomicBool::new(false),
            locked: AtomicBool::new(false),
        }
    }

    /// Publish a new parameter set. Control thread only.
    pub fn store(&self, value: T) {
        self.lock();
        unsafe { *self.pending.get() = value };
        self.dirty.store(true, Ordering::Release);
        self.unlock();
    }

    /// Take the pending set if one was published since the last take.
    ///
    /// Returns `None` when nothing changed or when the control thread
    /// happens to hold the lock right now. Audio thread only.
    pub fn try_take(&self) -> Option<T> {
        if !self.dirty.load(Ordering::Acquire) {
            return None;
        }
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        let value = unsafe { *self.pending.get() };
        self.dirty.store(false, Ordering::Relaxed);
        self.unlock();
        Some(value)
    }

    /// Read back the most recently stored value. Control thread only.
    pub fn latest(&self) -> T {
        self.lock();
        let value = unsafe { *self.pending.get() };
        self.unlock();
        value
    }

    fn lock(&self) {
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    #[inline]
    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}
