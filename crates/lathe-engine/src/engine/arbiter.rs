//! Process-wide preview ownership
//!
//! With several documents open, each window owns an engine instance,
//! but only one may be live previewing at a time; every other engine
//! silences its output while the token is held elsewhere. Entering
//! preview takes the token unconditionally (the newest preview wins and
//! the previous holder goes quiet), leaving releases it only if still
//! held, and a losing engine re-claims opportunistically from its own
//! callback once the token frees up.
//!
//! The token is a single atomic holding the owning engine id, `0` for
//! unowned. No memory is guarded by it, so relaxed ordering is enough.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Owner id meaning "nobody is previewing".
pub const NO_OWNER: u64 = 0;

static ARBITER: OnceLock<Arc<PreviewArbiter>> = OnceLock::new();
static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// The shared token. Engines hold an `Arc` so tests can wire several
/// engines to a private arbiter instead of the process one.
#[derive(Debug, Default)]
pub struct PreviewArbiter {
    owner: AtomicU64,
}

impl PreviewArbiter {
    pub fn new() -> Self {
        Self {
            owner: AtomicU64::new(NO_OWNER),
        }
    }

    /// Current owner id, `NO_OWNER` if free.
    #[inline]
    pub fn owner(&self) -> u64 {
        self.owner.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_owner(&self, id: u64) -> bool {
        self.owner() == id
    }

    /// Take the token unconditionally. Returns the previous owner.
    pub fn claim(&self, id: u64) -> u64 {
        self.owner.swap(id, Ordering::Relaxed)
    }

    /// Take the token only if nobody holds it.
    pub fn try_claim(&self, id: u64) -> bool {
        self.owner
            .compare_exchange(NO_OWNER, id, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Give the token back, but only if we still hold it. A later
    /// claimant's ownership survives a stale release.
    pub fn release(&self, id: u64) -> bool {
        self.owner
            .compare_exchange(id, NO_OWNER, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

/// The process-wide arbiter shared by every engine.
pub fn preview_arbiter() -> Arc<PreviewArbiter> {
    Arc::clone(ARBITER.get_or_init(|| Arc::new(PreviewArbiter::new())))
}

/// Allocate a unique nonzero engine id.
pub fn next_engine_id() -> u64 {
    NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_steals_and_reports_previous_owner() {
        let arbiter = PreviewArbiter::new();
        assert_eq!(arbiter.claim(3), NO_OWNER);
        assert!(arbiter.is_owner(3));
        assert_eq!(arbiter.claim(5), 3);
        assert!(arbiter.is_owner(5));
    }

    #[test]
    fn test_stale_release_does_not_clobber_new_owner() {
        let arbiter = PreviewArbiter::new();
        arbiter.claim(3);
        arbiter.claim(5);
        assert!(!arbiter.release(3));
        assert!(arbiter.is_owner(5));
        assert!(arbiter.release(5));
        assert_eq!(arbiter.owner(), NO_OWNER);
    }

    #[test]
    fn test_try_claim_only_succeeds_when_free() {
        let arbiter = PreviewArbiter::new();
        assert!(arbiter.try_claim(7));
        assert!(!arbiter.try_claim(8));
        arbiter.release(7);
        assert!(arbiter.try_claim(8));
    }

    #[test]
    fn test_engine_ids_are_unique_and_nonzero() {
        let a = next_engine_id();
        let b = next_engine_id();
        assert_ne!(a, NO_OWNER);
        assert_ne!(a, b);
    }
}
