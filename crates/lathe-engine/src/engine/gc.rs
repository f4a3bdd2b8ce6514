//! Deferred reclamation for audio-thread allocations
//!
//! Source buffers and plugin chains are handed to the callback thread
//! wrapped in [`basedrop`] smart pointers. When the callback drops its
//! reference (a new buffer replaced an old one, a chain was cleared),
//! the payload is queued instead of freed in place, and a background
//! thread drains the queue. The callback never runs a deallocator.
//!
//! One process-wide collector serves every engine instance; documents
//! share it the same way they share the preview arbiter.

use std::sync::OnceLock;
use std::time::Duration;

use basedrop::{Collector, Handle};

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = std::sync::mpsc::channel();

    // Collector is !Sync, so a dedicated thread owns it and we keep
    // only the cloneable Handle.
    std::thread::Builder::new()
        .name("lathe-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            loop {
                collector.collect();
                std::thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("failed to spawn lathe-gc thread");

    rx.recv().expect("lathe-gc thread exited before sending its handle")
}

/// Handle for allocating `Shared`/`Owned` values tied to the process
/// collector. Spawns the collector thread on first use.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;

    #[test]
    fn test_handle_is_reusable_across_calls() {
        let a = gc_handle();
        let b = gc_handle();
        let shared = Shared::new(&a, vec![1_u8, 2, 3]);
        let clone = Shared::clone(&shared);
        assert_eq!(*clone, vec![1, 2, 3]);
        drop(shared);
        drop(clone);
        let _ = b;
    }
}
