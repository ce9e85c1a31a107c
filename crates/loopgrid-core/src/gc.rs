//! RT-safe garbage collection for shared engine objects
//!
//! Channel shared state, waves and plugins are reachable from the audio
//! thread through `basedrop::Shared` pointers. When the last reference is
//! dropped (possibly inside the audio callback, when an old Document slot is
//! released) the value is only enqueued; a background thread frees it.
//!
//! ```ignore
//! use basedrop::Shared;
//! use crate::gc::gc_handle;
//!
//! let wave = Shared::new(&gc_handle(), wave);
//! let view = wave.clone();
//! drop(wave);
//! drop(view); // queued for the collector thread, not freed here
//! ```

use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

/// How often the collector thread reclaims deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

/// Global handle for creating Shared<T> allocations
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Spawn the collector thread and return a handle to it
///
/// Falls back to a leaked local collector if the thread cannot be started, so
/// allocation keeps working (memory is then reclaimed only on `collect`).
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("loopgrid-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread only
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            log::warn!("GC thread unavailable, deferred drops will accumulate");
            let collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Get a handle for creating Shared<T> allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
