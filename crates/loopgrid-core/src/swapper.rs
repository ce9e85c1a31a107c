//! Lock-free multi-slot value swapper
//!
//! A single writer publishes new versions of a value while any number of
//! real-time readers grab the most recent version without blocking.
//!
//! The swapper is a fixed ring of `N` slots. Each slot carries a reader
//! count; `latest` names the slot holding the newest version. A reader
//! increments the count of the slot it believes is latest and then checks
//! that the slot is *still* latest. If the writer moved on in between it
//! backs off and retries, so it never dereferences a slot the writer may be
//! overwriting. The writer only ever writes into a slot that is not latest
//! and has no readers.
//!
//! ```ignore
//! let (mut writer, reader) = swapper(Document::default());
//!
//! // control thread
//! writer.publish(doc.clone());
//!
//! // audio thread, once per block
//! let doc = reader.acquire();
//! ```

use std::cell::UnsafeCell;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::Backoff;

/// Default number of slots
pub const DEFAULT_SLOTS: usize = 6;

struct Slot<T> {
    value: UnsafeCell<T>,
    readers: AtomicUsize,
}

struct Inner<T, const N: usize> {
    slots: [Slot<T>; N],
    latest: AtomicUsize,
}

// Safe because slot contents are only written by the single writer while the
// slot is neither latest nor held by any reader.
unsafe impl<T: Send + Sync> Sync for Slot<T> {}

/// Create a swapper with the default slot count
pub fn swapper<T: Clone>(initial: T) -> (SwapperWriter<T>, SwapperReader<T>) {
    SwapperWriter::new(initial)
}

/// Writer side (control thread only, not `Clone`)
pub struct SwapperWriter<T, const N: usize = DEFAULT_SLOTS> {
    inner: Arc<Inner<T, N>>,
}

impl<T: Clone, const N: usize> SwapperWriter<T, N> {
    /// Create a swapper where every slot holds a copy of `initial`
    pub fn new(initial: T) -> (Self, SwapperReader<T, N>) {
        assert!(N >= 3, "Swapper needs at least 3 slots, got {}", N);

        let inner = Arc::new(Inner {
            slots: std::array::from_fn(|_| Slot {
                value: UnsafeCell::new(initial.clone()),
                readers: AtomicUsize::new(0),
            }),
            latest: AtomicUsize::new(0),
        });

        (
            Self { inner: Arc::clone(&inner) },
            SwapperReader { inner },
        )
    }
}

impl<T, const N: usize> SwapperWriter<T, N> {
    /// Publish a new version
    ///
    /// Spins (with backoff) only while every candidate slot is still held by
    /// a reader.
    pub fn publish(&mut self, value: T) {
        let latest = self.inner.latest.load(Ordering::SeqCst);
        let backoff = Backoff::new();

        let free = loop {
            let candidate = (1..N)
                .map(|step| (latest + step) % N)
                .find(|&i| self.inner.slots[i].readers.load(Ordering::SeqCst) == 0);

            match candidate {
                Some(i) => break i,
                None => backoff.snooze(),
            }
        };

        // SAFETY: `free` is not latest and has no readers. Readers that race
        // in now will fail their latest check and never touch the value.
        unsafe {
            *self.inner.slots[free].value.get() = value;
        }
        self.inner.latest.store(free, Ordering::SeqCst);
    }

    /// Wait until no reader holds a version older than the latest one
    pub fn wait_for_readers(&self) {
        let backoff = Backoff::new();
        loop {
            let latest = self.inner.latest.load(Ordering::SeqCst);
            let busy = self
                .inner
                .slots
                .iter()
                .enumerate()
                .any(|(i, slot)| i != latest && slot.readers.load(Ordering::SeqCst) > 0);

            if !busy {
                return;
            }
            backoff.snooze();
        }
    }

    /// Read the latest published version from the writer side
    pub fn latest(&self) -> &T {
        let latest = self.inner.latest.load(Ordering::SeqCst);
        // SAFETY: only this writer mutates slots, and not while `&self` is
        // borrowed.
        unsafe { &*self.inner.slots[latest].value.get() }
    }

    /// Create another reader handle
    pub fn reader(&self) -> SwapperReader<T, N> {
        SwapperReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Reader side (cloneable, real-time safe)
pub struct SwapperReader<T, const N: usize = DEFAULT_SLOTS> {
    inner: Arc<Inner<T, N>>,
}

impl<T, const N: usize> Clone for SwapperReader<T, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, const N: usize> SwapperReader<T, N> {
    /// Grab the latest version
    ///
    /// Never blocks and never allocates. The guard keeps the slot alive until
    /// it is dropped.
    pub fn acquire(&self) -> SwapperGuard<'_, T> {
        loop {
            let index = self.inner.latest.load(Ordering::SeqCst);
            let slot = &self.inner.slots[index];

            slot.readers.fetch_add(1, Ordering::SeqCst);
            if self.inner.latest.load(Ordering::SeqCst) == index {
                return SwapperGuard { slot };
            }
            // The writer moved on between the two loads
            slot.readers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Scoped read access to one published version
pub struct SwapperGuard<'a, T> {
    slot: &'a Slot<T>,
}

impl<T> Deref for SwapperGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the slot's reader count is non-zero for the guard's
        // lifetime, so the writer will not pick it.
        unsafe { &*self.slot.value.get() }
    }
}

impl<T> Drop for SwapperGuard<'_, T> {
    fn drop(&mut self) {
        self.slot.readers.fetch_sub(1, Ordering::SeqCst);
    }
}
