//! Blob store wrapper with fault injection.
//!
//! Wraps an [`InMemoryStore`] and fails selected operations on demand, so
//! tests can drive the service through store outages without touching disk.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use clonewatch_store::{BlobStore, InMemoryStore, Result, StoreError, VersionedBlob};

/// A [`BlobStore`] whose loads and flushes can be made to fail.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    fail_flushes: AtomicUsize,
    fail_loads: AtomicBool,
    /// Milliseconds each load blocks the calling thread.
    load_delay_ms: AtomicU64,
    loads: AtomicUsize,
    flushes: AtomicUsize,
    discards: AtomicUsize,
}

impl FaultyStore {
    /// Creates an empty store with no faults armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `n` flushes. Staged saves stay pending.
    pub fn fail_next_flushes(&self, n: usize) {
        self.fail_flushes.store(n, Ordering::SeqCst);
    }

    /// Fails every load while `fail` is set.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Blocks the calling thread for `delay` on every load, like a slow disk.
    pub fn set_load_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.load_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of load calls so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of successful flushes so far.
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Number of `discard_pending` calls so far.
    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    /// The wrapped store, for inspecting durable state.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

impl BlobStore for FaultyStore {
    fn load(&self, name: &str) -> Result<Option<VersionedBlob>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = self.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable { reason: "injected load failure".to_string() });
        }
        self.inner.load(name)
    }

    fn save(&self, name: &str, data: Vec<u8>) -> Result<u64> {
        self.inner.save(name, data)
    }

    fn flush(&self) -> Result<()> {
        let injected = self
            .fail_flushes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable { reason: "injected flush failure".to_string() });
        }
        self.inner.flush()?;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn discard_pending(&self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
        self.inner.discard_pending();
    }
}
