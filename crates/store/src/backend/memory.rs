//! In-memory blob store for tests and ephemeral mode.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{BlobStore, VersionedBlob, validate_name};
use crate::error::Result;

/// In-memory blob store.
///
/// Keeps separate staged and durable maps so that flush semantics can be
/// observed: [`discard_pending`](BlobStore::discard_pending) behaves like a
/// restart that loses everything saved since the last flush.
#[derive(Default)]
pub struct InMemoryStore {
    /// Saves not yet flushed.
    pending: RwLock<HashMap<String, VersionedBlob>>,
    /// Flushed blobs.
    durable: RwLock<HashMap<String, VersionedBlob>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last flushed blob for `name`, ignoring staged saves.
    pub fn durable(&self, name: &str) -> Option<VersionedBlob> {
        self.durable.read().get(name).cloned()
    }

    /// Returns the number of staged, unflushed blobs.
    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }
}

impl BlobStore for InMemoryStore {
    fn load(&self, name: &str) -> Result<Option<VersionedBlob>> {
        validate_name(name)?;
        Ok(self.durable.read().get(name).cloned())
    }

    fn save(&self, name: &str, data: Vec<u8>) -> Result<u64> {
        validate_name(name)?;
        // Lock order: pending, then durable.
        let mut pending = self.pending.write();
        let current = match pending.get(name) {
            Some(blob) => blob.version,
            None => self.durable.read().get(name).map_or(0, |b| b.version),
        };
        let version = current + 1;
        pending.insert(name.to_string(), VersionedBlob { version, data });
        Ok(version)
    }

    fn flush(&self) -> Result<()> {
        let mut pending = self.pending.write();
        let mut durable = self.durable.write();
        durable.extend(pending.drain());
        Ok(())
    }

    fn discard_pending(&self) {
        self.pending.write().clear();
    }
}
