//! Registration token to owner email mapping.
//!
//! Persisted as the `"keys"` blob. Entries are created by registration and
//! never removed; re-registering an address overwrites its entry.

use std::collections::BTreeMap;

use clonewatch_store::BlobStore;
use clonewatch_types::{RegistrationToken, decode, encode};
use snafu::ResultExt;

use crate::error::{EncodingSnafu, Result, ServiceError};

/// Name of the blob holding the registry.
pub const KEYS_BLOB: &str = "keys";

/// In-memory copy of the key registry.
///
/// Loaded fresh from the store for each operation and discarded afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRegistry {
    entries: BTreeMap<RegistrationToken, String>,
    /// Store version this copy was loaded from (0 if never written).
    version: u64,
}

impl KeyRegistry {
    /// Loads the registry, returning an empty one if it was never written.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::StoreUnavailable`] if the read fails or
    /// [`ServiceError::CorruptState`] if the blob cannot be decoded.
    pub fn load<B: BlobStore + ?Sized>(store: &B) -> Result<Self> {
        let Some(blob) = store.load(KEYS_BLOB).map_err(ServiceError::from_store)? else {
            return Ok(Self::default());
        };
        let entries = decode(&blob.data).map_err(|e| ServiceError::CorruptState {
            blob: KEYS_BLOB.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { entries, version: blob.version })
    }

    /// Stages the registry in the store and returns the new blob version.
    ///
    /// The caller flushes.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Encoding`] if the mapping cannot be encoded or
    /// [`ServiceError::StoreUnavailable`] if staging fails.
    pub fn save<B: BlobStore + ?Sized>(&self, store: &B) -> Result<u64> {
        let data = encode(&self.entries).context(EncodingSnafu { blob: KEYS_BLOB })?;
        store.save(KEYS_BLOB, data).map_err(ServiceError::from_store)
    }

    /// Returns the owner email for `token`.
    pub fn email(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(String::as_str)
    }

    /// Sets the owner email for `token`, returning the previous one.
    pub fn insert(&mut self, token: RegistrationToken, email: impl Into<String>) -> Option<String> {
        self.entries.insert(token, email.into())
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no token is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store version this copy was loaded from.
    pub fn version(&self) -> u64 {
        self.version
    }
}
