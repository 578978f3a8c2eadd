//! Registration token to notified-origins mapping.
//!
//! Persisted as the `"origins"` blob. An origin in a token's set means an alert
//! for that (token, origin) pair was delivered; the set is the only record of
//! that fact. A token with no entry behaves as an empty set.

use std::collections::{BTreeMap, BTreeSet};

use clonewatch_store::BlobStore;
use clonewatch_types::{Origin, RegistrationToken, decode, encode};
use snafu::ResultExt;

use crate::error::{EncodingSnafu, Result, ServiceError};

/// Name of the blob holding the ledger.
pub const ORIGINS_BLOB: &str = "origins";

/// In-memory copy of the origin ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginLedger {
    entries: BTreeMap<RegistrationToken, BTreeSet<Origin>>,
    /// Store version this copy was loaded from (0 if never written).
    version: u64,
}

impl OriginLedger {
    /// Loads the ledger, returning an empty one if it was never written.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::StoreUnavailable`] if the read fails or
    /// [`ServiceError::CorruptState`] if the blob cannot be decoded.
    pub fn load<B: BlobStore + ?Sized>(store: &B) -> Result<Self> {
        let Some(blob) = store.load(ORIGINS_BLOB).map_err(ServiceError::from_store)? else {
            return Ok(Self::default());
        };
        let entries = decode(&blob.data).map_err(|e| ServiceError::CorruptState {
            blob: ORIGINS_BLOB.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { entries, version: blob.version })
    }

    /// Stages the ledger in the store and returns the new blob version.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Encoding`] if the mapping cannot be encoded or
    /// [`ServiceError::StoreUnavailable`] if staging fails.
    pub fn save<B: BlobStore + ?Sized>(&self, store: &B) -> Result<u64> {
        let data = encode(&self.entries).context(EncodingSnafu { blob: ORIGINS_BLOB })?;
        store.save(ORIGINS_BLOB, data).map_err(ServiceError::from_store)
    }

    /// Whether `origin` has already been notified for `token`.
    pub fn contains(&self, token: &str, origin: &str) -> bool {
        self.entries.get(token).is_some_and(|set| set.contains(origin))
    }

    /// Records `origin` for `token`. Returns `false` if it was already present.
    pub fn record(&mut self, token: RegistrationToken, origin: Origin) -> bool {
        self.entries.entry(token).or_default().insert(origin)
    }

    /// Iterates the origins recorded for `token`.
    pub fn origins<'a>(&'a self, token: &str) -> impl Iterator<Item = &'a Origin> + 'a {
        self.entries.get(token).into_iter().flatten()
    }

    /// Store version this copy was loaded from.
    pub fn version(&self) -> u64 {
        self.version
    }
}
