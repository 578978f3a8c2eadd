//! Error types for the blob store.

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Result type alias for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors that can occur during blob store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[snafu(display("I/O error on {}: {source}", path.display()))]
    Io {
        /// File or directory the operation touched.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// A persisted blob failed header or checksum verification.
    #[snafu(display("Corrupted blob {name}: {reason}"))]
    Corrupted {
        /// Blob name.
        name: String,
        /// Description of what was corrupted.
        reason: String,
    },

    /// A blob name was empty, longer than 64 bytes, or used characters
    /// outside lowercase ASCII letters, digits, `_` and `-`.
    #[snafu(display("Invalid blob name: {name:?}"))]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The backend cannot currently serve the request.
    #[snafu(display("Store unavailable: {reason}"))]
    Unavailable {
        /// Why the backend is unavailable.
        reason: String,
    },
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Corruption and invalid names need operator or caller action first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Unavailable { .. })
    }
}
