//! Error types for canary operations.
//!
//! Every failure path of Register and ReportHit maps to one [`ServiceError`]
//! variant. Variants fall into two classes:
//!
//! | Class        | Variants                                                   | Retried by service |
//! |--------------|------------------------------------------------------------|--------------------|
//! | Client input | `InvalidEmail`, `MissingParameter`, `UnknownToken`         | never              |
//! | Collaborator | `NotificationFailed`, `StoreUnavailable`, `CorruptState`   | never              |
//! | Internal     | `Encoding`                                                 | never              |
//!
//! Callers may re-issue a request after a collaborator failure; ReportHit is
//! idempotent once an origin has been recorded.

use std::fmt;

use clonewatch_store::StoreError;
use clonewatch_types::{CodecError, ValidationError};
use snafu::Snafu;

use crate::notifier::NotifyError;

/// Result type for canary operations.
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

/// A required ReportHit parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    /// The registration token (`key`).
    Key,
    /// The reported origin.
    Origin,
}

impl Parameter {
    /// Wire name of the parameter.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Origin => "origin",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from canary operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ServiceError {
    /// The owner email failed the syntax check. Nothing was written.
    #[snafu(display("Invalid email: {source}"))]
    InvalidEmail {
        /// The violated constraint.
        source: ValidationError,
    },

    /// A required parameter was absent or empty.
    #[snafu(display("Missing {parameter} parameter"))]
    MissingParameter {
        /// Which parameter.
        parameter: Parameter,
    },

    /// The key is not registered.
    #[snafu(display("Unknown registration token {token}"))]
    UnknownToken {
        /// Log-safe prefix of the rejected key.
        token: String,
    },

    /// The notifier reported failure. The origin was not recorded.
    #[snafu(display("Notification failed: {source}"))]
    NotificationFailed {
        /// The notifier error.
        source: NotifyError,
    },

    /// Loading, saving or flushing a blob failed.
    #[snafu(display("Store unavailable: {source}"))]
    StoreUnavailable {
        /// The store error.
        source: StoreError,
    },

    /// A persisted blob could not be decoded into its mapping.
    #[snafu(display("Stored {blob} blob is unreadable: {reason}"))]
    CorruptState {
        /// Blob name.
        blob: String,
        /// Decoder or checksum failure.
        reason: String,
    },

    /// An in-memory mapping could not be encoded. Nothing was staged.
    #[snafu(display("Failed to encode {blob} blob: {source}"))]
    Encoding {
        /// Blob name.
        blob: String,
        /// The encoder error.
        source: CodecError,
    },
}

impl ServiceError {
    /// Wraps a store error, classifying checksum failures as corrupt state.
    pub(crate) fn from_store(source: StoreError) -> Self {
        match source {
            StoreError::Corrupted { name, reason } => Self::CorruptState { blob: name, reason },
            source => Self::StoreUnavailable { source },
        }
    }

    /// Whether the error was caused by client input.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEmail { .. } | Self::MissingParameter { .. } | Self::UnknownToken { .. }
        )
    }

    /// Whether re-issuing the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotificationFailed { .. } => true,
            Self::StoreUnavailable { source } => source.is_retryable(),
            _ => false,
        }
    }

    /// Human-readable message returned to the reporting client.
    ///
    /// Collaborator failures get a generic message; the detail is logged.
    #[must_use]
    pub const fn client_message(&self) -> &'static str {
        match self {
            Self::InvalidEmail { .. } => "Invalid email address.",
            Self::MissingParameter { parameter: Parameter::Key } => "Missing key parameter.",
            Self::MissingParameter { parameter: Parameter::Origin } => "Missing origin parameter.",
            Self::UnknownToken { .. } => "Invalid key parameter.",
            Self::NotificationFailed { .. } => "Failed to send notification.",
            Self::StoreUnavailable { .. } => "Failed to persist state.",
            Self::CorruptState { .. } => "Stored state is unreadable.",
            Self::Encoding { .. } => "Failed to persist state.",
        }
    }
}
