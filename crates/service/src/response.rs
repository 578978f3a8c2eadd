//! Structured ReportHit result returned to the client script.

use serde::{Deserialize, Serialize};

use crate::{error::ServiceError, service::HitOutcome};

/// Body of a ReportHit response: `{"status":"ok"}` or
/// `{"status":"error","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HitResponse {
    /// The report was accepted (alert sent, or origin already known).
    Ok,
    /// The report was rejected or could not be processed.
    Error {
        /// Client-facing description.
        message: String,
    },
}

impl HitResponse {
    /// Whether this is the `ok` variant.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<HitOutcome> for HitResponse {
    fn from(_: HitOutcome) -> Self {
        Self::Ok
    }
}

impl From<&ServiceError> for HitResponse {
    fn from(err: &ServiceError) -> Self {
        Self::Error { message: err.client_message().to_string() }
    }
}

impl From<Result<HitOutcome, ServiceError>> for HitResponse {
    fn from(result: Result<HitOutcome, ServiceError>) -> Self {
        match result {
            Ok(outcome) => outcome.into(),
            Err(err) => (&err).into(),
        }
    }
}
