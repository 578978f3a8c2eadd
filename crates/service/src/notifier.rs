//! Outbound alert delivery.
//!
//! A [`Notifier`] delivers one [`Notification`] per call and reports plain
//! success or failure; there is no partial-delivery state and no retry.

use std::{fmt::Write as _, io};

use async_trait::async_trait;
use snafu::Snafu;

/// Errors from alert delivery.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum NotifyError {
    /// The mail transport could not be started.
    #[snafu(display("Failed to spawn {program}: {source}"))]
    Spawn {
        /// Transport binary.
        program: String,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Talking to the running transport failed.
    #[snafu(display("Transport I/O failed: {source}"))]
    Transport {
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The transport did not finish in time.
    #[snafu(display("Transport timed out after {timeout_ms}ms"))]
    TimedOut {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The transport exited unsuccessfully.
    #[snafu(display("Transport exited with {status}: {stderr}"))]
    Exit {
        /// Exit status description.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The notifier refused the message.
    #[snafu(display("Notification rejected: {reason}"))]
    Rejected {
        /// Why the message was refused.
        reason: String,
    },
}

/// An alert email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Owner address.
    pub to: String,
    /// Optional From address.
    pub from: Option<String>,
    /// Single-line subject.
    pub subject: String,
    /// Plain-text body. Client-supplied values in it are already sanitized.
    pub body: String,
}

impl Notification {
    /// Renders the notification as an RFC 5322 message with a plain-text body.
    pub fn to_message(&self) -> String {
        let mut msg = String::with_capacity(self.body.len() + 256);
        if let Some(from) = &self.from {
            let _ = writeln!(msg, "From: {from}");
        }
        let _ = writeln!(msg, "To: {}", self.to);
        let _ = writeln!(msg, "Subject: {}", self.subject);
        msg.push_str("MIME-Version: 1.0\n");
        msg.push_str("Content-Type: text/plain; charset=utf-8\n");
        msg.push('\n');
        msg.push_str(&self.body);
        if !self.body.ends_with('\n') {
            msg.push('\n');
        }
        msg
    }
}

/// One-shot alert sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `notification`, returning `Ok` only on confirmed hand-off.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if delivery failed.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that writes alerts to the log instead of sending mail.
///
/// Used when no mail transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            body = %notification.body,
            "Alert (log only, no mail transport configured)"
        );
        Ok(())
    }
}
