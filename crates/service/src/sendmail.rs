//! Notifier backed by a sendmail-compatible binary.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use snafu::ResultExt;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::notifier::{
    ExitSnafu, Notification, Notifier, NotifyError, SpawnSnafu, TimedOutSnafu, TransportSnafu,
};

/// Default time allowed for the transport to accept a message.
pub const DEFAULT_SENDMAIL_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers alerts by piping them to `sendmail -t -i`.
///
/// Recipients are taken from the message headers. Delivery counts as
/// successful when the process exits with status zero.
#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    program: PathBuf,
    timeout: Duration,
}

impl SendmailNotifier {
    /// Creates a notifier for the given binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), timeout: DEFAULT_SENDMAIL_TIMEOUT }
    }

    /// Overrides the delivery timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the transport binary.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Notifier for SendmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut child = Command::new(&self.program)
            .arg("-t")
            .arg("-i")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context(SpawnSnafu { program: self.program.display().to_string() })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(notification.to_message().as_bytes()).await.context(TransportSnafu)?;
            stdin.shutdown().await.context(TransportSnafu)?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                TimedOutSnafu { timeout_ms: self.timeout.as_millis() as u64 }.build()
            })?
            .context(TransportSnafu)?;

        if !output.status.success() {
            return ExitSnafu {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .fail();
        }

        tracing::debug!(to = %notification.to, "Alert handed to sendmail");
        Ok(())
    }
}
