//! Notifier double that records deliveries and injects failures.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use clonewatch_service::{Notification, Notifier, NotifyError};
use parking_lot::Mutex;
use tokio::sync::Barrier;

/// A [`Notifier`] that records every successful delivery.
///
/// - **Failure injection**: [`fail_next`](Self::fail_next) fails the next `n`
///   sends, [`set_fail_always`](Self::set_fail_always) fails every send.
/// - **Gate**: with [`with_gate`](Self::with_gate), each send waits on a shared
///   barrier before completing, forcing concurrent sends to overlap.
/// - **Delay**: [`with_delay`](Self::with_delay) sleeps inside each send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    attempts: AtomicUsize,
    fail_remaining: AtomicUsize,
    fail_always: AtomicBool,
    gate: Option<Arc<Barrier>>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    /// Creates a notifier that accepts every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send wait on `gate` before completing.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Barrier>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Makes every send sleep for `delay` before completing.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails the next `n` sends.
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Fails every send while `fail` is set.
    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Successfully delivered notifications, in order.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Number of successful deliveries.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Number of send calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        if self.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_failure() {
            return Err(NotifyError::Rejected { reason: "injected failure".to_string() });
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}
