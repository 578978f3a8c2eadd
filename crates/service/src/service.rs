//! Canary registration and hit evaluation.
//!
//! [`CanaryService`] owns no long-lived state: each operation reloads the
//! registry and ledger from the injected [`BlobStore`], mutates its private
//! copy, stages it and flushes.
//!
//! ## Hit evaluation
//!
//! ```text
//! params ─► registry lookup ─► ledger membership ─┬─ present ─► Ok(AlreadySeen)
//!                                                 └─ absent  ─► notify ─┬─ err ─► NotificationFailed
//!                                                                       └─ ok  ─► record + flush ─► Ok(Notified)
//! ```
//!
//! The origin is recorded only after the notifier confirms delivery, so a
//! failed send leaves the pair unrecorded and the next identical report
//! notifies again.
//!
//! ## Concurrency
//!
//! Staging and flushing happen under a commit lock that re-reads the blob
//! first, so concurrent writers never drop each other's entries. A save or
//! flush that fails discards everything staged under the lock, so readers
//! never observe an operation that did not complete.
//!
//! Store round trips made from [`CanaryService::report_hit`] run on the
//! blocking pool; the commit lock is only ever taken there. The
//! membership check and the notifier call are *not* covered by that lock:
//! two concurrent first sightings of one (token, origin) pair can both pass
//! the check and both notify. With [`ServiceConfig::serialize_per_token`]
//! enabled, a per-token async lock spans the whole check-notify-record
//! sequence and the duplicate alert cannot happen.

use std::sync::Arc;

use clonewatch_store::{BlobStore, StoreError};
use clonewatch_types::{
    Origin, RegistrationToken, ServiceConfig,
    validation::{require_present, sanitize_markup, truncate_utf8, validate_email},
};
use dashmap::DashMap;
use parking_lot::Mutex;
use snafu::ResultExt;

use crate::{
    error::{
        InvalidEmailSnafu, NotificationFailedSnafu, Parameter, Result, ServiceError,
        UnknownTokenSnafu,
    },
    ledger::OriginLedger,
    notifier::{Notification, Notifier},
    registry::KeyRegistry,
};

/// A single hit report from an embedded client script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitReport {
    /// Registration token the page was set up with.
    pub key: Option<String>,
    /// Origin the page is being served from.
    pub origin: Option<String>,
    /// Optional diagnostic context, typically the reporting user agent.
    pub user_agent: Option<String>,
}

impl HitReport {
    /// Creates a report with both required parameters and no context.
    pub fn new(key: impl Into<String>, origin: impl Into<String>) -> Self {
        Self { key: Some(key.into()), origin: Some(origin.into()), user_agent: None }
    }

    /// Attaches a user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Successful outcome of a hit report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// First sighting: the owner was alerted and the origin recorded.
    Notified,
    /// The origin was already recorded; nothing was sent.
    AlreadySeen,
}

/// Orchestrates registration and hit evaluation over a blob store and a notifier.
pub struct CanaryService<B: BlobStore + ?Sized, N: Notifier + ?Sized> {
    store: Arc<B>,
    notifier: Arc<N>,
    config: ServiceConfig,
    /// Serializes reload-modify-save-flush of either blob.
    commit_lock: Arc<Mutex<()>>,
    /// Per-token locks, populated only for registered tokens and only when
    /// `serialize_per_token` is set.
    token_locks: DashMap<RegistrationToken, Arc<tokio::sync::Mutex<()>>>,
}

impl<B: BlobStore + ?Sized + 'static, N: Notifier + ?Sized> CanaryService<B, N> {
    /// Creates a service over the given collaborators.
    pub fn new(store: Arc<B>, notifier: Arc<N>, config: ServiceConfig) -> Self {
        Self {
            store,
            notifier,
            config,
            commit_lock: Arc::new(Mutex::new(())),
            token_locks: DashMap::new(),
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Registers an owner email and returns the token to embed.
    ///
    /// Registering the same address again returns the same token and keeps
    /// a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidEmail`] if the address fails the syntax
    /// check (nothing is written), or [`ServiceError::StoreUnavailable`] /
    /// [`ServiceError::CorruptState`] if the registry cannot be loaded,
    /// staged or flushed. A failed flush means the registration is not
    /// complete and is not visible to later reports; the caller should retry.
    ///
    /// This call performs blocking store I/O. Async callers should run it on
    /// the blocking pool.
    pub fn register(&self, email: &str) -> Result<RegistrationToken> {
        validate_email(email, &self.config).context(InvalidEmailSnafu)?;
        let token = RegistrationToken::from_email(email);

        let version = {
            let _commit = self.commit_lock.lock();
            commit(&*self.store, |store| {
                let mut registry = KeyRegistry::load(store)?;
                if registry.insert(token.clone(), email).is_some() {
                    tracing::debug!(token = %token.short(), "Registration refreshed");
                }
                registry.save(store)
            })?
        };

        tracing::info!(token = %token.short(), keys_version = version, "Registered owner");
        Ok(token)
    }

    /// Evaluates a hit report, alerting the owner on the first sighting of an origin.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::MissingParameter`] if `key` or `origin` is absent or
    ///   empty; checked before anything is loaded, `key` first.
    /// - [`ServiceError::UnknownToken`] if the key is not registered.
    /// - [`ServiceError::NotificationFailed`] if the notifier fails; the origin
    ///   stays unrecorded.
    /// - [`ServiceError::StoreUnavailable`] / [`ServiceError::CorruptState`] on
    ///   store failures. If the flush after a successful alert fails, the alert
    ///   has been sent but the origin is not recorded, and the next identical
    ///   report alerts again.
    /// - [`ServiceError::Encoding`] if the updated ledger cannot be encoded.
    pub async fn report_hit(&self, report: &HitReport) -> Result<HitOutcome> {
        let key = require_present(Parameter::Key.as_str(), report.key.as_deref())
            .map_err(|_| ServiceError::MissingParameter { parameter: Parameter::Key })?;
        let origin = require_present(Parameter::Origin.as_str(), report.origin.as_deref())
            .map_err(|_| ServiceError::MissingParameter { parameter: Parameter::Origin })?;
        let origin = Origin::new(truncate_utf8(origin, self.config.max_origin_bytes));

        let registry = self.blocking(|store, _| KeyRegistry::load(store)).await?;
        let Some(email) = registry.email(key) else {
            let token = RegistrationToken::new(key);
            tracing::debug!(token = %token.short(), "Hit for unknown token");
            return UnknownTokenSnafu { token: token.short() }.fail();
        };
        let token = RegistrationToken::new(key);

        let token_lock = self.config.serialize_per_token.then(|| self.token_lock(&token));
        let _serialized = match &token_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let ledger = self.blocking(|store, _| OriginLedger::load(store)).await?;
        if ledger.contains(token.as_str(), origin.as_str()) {
            tracing::debug!(token = %token.short(), origin = %origin, "Origin already recorded");
            return Ok(HitOutcome::AlreadySeen);
        }

        let notification = self.render_alert(email, &origin, report.user_agent.as_deref());
        if let Err(e) = self.notifier.send(&notification).await {
            tracing::warn!(
                token = %token.short(),
                origin = %origin,
                error = %e,
                "Alert delivery failed; origin left unrecorded"
            );
            return Err(e).context(NotificationFailedSnafu);
        }

        let (recorded_token, recorded_origin) = (token.clone(), origin.clone());
        let version = self
            .blocking(move |store, commit_lock| {
                let _commit = commit_lock.lock();
                commit(store, |store| {
                    let mut ledger = OriginLedger::load(store)?;
                    ledger.record(recorded_token, recorded_origin);
                    ledger.save(store)
                })
            })
            .await?;
        tracing::info!(
            token = %token.short(),
            origin = %origin,
            origins_version = version,
            "First sighting recorded"
        );
        Ok(HitOutcome::Notified)
    }

    /// Builds the alert for a first sighting.
    ///
    /// Client-supplied values are stripped of markup before they are embedded.
    pub fn render_alert(&self, email: &str, origin: &Origin, user_agent: Option<&str>) -> Notification {
        let sanitized = sanitize_markup(origin.as_str());
        let origin = display_value(&sanitized);
        let mut body = format!(
            "Your page was loaded from an origin that has not reported before.\n\n\
             Origin: {origin}\n"
        );
        if let Some(agent) = user_agent.filter(|ua| !ua.is_empty()) {
            let agent = sanitize_markup(truncate_utf8(agent, self.config.max_context_bytes));
            body.push_str(&format!("User agent: {}\n", display_value(&agent)));
        }
        body.push_str(
            "\nIf you did not deploy your site there, it may have been cloned.\n\
             You will not be alerted about this origin again.\n",
        );

        Notification {
            to: email.to_string(),
            from: self.config.sender.clone(),
            subject: self.config.alert_subject.clone(),
            body,
        }
    }

    /// Runs synchronous store work on the blocking pool.
    ///
    /// The closure receives the store and the commit lock.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&B, &Mutex<()>) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let commit_lock = Arc::clone(&self.commit_lock);
        match tokio::task::spawn_blocking(move || op(&*store, &*commit_lock)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Store task did not complete");
                Err(ServiceError::from_store(StoreError::Unavailable {
                    reason: format!("store task did not complete: {e}"),
                }))
            },
        }
    }

    fn token_lock(&self, token: &RegistrationToken) -> Arc<tokio::sync::Mutex<()>> {
        self.token_locks.entry(token.clone()).or_default().clone()
    }
}

/// Stages with `stage` and flushes. Must be called under the commit lock.
///
/// On any failure the staged saves are discarded, so the store's flushed
/// state is left as it was.
fn commit<B: BlobStore + ?Sized>(store: &B, stage: impl FnOnce(&B) -> Result<u64>) -> Result<u64> {
    let committed =
        stage(store).and_then(|version| store.flush().map(|()| version).map_err(ServiceError::from_store));
    if committed.is_err() {
        store.discard_pending();
    }
    committed
}

fn display_value(value: &str) -> &str {
    if value.is_empty() { "(empty after sanitization)" } else { value }
}
