//! End-to-end behaviour of the canary service over injected collaborators.
//!
//! Every test builds a [`CanaryService`] over a [`FaultyStore`] (or a real
//! [`FileStore`]) and a [`RecordingNotifier`], then checks what was sent,
//! what was persisted, and what the client would see.

// Test code is allowed to use unwrap for simplicity
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use clonewatch_service::{
    CanaryService, HitOutcome, HitReport, HitResponse, KEYS_BLOB, KeyRegistry, ORIGINS_BLOB,
    OriginLedger, Parameter, ServiceError,
};
use clonewatch_store::{BlobStore, FileStore};
use clonewatch_test_utils::{FaultyStore, RecordingNotifier, strategies};
use clonewatch_types::{RegistrationToken, ServiceConfig};
use proptest::prelude::*;
use tokio::sync::Barrier;

type TestService = CanaryService<FaultyStore, RecordingNotifier>;

struct Harness {
    store: Arc<FaultyStore>,
    notifier: Arc<RecordingNotifier>,
    service: TestService,
}

fn harness_with(config: ServiceConfig, notifier: RecordingNotifier) -> Harness {
    let store = Arc::new(FaultyStore::new());
    let notifier = Arc::new(notifier);
    let service = CanaryService::new(Arc::clone(&store), Arc::clone(&notifier), config);
    Harness { store, notifier, service }
}

fn harness() -> Harness {
    harness_with(ServiceConfig::default(), RecordingNotifier::new())
}

fn response(result: Result<HitOutcome, ServiceError>) -> serde_json::Value {
    serde_json::to_value(HitResponse::from(result)).unwrap()
}

// ============================================
// Registration
// ============================================

#[test]
fn test_register_is_deterministic() {
    let h = harness();
    let first = h.service.register("alice@example.com").unwrap();
    let second = h.service.register("alice@example.com").unwrap();
    assert_eq!(first, second);
    assert_eq!(first, RegistrationToken::from_email("alice@example.com"));

    let registry = KeyRegistry::load(&*h.store).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.email(first.as_str()), Some("alice@example.com"));
}

#[test]
fn test_register_distinct_emails_distinct_tokens() {
    let h = harness();
    let alice = h.service.register("alice@example.com").unwrap();
    let bob = h.service.register("bob@example.com").unwrap();
    assert_ne!(alice, bob);
    assert_eq!(KeyRegistry::load(&*h.store).unwrap().len(), 2);
}

#[test]
fn test_register_flushes_durably() {
    let h = harness();
    h.service.register("alice@example.com").unwrap();
    assert!(h.store.inner().durable(KEYS_BLOB).is_some());
    assert_eq!(h.store.inner().pending_count(), 0);
}

#[test]
fn test_register_flush_failure_is_store_unavailable() {
    let h = harness();
    h.store.fail_next_flushes(1);
    let err = h.service.register("alice@example.com").unwrap_err();
    assert!(matches!(err, ServiceError::StoreUnavailable { .. }));
    assert!(err.is_retryable());
    assert!(h.store.inner().durable(KEYS_BLOB).is_none());
    assert_eq!(h.store.inner().pending_count(), 0);
    assert_eq!(h.store.discards(), 1);

    h.service.register("alice@example.com").unwrap();
    assert!(h.store.inner().durable(KEYS_BLOB).is_some());
}

#[tokio::test]
async fn test_hit_after_failed_registration_is_unknown() {
    let h = harness();
    h.store.fail_next_flushes(1);
    let token = RegistrationToken::from_email("alice@example.com");
    h.service.register("alice@example.com").unwrap_err();

    let err = h
        .service
        .report_hit(&HitReport::new(token.as_str(), "https://evil.example"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnknownToken { .. }));
    assert_eq!(h.notifier.attempts(), 0);

    // A later unrelated flush must not resurrect the abandoned registration
    h.service.register("bob@example.com").unwrap();
    let registry = KeyRegistry::load(&*h.store).unwrap();
    assert_eq!(registry.email(token.as_str()), None);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_register_corrupt_registry() {
    let h = harness();
    h.store.inner().save(KEYS_BLOB, vec![0xFF, 0xFF, 0xFF]).unwrap();
    h.store.inner().flush().unwrap();
    let err = h.service.register("alice@example.com").unwrap_err();
    assert!(matches!(err, ServiceError::CorruptState { ref blob, .. } if blob == KEYS_BLOB));
    assert!(!err.is_retryable());
}

// ============================================
// Hit evaluation
// ============================================

#[tokio::test]
async fn test_alice_scenario() {
    let h = harness();
    let token = h.service.register("alice@example.com").unwrap();

    let r = h.service.report_hit(&HitReport::new(token.as_str(), "https://evil.example")).await;
    assert_eq!(r.as_ref().unwrap(), &HitOutcome::Notified);
    assert_eq!(response(r), serde_json::json!({"status": "ok"}));
    assert_eq!(h.notifier.sent_count(), 1);

    let r = h.service.report_hit(&HitReport::new(token.as_str(), "https://evil.example")).await;
    assert_eq!(r.as_ref().unwrap(), &HitOutcome::AlreadySeen);
    assert_eq!(response(r), serde_json::json!({"status": "ok"}));
    assert_eq!(h.notifier.sent_count(), 1);

    let r = h.service.report_hit(&HitReport::new(token.as_str(), "https://other.example")).await;
    assert_eq!(response(r), serde_json::json!({"status": "ok"}));
    assert_eq!(h.notifier.sent_count(), 2);

    let r = h.service.report_hit(&HitReport::new("bogus-token", "https://x.example")).await;
    assert_eq!(
        response(r),
        serde_json::json!({"status": "error", "message": "Invalid key parameter."})
    );
    assert_eq!(h.notifier.attempts(), 2);

    let sent = h.notifier.sent();
    assert!(sent.iter().all(|n| n.to == "alice@example.com"));
    assert!(sent[0].body.contains("https://evil.example"));
    assert!(sent[1].body.contains("https://other.example"));

    let ledger = OriginLedger::load(&*h.store).unwrap();
    let origins: Vec<_> = ledger.origins(token.as_str()).map(|o| o.as_str()).collect();
    assert_eq!(origins, vec!["https://evil.example", "https://other.example"]);
}

#[tokio::test]
async fn test_missing_parameters_touch_nothing() {
    let h = harness();

    let err = h
        .service
        .report_hit(&HitReport { origin: Some("https://x.example".into()), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingParameter { parameter: Parameter::Key }));

    let err = h
        .service
        .report_hit(&HitReport { key: Some("abc".into()), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingParameter { parameter: Parameter::Origin }));

    let err = h.service.report_hit(&HitReport::new("", "https://x.example")).await.unwrap_err();
    assert!(matches!(err, ServiceError::MissingParameter { parameter: Parameter::Key }));

    // Both absent reports the key first
    let err = h.service.report_hit(&HitReport::default()).await.unwrap_err();
    assert_eq!(err.client_message(), "Missing key parameter.");

    assert_eq!(h.store.loads(), 0);
    assert_eq!(h.notifier.attempts(), 0);
}

#[tokio::test]
async fn test_unknown_token_never_notifies() {
    let h = harness();
    h.service.register("alice@example.com").unwrap();
    let err = h.service.report_hit(&HitReport::new("nope", "https://x.example")).await.unwrap_err();
    assert!(matches!(err, ServiceError::UnknownToken { .. }));
    assert!(err.is_client_error());
    assert_eq!(h.notifier.attempts(), 0);
    assert!(h.store.inner().durable(ORIGINS_BLOB).is_none());
}

#[tokio::test]
async fn test_notifier_failure_leaves_origin_unrecorded() {
    let h = harness();
    let token = h.service.register("alice@example.com").unwrap();
    h.notifier.fail_next(1);

    let report = HitReport::new(token.as_str(), "https://evil.example");
    let err = h.service.report_hit(&report).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotificationFailed { .. }));
    assert_eq!(err.client_message(), "Failed to send notification.");
    assert!(!OriginLedger::load(&*h.store).unwrap().contains(token.as_str(), "https://evil.example"));

    // The retry alerts again instead of being suppressed
    let outcome = h.service.report_hit(&report).await.unwrap();
    assert_eq!(outcome, HitOutcome::Notified);
    assert_eq!(h.notifier.attempts(), 2);
    assert_eq!(h.notifier.sent_count(), 1);
    assert!(OriginLedger::load(&*h.store).unwrap().contains(token.as_str(), "https://evil.example"));
}

#[tokio::test]
async fn test_record_flush_failure_after_alert() {
    let h = harness();
    let token = h.service.register("alice@example.com").unwrap();
    h.store.fail_next_flushes(1);

    let err = h
        .service
        .report_hit(&HitReport::new(token.as_str(), "https://evil.example"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::StoreUnavailable { .. }));
    assert_eq!(err.client_message(), "Failed to persist state.");
    // Alert went out; durability did not
    assert_eq!(h.notifier.sent_count(), 1);
    assert!(h.store.inner().durable(ORIGINS_BLOB).is_none());
    assert_eq!(h.store.inner().pending_count(), 0);

    // The origin was never recorded, so the next report alerts again
    let outcome =
        h.service.report_hit(&HitReport::new(token.as_str(), "https://evil.example")).await.unwrap();
    assert_eq!(outcome, HitOutcome::Notified);
    assert_eq!(h.notifier.sent_count(), 2);
}

#[tokio::test]
async fn test_load_failure_is_store_unavailable() {
    let h = harness();
    let token = h.service.register("alice@example.com").unwrap();
    h.store.set_fail_loads(true);
    let err = h
        .service
        .report_hit(&HitReport::new(token.as_str(), "https://evil.example"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::StoreUnavailable { .. }));
    assert_eq!(h.notifier.attempts(), 0);
}

#[tokio::test]
async fn test_corrupt_ledger_is_reported() {
    let h = harness();
    let token = h.service.register("alice@example.com").unwrap();
    h.store.inner().save(ORIGINS_BLOB, vec![0xFF, 0xFF, 0xFF]).unwrap();
    h.store.inner().flush().unwrap();
    let err = h
        .service
        .report_hit(&HitReport::new(token.as_str(), "https://evil.example"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::CorruptState { ref blob, .. } if blob == ORIGINS_BLOB));
    assert_eq!(h.notifier.attempts(), 0);
}

#[tokio::test]
async fn test_markup_stripped_from_notification() {
    let h = harness();
    let token = h.service.register("alice@example.com").unwrap();
    let report = HitReport::new(token.as_str(), "https://evil.example<script>alert(1)</script>")
        .with_user_agent("Mozilla/5.0 <b>bold</b>");
    h.service.report_hit(&report).await.unwrap();

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].body.contains('<'));
    assert!(!sent[0].body.contains("script"));
    assert!(sent[0].body.contains("https://evil.examplealert(1)"));
    assert!(sent[0].body.contains("User agent: Mozilla/5.0 bold"));

    // The raw origin is the dedup key, not the sanitized one
    let ledger = OriginLedger::load(&*h.store).unwrap();
    assert!(ledger.contains(token.as_str(), "https://evil.example<script>alert(1)</script>"));
}

#[tokio::test]
async fn test_user_agent_not_part_of_dedup_key() {
    let h = harness();
    let token = h.service.register("alice@example.com").unwrap();
    let base = HitReport::new(token.as_str(), "https://evil.example");
    h.service.report_hit(&base.clone().with_user_agent("curl/8.0")).await.unwrap();
    let outcome = h.service.report_hit(&base.with_user_agent("Firefox/130")).await.unwrap();
    assert_eq!(outcome, HitOutcome::AlreadySeen);
    assert_eq!(h.notifier.sent_count(), 1);
}

#[tokio::test]
async fn test_same_origin_different_owners() {
    let h = harness();
    let alice = h.service.register("alice@example.com").unwrap();
    let bob = h.service.register("bob@example.com").unwrap();
    h.service.report_hit(&HitReport::new(alice.as_str(), "https://evil.example")).await.unwrap();
    h.service.report_hit(&HitReport::new(bob.as_str(), "https://evil.example")).await.unwrap();

    let recipients: Vec<_> = h.notifier.sent().into_iter().map(|n| n.to).collect();
    assert_eq!(recipients, vec!["alice@example.com", "bob@example.com"]);
}

#[tokio::test]
async fn test_sender_and_subject_from_config() {
    let config = ServiceConfig::builder()
        .sender("canary@example.org")
        .alert_subject("Clone alert")
        .build()
        .unwrap();
    let h = harness_with(config, RecordingNotifier::new());
    let token = h.service.register("alice@example.com").unwrap();
    h.service.report_hit(&HitReport::new(token.as_str(), "https://evil.example")).await.unwrap();

    let sent = h.notifier.sent();
    assert_eq!(sent[0].from.as_deref(), Some("canary@example.org"));
    assert_eq!(sent[0].subject, "Clone alert");
}

// ============================================
// Persistence
// ============================================

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let token = {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = CanaryService::new(store, Arc::clone(&notifier), ServiceConfig::default());
        let token = service.register("alice@example.com").unwrap();
        service.report_hit(&HitReport::new(token.as_str(), "https://evil.example")).await.unwrap();
        assert_eq!(notifier.sent_count(), 1);
        token
    };

    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let notifier = Arc::new(RecordingNotifier::new());
    let service = CanaryService::new(store, Arc::clone(&notifier), ServiceConfig::default());
    let outcome =
        service.report_hit(&HitReport::new(token.as_str(), "https://evil.example")).await.unwrap();
    assert_eq!(outcome, HitOutcome::AlreadySeen);
    assert_eq!(notifier.attempts(), 0);
}

#[tokio::test]
async fn test_state_is_reloaded_per_operation() {
    // Two services share one store: writes by either are visible to both
    let store = Arc::new(FaultyStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let a = CanaryService::new(Arc::clone(&store), Arc::clone(&notifier), ServiceConfig::default());
    let b = CanaryService::new(Arc::clone(&store), Arc::clone(&notifier), ServiceConfig::default());

    let token = a.register("alice@example.com").unwrap();
    b.report_hit(&HitReport::new(token.as_str(), "https://evil.example")).await.unwrap();
    let outcome =
        a.report_hit(&HitReport::new(token.as_str(), "https://evil.example")).await.unwrap();
    assert_eq!(outcome, HitOutcome::AlreadySeen);
    assert_eq!(notifier.sent_count(), 1);
}

// ============================================
// Concurrency
// ============================================

#[tokio::test]
async fn test_concurrent_first_sightings_race_without_lock() {
    // Both reports pass the membership check before either records
    let notifier = RecordingNotifier::new().with_gate(Arc::new(Barrier::new(2)));
    let h = harness_with(ServiceConfig::default(), notifier);
    let token = h.service.register("alice@example.com").unwrap();
    let report = HitReport::new(token.as_str(), "https://evil.example");

    let (a, b) = tokio::join!(h.service.report_hit(&report), h.service.report_hit(&report));
    assert_eq!(a.unwrap(), HitOutcome::Notified);
    assert_eq!(b.unwrap(), HitOutcome::Notified);
    assert_eq!(h.notifier.sent_count(), 2);

    let ledger = OriginLedger::load(&*h.store).unwrap();
    assert_eq!(ledger.origins(token.as_str()).count(), 1);
}

#[tokio::test]
async fn test_per_token_lock_notifies_once() {
    let config = ServiceConfig::builder().serialize_per_token(true).build().unwrap();
    let notifier = RecordingNotifier::new().with_delay(Duration::from_millis(20));
    let h = harness_with(config, notifier);
    let token = h.service.register("alice@example.com").unwrap();
    let report = HitReport::new(token.as_str(), "https://evil.example");

    let (a, b) = tokio::join!(h.service.report_hit(&report), h.service.report_hit(&report));
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| *o == HitOutcome::AlreadySeen);
    assert_eq!(outcomes, vec![HitOutcome::Notified, HitOutcome::AlreadySeen]);
    assert_eq!(h.notifier.sent_count(), 1);
}

#[tokio::test]
async fn test_per_token_lock_does_not_block_other_tokens() {
    let config = ServiceConfig::builder().serialize_per_token(true).build().unwrap();
    // Two different tokens must reach the notifier together to pass the gate
    let notifier = RecordingNotifier::new().with_gate(Arc::new(Barrier::new(2)));
    let h = harness_with(config, notifier);
    let alice = h.service.register("alice@example.com").unwrap();
    let bob = h.service.register("bob@example.com").unwrap();

    let alice_report = HitReport::new(alice.as_str(), "https://evil.example");
    let bob_report = HitReport::new(bob.as_str(), "https://evil.example");
    let (a, b) =
        tokio::join!(h.service.report_hit(&alice_report), h.service.report_hit(&bob_report));
    assert_eq!(a.unwrap(), HitOutcome::Notified);
    assert_eq!(b.unwrap(), HitOutcome::Notified);
    assert_eq!(h.notifier.sent_count(), 2);
}

#[tokio::test]
async fn test_slow_store_does_not_stall_runtime() {
    // Single-threaded runtime: a timer only fires on time if store I/O is
    // kept off the async worker
    let h = harness();
    let token = h.service.register("alice@example.com").unwrap();
    h.store.set_load_delay(Duration::from_millis(200));

    let started = Instant::now();
    let ticker = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        started.elapsed()
    };
    let report = HitReport::new(token.as_str(), "https://evil.example");
    let (outcome, ticked) = tokio::join!(h.service.report_hit(&report), ticker);

    assert_eq!(outcome.unwrap(), HitOutcome::Notified);
    assert!(ticked < Duration::from_millis(150), "timer delayed by {ticked:?}");
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_origins_all_recorded() {
    let h = harness();
    let token = h.service.register("alice@example.com").unwrap();
    let service = Arc::new(h.service);

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = Arc::clone(&service);
        let key = token.as_str().to_string();
        handles.push(tokio::spawn(async move {
            service.report_hit(&HitReport::new(key, format!("https://clone{i}.example"))).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), HitOutcome::Notified);
    }

    let ledger = OriginLedger::load(&*h.store).unwrap();
    assert_eq!(ledger.origins(token.as_str()).count(), 16);
    assert_eq!(h.notifier.sent_count(), 16);
}

// ============================================
// Properties
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_unregistered_token_always_unknown(origin in strategies::arb_origin()) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let h = harness();
        let err = rt
            .block_on(h.service.report_hit(&HitReport::new("unregistered", origin)))
            .unwrap_err();
        let unknown = matches!(err, ServiceError::UnknownToken { .. });
        prop_assert!(unknown, "expected UnknownToken, got {:?}", err);
        prop_assert_eq!(h.notifier.attempts(), 0);
    }

    #[test]
    fn prop_first_sighting_notifies_exactly_once(
        email in strategies::arb_email(),
        origin in strategies::arb_origin(),
        repeats in 1usize..5,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let h = harness();
        let token = h.service.register(&email).unwrap();
        let report = HitReport::new(token.as_str(), origin);
        prop_assert_eq!(rt.block_on(h.service.report_hit(&report)).unwrap(), HitOutcome::Notified);
        for _ in 0..repeats {
            prop_assert_eq!(
                rt.block_on(h.service.report_hit(&report)).unwrap(),
                HitOutcome::AlreadySeen
            );
        }
        prop_assert_eq!(h.notifier.sent_count(), 1);
    }

    #[test]
    fn prop_markup_never_reaches_notification(origin in strategies::arb_markup_origin()) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let h = harness();
        let token = h.service.register("alice@example.com").unwrap();
        rt.block_on(h.service.report_hit(&HitReport::new(token.as_str(), origin))).unwrap();
        let sent = h.notifier.sent();
        prop_assert!(!sent[0].body.contains('<'));
        prop_assert!(!sent[0].body.contains('>'));
    }
}
