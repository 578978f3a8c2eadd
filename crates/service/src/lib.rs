//! Clonewatch canary engine.
//!
//! Decides whether a (registration token, origin) pair is new, alerts the
//! owner once per new origin, and keeps the two persisted mappings:
//!
//! - [`KeyRegistry`]: token → owner email (`"keys"` blob)
//! - [`OriginLedger`]: token → origins already alerted (`"origins"` blob)
//!
//! Both are reloaded from a [`clonewatch_store::BlobStore`] on every
//! operation. Alerts go through a [`Notifier`].

#![deny(unsafe_code)]

pub mod error;
pub mod ledger;
pub mod notifier;
pub mod registry;
pub mod response;
pub mod sendmail;
pub mod service;

pub use error::{Parameter, Result, ServiceError};
pub use ledger::{ORIGINS_BLOB, OriginLedger};
pub use notifier::{LogNotifier, Notification, Notifier, NotifyError};
pub use registry::{KEYS_BLOB, KeyRegistry};
pub use response::HitResponse;
pub use sendmail::SendmailNotifier;
pub use service::{CanaryService, HitOutcome, HitReport};
