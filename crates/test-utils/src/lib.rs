//! Shared test utilities for Clonewatch crates.
//!
//! - [`RecordingNotifier`] - Notifier double with delivery log and failure injection
//! - [`FaultyStore`] - In-memory blob store with load/flush fault injection
//! - [`strategies`] - Proptest generators for emails and origins

#![deny(unsafe_code)]

mod notifier;
pub use notifier::RecordingNotifier;

mod store;
pub use store::FaultyStore;

pub mod strategies;
