//! Core types, validation, and hashing for Clonewatch.
//!
//! This crate provides the foundational pieces shared by the store, service and
//! server crates:
//! - Identifier newtypes ([`RegistrationToken`], [`Origin`])
//! - SHA-256 fingerprinting used to derive tokens
//! - Postcard codec for persisted mappings
//! - Input validation and markup sanitization
//! - Service configuration

#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod hash;
pub mod types;
pub mod validation;

// Re-export commonly used types at crate root
pub use codec::{CodecError, decode, encode};
pub use config::{ConfigError, ServiceConfig};
pub use hash::{Hash, fingerprint_hex, sha256};
pub use types::*;
pub use validation::ValidationError;
