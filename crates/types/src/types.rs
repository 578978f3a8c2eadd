//! Core type definitions for Clonewatch.
//!
//! - [`RegistrationToken`]: the opaque credential an owner embeds in their page
//! - [`Origin`]: the scheme+host a reporting client claims to be served from

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

use crate::hash::fingerprint_hex;

// ============================================================================
// String Newtypes
// ============================================================================

/// Generates a newtype wrapper around `String` for type-safe identifiers.
///
/// Each generated type provides:
/// - Standard derives: Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord
/// - Serde with `#[serde(transparent)]` so persisted blobs hold plain strings
/// - `Borrow<str>` so map lookups work with client-supplied `&str`
/// - `Display` of the raw value
/// - `new()` constructor, `as_str()` accessor and `into_inner()`
macro_rules! define_name {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw value without validation.
            #[inline]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the raw string value.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper and returns the raw string.
            #[inline]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl Borrow<str> for $name {
            #[inline]
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_name!(
    /// Opaque credential identifying an owner's registration.
    ///
    /// Derived deterministically from the exact email string, so the same
    /// address always yields the same token and differently-cased spellings of
    /// one mailbox yield different tokens. The fingerprint is unkeyed: anyone
    /// who knows an owner's address can compute their token.
    RegistrationToken
);

define_name!(
    /// A scheme+host string reported by a client as the location serving the
    /// owner's content. Only non-emptiness is checked.
    Origin
);

impl RegistrationToken {
    /// Number of characters in a derived token (hex-encoded SHA-256).
    pub const LEN: usize = 64;

    /// Derives the token for an owner email.
    ///
    /// No normalization is applied: `Alice@example.com` and `alice@example.com`
    /// produce different tokens.
    pub fn from_email(email: &str) -> Self {
        Self(fingerprint_hex(email.as_bytes()))
    }

    /// Returns a short prefix suitable for log output.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}
