//! Cryptographic hashing for Clonewatch.
//!
//! Registration tokens are SHA-256 fingerprints of the owner email, encoded as
//! lowercase hex. The hash is unkeyed, so tokens are reproducible by anyone who
//! knows the input.

use sha2::{Digest, Sha256};

/// SHA-256 hash output (32 bytes).
pub type Hash = [u8; 32];

/// Compute SHA-256 hash of arbitrary data.
#[inline]
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the lowercase hex SHA-256 fingerprint of `data`.
pub fn fingerprint_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
