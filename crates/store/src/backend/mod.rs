//! Blob store abstraction.
//!
//! A [`BlobStore`] holds a small number of named, versioned byte blobs. Writes
//! are staged by [`BlobStore::save`] and only become durable once
//! [`BlobStore::flush`] returns `Ok`. Two implementations ship with the crate:
//! [`FileStore`] for production and [`InMemoryStore`] for tests and ephemeral
//! mode.
//!
//! # On-Disk Blob Layout
//!
//! ```text
//! 0        8           16          24           32
//! ┌────────┬───────────┬───────────┬────────────┬───────────────┐
//! │ magic  │ version   │ length    │ checksum   │ payload ...   │
//! │ 8 B    │ u64 LE    │ u64 LE    │ xxh3 u64 LE│ length bytes  │
//! └────────┴───────────┴───────────┴────────────┴───────────────┘
//! ```

mod file;
mod memory;

pub use file::FileStore;
pub use memory::InMemoryStore;

use crate::error::{Result, StoreError};

/// Magic bytes at the start of every blob file.
pub const MAGIC: &[u8; 8] = b"CLWBLOB1";

/// Size of the fixed blob header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Maximum blob name length.
const MAX_NAME_BYTES: usize = 64;

/// A blob together with the version it was saved under.
///
/// Versions start at 1 for the first save of a name and increase by one on
/// every subsequent save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedBlob {
    /// Monotonic per-name version.
    pub version: u64,
    /// Raw payload.
    pub data: Vec<u8>,
}

/// Named, versioned blob storage with explicit durability.
///
/// Readers only ever observe flushed state: a save is invisible to
/// [`load`](Self::load) until a [`flush`](Self::flush) succeeds.
///
/// Implementations are internally synchronized and shared behind `Arc`.
pub trait BlobStore: Send + Sync {
    /// Returns the last flushed blob for `name`, or `None` if never flushed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for a malformed name,
    /// [`StoreError::Corrupted`] if the persisted blob fails verification, or
    /// [`StoreError::Io`] if the read fails.
    fn load(&self, name: &str) -> Result<Option<VersionedBlob>>;

    /// Stages `data` as the next content of `name` and returns its version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for a malformed name.
    fn save(&self, name: &str, data: Vec<u8>) -> Result<u64>;

    /// Makes every staged save durable and visible to `load`.
    ///
    /// On failure the staged saves stay staged: a later `flush` retries
    /// them, or [`discard_pending`](Self::discard_pending) abandons them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Unavailable`] if the data
    /// could not be made durable.
    fn flush(&self) -> Result<()>;

    /// Drops every staged save without making it visible.
    fn discard_pending(&self);
}

/// Checks that `name` is 1-64 bytes of lowercase ASCII letters, digits, `_` or `-`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidName`] otherwise.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_BYTES
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid { Ok(()) } else { Err(StoreError::InvalidName { name: name.to_string() }) }
}

/// Serializes a blob with its header.
pub fn encode_blob(blob: &VersionedBlob) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + blob.data.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&blob.version.to_le_bytes());
    buf.extend_from_slice(&(blob.data.len() as u64).to_le_bytes());
    buf.extend_from_slice(&xxhash_rust::xxh3::xxh3_64(&blob.data).to_le_bytes());
    buf.extend_from_slice(&blob.data);
    buf
}

/// Parses and verifies a serialized blob.
///
/// # Errors
///
/// Returns [`StoreError::Corrupted`] on a short buffer, bad magic, length
/// mismatch, or checksum mismatch.
pub fn decode_blob(name: &str, buf: &[u8]) -> Result<VersionedBlob> {
    let corrupted = |reason: String| StoreError::Corrupted { name: name.to_string(), reason };

    if buf.len() < HEADER_SIZE {
        return Err(corrupted(format!("file is {} bytes, header needs {HEADER_SIZE}", buf.len())));
    }
    if &buf[0..8] != MAGIC {
        return Err(corrupted("invalid magic".to_string()));
    }

    let version = read_u64(&buf[8..16]);
    let len = read_u64(&buf[16..24]);
    let checksum = read_u64(&buf[24..32]);
    let data = &buf[HEADER_SIZE..];

    if data.len() as u64 != len {
        return Err(corrupted(format!("payload is {} bytes, header says {len}", data.len())));
    }
    if xxhash_rust::xxh3::xxh3_64(data) != checksum {
        return Err(corrupted("checksum mismatch".to_string()));
    }

    Ok(VersionedBlob { version, data: data.to_vec() })
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    u64::from_le_bytes(arr)
}
