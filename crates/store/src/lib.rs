//! clonewatch-store: named, versioned blob storage with explicit flush.
//!
//! The service persists two small mappings as whole blobs and reloads them on
//! every request, so the store only needs four operations:
//!
//! - **load**: last flushed blob for a name, `None` if never flushed
//! - **save**: stage a new version in memory
//! - **flush**: make every staged save durable and visible
//! - **discard_pending**: drop staged saves after a failed operation
//!
//! ## Quick Start
//!
//! ```no_run
//! use clonewatch_store::{BlobStore, FileStore};
//!
//! let store = FileStore::open("/var/lib/clonewatch")?;
//! store.save("keys", b"payload".to_vec())?;
//! store.flush()?;
//!
//! let blob = store.load("keys")?.expect("written above");
//! assert_eq!(blob.data, b"payload");
//! # Ok::<(), clonewatch_store::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;

pub use backend::{BlobStore, FileStore, HEADER_SIZE, InMemoryStore, MAGIC, VersionedBlob};
pub use error::{Result, StoreError};
