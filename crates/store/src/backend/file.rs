//! File-backed blob store.
//!
//! Each blob lives in `<dir>/<name>.blob`. A flush writes every staged blob to
//! `<name>.blob.tmp`, syncs it, renames it over the live file and then syncs
//! the directory, so a crash leaves either the old or the new content on disk
//! and never a torn mix.
//!
//! Flushed content is cached per handle. A flush that fails part-way may have
//! already renamed some files; this handle keeps serving the previously
//! flushed content until a flush completes, while a freshly opened handle
//! reads whatever the directory holds.

use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use snafu::ResultExt;

use super::{BlobStore, VersionedBlob, decode_blob, encode_blob, validate_name};
use crate::error::{IoSnafu, Result};

/// File extension of committed blob files.
const BLOB_EXTENSION: &str = "blob";

#[derive(Default)]
struct State {
    /// Last flushed content per name. `None` records a name known to be absent.
    durable: HashMap<String, Option<VersionedBlob>>,
    /// Saves not yet flushed.
    pending: HashMap<String, VersionedBlob>,
}

/// File-backed blob store.
///
/// Durability requires a call to [`flush`](BlobStore::flush); staged saves
/// are lost if the process exits first.
pub struct FileStore {
    /// Directory holding the blob files.
    dir: PathBuf,
    state: Mutex<State>,
    #[cfg(test)]
    faults: tests::Faults,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`](crate::StoreError::Io) if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context(IoSnafu { path: dir.clone() })?;
        tracing::debug!(dir = %dir.display(), "Opened blob store");
        Ok(Self {
            dir,
            state: Mutex::new(State::default()),
            #[cfg(test)]
            faults: tests::Faults::default(),
        })
    }

    /// Returns the directory this store writes to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the committed file for `name`.
    pub fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{BLOB_EXTENSION}"))
    }

    /// Returns the number of staged, unflushed blobs.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn read_from_disk(&self, name: &str) -> Result<Option<VersionedBlob>> {
        let path = self.blob_path(name);
        match fs::read(&path) {
            Ok(bytes) => decode_blob(name, &bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(source).context(IoSnafu { path }),
        }
    }

    /// Returns the flushed blob for `name`, reading and caching it on first use.
    fn durable<'a>(&self, state: &'a mut State, name: &str) -> Result<&'a Option<VersionedBlob>> {
        if !state.durable.contains_key(name) {
            let loaded = self.read_from_disk(name)?;
            state.durable.insert(name.to_string(), loaded);
        }
        Ok(state.durable.entry(name.to_string()).or_default())
    }

    fn write_atomically(&self, name: &str, blob: &VersionedBlob) -> Result<()> {
        let path = self.blob_path(name);
        let tmp = self.dir.join(format!("{name}.{BLOB_EXTENSION}.tmp"));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .context(IoSnafu { path: tmp.clone() })?;
        file.write_all(&encode_blob(blob)).context(IoSnafu { path: tmp.clone() })?;
        file.sync_data().context(IoSnafu { path: tmp.clone() })?;
        drop(file);

        fs::rename(&tmp, &path).context(IoSnafu { path: path.clone() })?;
        Ok(())
    }

    fn sync_dir(&self) -> Result<()> {
        #[cfg(test)]
        self.faults.before_dir_sync(&self.dir)?;
        self.sync_dir_inner()
    }

    #[cfg(unix)]
    fn sync_dir_inner(&self) -> Result<()> {
        File::open(&self.dir)
            .and_then(|d| d.sync_all())
            .context(IoSnafu { path: self.dir.clone() })
    }

    #[cfg(not(unix))]
    fn sync_dir_inner(&self) -> Result<()> {
        Ok(())
    }
}

impl BlobStore for FileStore {
    fn load(&self, name: &str) -> Result<Option<VersionedBlob>> {
        validate_name(name)?;
        let mut state = self.state.lock();
        Ok(self.durable(&mut state, name)?.clone())
    }

    fn save(&self, name: &str, data: Vec<u8>) -> Result<u64> {
        validate_name(name)?;
        let mut state = self.state.lock();
        let staged = state.pending.get(name).map(|b| b.version);
        let current = match staged {
            Some(version) => version,
            None => self.durable(&mut state, name)?.as_ref().map_or(0, |b| b.version),
        };
        let version = current + 1;
        state.pending.insert(name.to_string(), VersionedBlob { version, data });
        Ok(version)
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return Ok(());
        }

        // Staged blobs are released only after the directory sync, so a
        // failure anywhere leaves all of them for the next flush.
        for (name, blob) in &state.pending {
            self.write_atomically(name, blob)?;
        }
        self.sync_dir()?;

        let State { durable, pending } = &mut *state;
        for (name, blob) in pending.drain() {
            tracing::debug!(blob = %name, version = blob.version, "Blob flushed");
            durable.insert(name, Some(blob));
        }
        Ok(())
    }

    fn discard_pending(&self) {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            tracing::debug!(count = state.pending.len(), "Discarding staged blobs");
            state.pending.clear();
        }
    }
}
