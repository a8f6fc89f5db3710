// gate-acceptor-runner/src/store.rs
// ============================================================================
// Module: Raw Output Stores
// Description: File-backed and in-memory archives of unit event streams.
// Purpose: Keep the complete stdout of every unit, keyed by run and unit.
// Dependencies: gate-acceptor-core
// ============================================================================

//! ## Overview
//! The executor hands each unit's full capture to a [`RawOutputStore`]. The
//! file store moves the capture into one file per key; keys contain `/` and
//! `:` so they are mapped to safe file names before touching the disk.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use gate_acceptor_core::RawOutputStore;
use gate_acceptor_core::StoreError;

use crate::sinks::safe_filename;

// ============================================================================
// SECTION: File Store
// ============================================================================

/// Raw output store writing one file per unit under a directory.
#[derive(Debug, Clone)]
pub struct FileRawOutputStore {
    /// Directory holding one file per key.
    root: PathBuf,
}

impl FileRawOutputStore {
    /// Creates the store, creating `root` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(Self {
            root,
        })
    }

    /// Returns the directory backing the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path used for a key.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", safe_filename(key)))
    }
}

impl RawOutputStore for FileRawOutputStore {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        fs::write(self.path_for(key), bytes).map_err(|err| StoreError::Io(err.to_string()))
    }

    fn store_from_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let target = self.path_for(key);
        if fs::rename(path, &target).is_ok() {
            return Ok(());
        }
        // Renames fail across filesystems; fall back to a copy.
        fs::copy(path, &target)
            .map(|_| ())
            .map_err(|err| StoreError::Io(format!("{}: {err}", path.display())))
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Memory Store
// ============================================================================

/// Raw output store holding bytes in a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryRawOutputStore {
    /// Stored bytes by key.
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryRawOutputStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored keys, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] when the lock is poisoned.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl RawOutputStore for MemoryRawOutputStore {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn store_from_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let bytes = fs::read(path).map_err(|err| StoreError::Io(format!("{}: {err}", path.display())))?;
        self.store(key, &bytes)
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }
}
