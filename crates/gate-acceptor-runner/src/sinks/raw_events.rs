// gate-acceptor-runner/src/sinks/raw_events.rs
// ============================================================================
// Module: Raw Event Sink
// Description: Concatenates archived unit streams into one run file.
// Purpose: Keep the untouched event stream of every unit next to the reports.
// Dependencies: gate-acceptor-core
// ============================================================================

//! ## Overview
//! [`RawEventSink`] is both the executor's [`RawOutputStore`] and a
//! [`ResultSink`]. Captures are kept in the wrapped store; when a unit result
//! arrives its capture is appended to `raw_go_events.log` in the run directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use gate_acceptor_core::RawOutputStore;
use gate_acceptor_core::ResultSink;
use gate_acceptor_core::SinkError;
use gate_acceptor_core::StoreError;
use gate_acceptor_core::TestResult;
use gate_acceptor_core::raw_output_key;

use super::RAW_EVENTS_FILE;
use super::ensure_dir;
use super::run_dir;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Raw output store that also writes `raw_go_events.log` per run.
pub struct RawEventSink {
    /// Root directory holding run directories.
    log_dir: PathBuf,
    /// Backing archive.
    store: Arc<dyn RawOutputStore>,
    /// Serializes appends so unit streams never interleave.
    append_lock: Mutex<()>,
}

impl RawEventSink {
    /// Creates a sink over an existing store.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>, store: Arc<dyn RawOutputStore>) -> Self {
        Self {
            log_dir: log_dir.into(),
            store,
            append_lock: Mutex::new(()),
        }
    }

    /// Returns the raw events file for a run.
    #[must_use]
    pub fn events_file(&self, run_id: &str) -> PathBuf {
        run_dir(&self.log_dir, run_id).join(RAW_EVENTS_FILE)
    }
}

impl RawOutputStore for RawEventSink {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.store.store(key, bytes)
    }

    fn store_from_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        self.store.store_from_file(key, path)
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.load(key)
    }
}

impl ResultSink for RawEventSink {
    fn consume(&self, result: &TestResult, run_id: &str) -> Result<(), SinkError> {
        let key = raw_output_key(run_id, &result.metadata.id);
        let Some(bytes) = self.store.load(&key).map_err(|err| SinkError::Io(err.to_string()))? else {
            return Ok(());
        };
        let dir = run_dir(&self.log_dir, run_id);
        ensure_dir(&dir)?;
        let path = dir.join(RAW_EVENTS_FILE);
        let _guard = self.append_lock.lock().map_err(|err| SinkError::Poisoned(err.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| SinkError::Io(format!("{}: {err}", path.display())))?;
        file.write_all(&bytes).map_err(|err| SinkError::Io(err.to_string()))?;
        if !bytes.ends_with(b"\n") {
            file.write_all(b"\n").map_err(|err| SinkError::Io(err.to_string()))?;
        }
        Ok(())
    }

    fn complete(&self, run_id: &str) -> Result<(), SinkError> {
        let dir = run_dir(&self.log_dir, run_id);
        ensure_dir(&dir)?;
        let path = dir.join(RAW_EVENTS_FILE);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map(|_| ())
            .map_err(|err| SinkError::Io(format!("{}: {err}", path.display())))
    }

    fn name(&self) -> &'static str {
        "raw_events"
    }
}
