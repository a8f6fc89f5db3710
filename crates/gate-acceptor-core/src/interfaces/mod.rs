// crates/gate-acceptor-core/src/interfaces/mod.rs
// ============================================================================
// Module: Gate Acceptor Interfaces
// Description: Contracts for result sinks, raw-output stores, and event logs.
// Purpose: Decouple the engine from report writers and logging pipelines.
// Dependencies: crate::core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The engine hands completed results to [`ResultSink`] implementations,
//! archives raw event streams through a [`RawOutputStore`], and reports
//! operational events to an [`EventLog`]. All three must be safe to call from
//! concurrent workers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::TestResult;

// ============================================================================
// SECTION: Result Sink
// ============================================================================

/// Result sink errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem failure while writing output.
    #[error("sink io error: {0}")]
    Io(String),
    /// Internal buffer lock was poisoned.
    #[error("sink state poisoned: {0}")]
    Poisoned(String),
    /// Output could not be serialized.
    #[error("sink serialization error: {0}")]
    Serialize(String),
}

/// Consumer of completed results.
///
/// `consume` is called once per unit result as workers finish; `complete`
/// is called once per run after the last result. Implementations buffer per
/// `run_id` so overlapping runs never share state.
pub trait ResultSink: Send + Sync {
    /// Records one unit result for a run.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the result cannot be buffered or written.
    fn consume(&self, result: &TestResult, run_id: &str) -> Result<(), SinkError>;

    /// Materializes the sink output for a finished run.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when output cannot be written.
    fn complete(&self, run_id: &str) -> Result<(), SinkError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

// ============================================================================
// SECTION: Raw Output Store
// ============================================================================

/// Raw output store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure while copying or writing raw output.
    #[error("raw output io error: {0}")]
    Io(String),
    /// Internal lock was poisoned.
    #[error("raw output store poisoned")]
    Poisoned,
}

/// Returns the archive key for a unit within one run.
///
/// Unit IDs repeat across periodic runs, so keys carry the run ID too.
#[must_use]
pub fn raw_output_key(run_id: &str, unit_id: &str) -> String {
    format!("{run_id}/{unit_id}")
}

/// Archive for the full event stream of each unit, keyed per run and unit
/// (see [`raw_output_key`]).
pub trait RawOutputStore: Send + Sync {
    /// Stores bytes for a unit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the bytes cannot be persisted.
    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Takes over an on-disk capture for a unit.
    ///
    /// File-backed stores move the file into place; the source path may no
    /// longer exist afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the source cannot be read or persisted.
    fn store_from_file(&self, key: &str, path: &Path) -> Result<(), StoreError>;

    /// Returns the stored bytes for a unit, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when stored bytes cannot be read back.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

/// Severity of an operational event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal progress.
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures.
    Error,
}

/// Structured operational event emitted as one JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Severity.
    pub level: LogLevel,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Run identifier when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Unit identifier when the event concerns one unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Additional structured fields.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

impl LogEvent {
    /// Builds an event stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, event: &'static str, message: impl Into<String>) -> Self {
        Self {
            event,
            level,
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis())
                .unwrap_or_default(),
            run_id: None,
            unit: None,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Attaches a run identifier.
    #[must_use]
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Attaches a unit identifier.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attaches a structured field.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Destination for operational events.
pub trait EventLog: Send + Sync {
    /// Records an event.
    fn record(&self, event: &LogEvent);

    /// Returns true when events at `level` would be recorded.
    fn enabled(&self, level: LogLevel) -> bool {
        level >= LogLevel::Info
    }

    /// Records an event when its level is enabled.
    fn emit(&self, event: LogEvent) {
        if self.enabled(event.level) {
            self.record(&event);
        }
    }
}

/// Event log that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventLog;

impl EventLog for NoopEventLog {
    fn record(&self, _event: &LogEvent) {}

    fn enabled(&self, _level: LogLevel) -> bool {
        false
    }
}
