// gate-acceptor-runner/src/sinks/mod.rs
// ============================================================================
// Module: Result Sinks
// Description: Report writers fed by the run collector.
// Purpose: Materialize summaries, per-test logs, and raw event archives.
// Dependencies: gate-acceptor-core
// ============================================================================

//! ## Overview
//! Every sink implements [`ResultSink`] and keys its buffers by run ID, so two
//! overlapping runs never share state. File sinks write under
//! `<log_dir>/testrun-<run_id>/`. [`SinkSet`] fans results out to all sinks
//! and logs, rather than propagates, individual sink failures.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod memory;
pub mod per_test;
pub mod raw_events;
pub mod summary;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use gate_acceptor_core::EventLog;
use gate_acceptor_core::GATELESS_GATE;
use gate_acceptor_core::LogEvent;
use gate_acceptor_core::LogLevel;
use gate_acceptor_core::ResultSink;
use gate_acceptor_core::SinkError;
use gate_acceptor_core::TestResult;
use gate_acceptor_core::ValidatorMetadata;
use gate_acceptor_core::last_segment;

pub use memory::MemorySink;
pub use per_test::PerTestFileSink;
pub use raw_events::RawEventSink;
pub use summary::SummarySink;

// ============================================================================
// SECTION: Layout
// ============================================================================

/// Directory name prefix for one run's output.
pub const RUN_DIR_PREFIX: &str = "testrun-";
/// Summary file name inside a run directory.
pub const SUMMARY_FILE: &str = "summary.log";
/// Raw event archive file name inside a run directory.
pub const RAW_EVENTS_FILE: &str = "raw_go_events.log";
/// Effective configuration snapshot file name inside a run directory.
pub const CONFIG_SNAPSHOT_FILE: &str = "config.json";
/// Operational event log file name inside a run directory.
pub const EVENTS_FILE: &str = "events.log";
/// Subdirectory for passing test logs.
pub const PASSED_DIR: &str = "passed";
/// Subdirectory for failing test logs.
pub const FAILED_DIR: &str = "failed";

/// Returns `<log_dir>/testrun-<run_id>`.
#[must_use]
pub fn run_dir(log_dir: &Path, run_id: &str) -> PathBuf {
    log_dir.join(format!("{RUN_DIR_PREFIX}{run_id}"))
}

/// Creates a directory and its parents, mapping failures to [`SinkError`].
pub(crate) fn ensure_dir(path: &Path) -> Result<(), SinkError> {
    std::fs::create_dir_all(path).map_err(|err| SinkError::Io(format!("{}: {err}", path.display())))
}

// ============================================================================
// SECTION: File Names
// ============================================================================

/// Replaces characters that are unsafe in file names with `_` and drops `...`.
#[must_use]
pub fn safe_filename(name: &str) -> String {
    name.replace("...", "")
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// Returns the readable log file stem for a unit or subtest.
///
/// The stem is `<gate>_<package basename>_<name>`, with `gateless` standing in
/// for an empty gate and `AllTests` for whole-package units.
#[must_use]
pub fn readable_name(metadata: &ValidatorMetadata) -> String {
    let gate = if metadata.gate.is_empty() { GATELESS_GATE } else { metadata.gate.as_str() };
    let package = last_segment(metadata.package.trim_end_matches('/'));
    let name = match metadata.func_name.as_deref() {
        Some(name) if !name.is_empty() => name.replace('/', "_"),
        _ => "AllTests".to_string(),
    };
    safe_filename(&format!("{gate}_{package}_{name}"))
}

// ============================================================================
// SECTION: Timeout Names
// ============================================================================

/// Returns `package.name` for a unit or subtest result.
pub(crate) fn qualified(unit: &ValidatorMetadata, name: &str) -> String {
    format!("{}.{name}", unit.package)
}

/// Collects qualified names of timed-out subtests, depth first.
pub(crate) fn timed_out_subtests(unit: &TestResult) -> Vec<String> {
    let mut names = Vec::new();
    let mut stack: Vec<(&String, &TestResult)> = unit.sub_tests.iter().rev().collect();
    while let Some((name, sub)) = stack.pop() {
        if sub.timed_out {
            names.push(qualified(&unit.metadata, name));
        }
        stack.extend(sub.sub_tests.iter().rev());
    }
    names
}

// ============================================================================
// SECTION: Sink Set
// ============================================================================

/// Fan-out over several sinks; one failing sink never blocks the others.
#[derive(Clone)]
pub struct SinkSet {
    /// Registered sinks in call order.
    sinks: Vec<Arc<dyn ResultSink>>,
    /// Destination for sink failures.
    log: Arc<dyn EventLog>,
}

impl SinkSet {
    /// Creates an empty set that reports failures to `log`.
    #[must_use]
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self {
            sinks: Vec::new(),
            log,
        }
    }

    /// Adds a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Returns the number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true when no sink is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Logs one sink failure.
    fn report(&self, sink: &dyn ResultSink, stage: &'static str, run_id: &str, err: &SinkError) {
        self.log.emit(
            LogEvent::new(LogLevel::Error, "sink_failed", err.to_string())
                .with_run(run_id)
                .with_field("sink", sink.name())
                .with_field("stage", stage),
        );
    }
}

impl ResultSink for SinkSet {
    fn consume(&self, result: &TestResult, run_id: &str) -> Result<(), SinkError> {
        for sink in &self.sinks {
            if let Err(err) = sink.consume(result, run_id) {
                self.report(sink.as_ref(), "consume", run_id, &err);
            }
        }
        Ok(())
    }

    fn complete(&self, run_id: &str) -> Result<(), SinkError> {
        for sink in &self.sinks {
            if let Err(err) = sink.complete(run_id) {
                self.report(sink.as_ref(), "complete", run_id, &err);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sink_set"
    }
}
