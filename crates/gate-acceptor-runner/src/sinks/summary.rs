// gate-acceptor-runner/src/sinks/summary.rs
// ============================================================================
// Module: Summary Sink
// Description: Writes the human-readable run summary.
// Purpose: One file per run listing counts, failures, timeouts, and the tree.
// Dependencies: gate-acceptor-core, time
// ============================================================================

//! ## Overview
//! Counts are per unit result: a unit with three failing subtests is one
//! failure. Timed-out subtests add to the timeout count and are listed next
//! to their unit. The result hierarchy is rendered with [`TreeBuilder`] from
//! the buffered results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use gate_acceptor_core::ResultSink;
use gate_acceptor_core::SinkError;
use gate_acceptor_core::TestResult;
use gate_acceptor_core::TestStatus;
use gate_acceptor_core::TreeBuilder;
use gate_acceptor_core::format_duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::SUMMARY_FILE;
use super::ensure_dir;
use super::run_dir;
use super::timed_out_subtests;

// ============================================================================
// SECTION: State
// ============================================================================

/// Per-run counters and buffered results.
#[derive(Debug, Default)]
struct SummaryState {
    /// Passing units.
    passed: usize,
    /// Failing units.
    failed: usize,
    /// Skipped units.
    skipped: usize,
    /// Errored units.
    errored: usize,
    /// Timed-out units and subtests.
    timeouts: usize,
    /// Failure lines in arrival order.
    failed_tests: Vec<String>,
    /// Timed-out names in arrival order.
    timeout_tests: Vec<String>,
    /// Buffered unit results.
    results: Vec<TestResult>,
}

/// Markers appended to names in the failure list.
const FAILURE_MARKERS: [&str; 3] = [" (TIMEOUT)", " (ERROR)", " (SUBTEST TIMEOUT)"];

/// Returns the test name of a failure-list line without its marker.
fn listed_name(line: &str) -> &str {
    FAILURE_MARKERS.iter().find_map(|marker| line.strip_suffix(marker)).unwrap_or(line)
}

impl SummaryState {
    /// Folds one unit result into the counters.
    fn record(&mut self, result: &TestResult) {
        let name = result.metadata.qualified_name();
        if result.timed_out {
            self.timeouts += 1;
        }
        match result.status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Skip => self.skipped += 1,
            TestStatus::Fail => {
                self.failed += 1;
                if result.timed_out {
                    self.failed_tests.push(format!("{name} (TIMEOUT)"));
                    self.timeout_tests.push(name);
                } else {
                    self.failed_tests.push(name);
                }
            }
            TestStatus::Error => {
                self.errored += 1;
                self.failed_tests.push(format!("{name} (ERROR)"));
            }
        }
        for sub_name in timed_out_subtests(result) {
            self.timeouts += 1;
            if !self.failed_tests.iter().any(|line| listed_name(line) == sub_name) {
                self.failed_tests.push(format!("{sub_name} (SUBTEST TIMEOUT)"));
            }
            self.timeout_tests.push(sub_name);
        }
        self.results.push(result.clone());
    }

    /// Sums unit durations.
    fn total_duration(&self) -> Duration {
        self.results.iter().map(|result| result.duration).sum()
    }
}

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Writes `summary.log` into each run directory.
#[derive(Debug)]
pub struct SummarySink {
    /// Root directory holding run directories.
    log_dir: PathBuf,
    /// Network name printed on the tree root.
    network: String,
    /// Buffers keyed by run ID.
    runs: Mutex<HashMap<String, SummaryState>>,
}

impl SummarySink {
    /// Creates a summary sink writing under `log_dir`.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>, network: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            network: network.into(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Renders the summary for a finished run.
    fn render(&self, run_id: &str, state: &SummaryState) -> String {
        let duration = state.total_duration();
        let total = state.passed + state.failed + state.skipped + state.errored;
        let now = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        let mut out = String::new();

        let _ = writeln!(out, "TEST SUMMARY");
        let _ = writeln!(out, "============");
        let _ = writeln!(out, "Run ID: {run_id}");
        let _ = writeln!(out, "Time: {now}");
        let _ = writeln!(out, "Duration: {}\n", format_duration(duration));
        if state.timeouts > 0 {
            let _ = writeln!(out, "⚠️  WARNING: {} TEST(S) TIMED OUT! ⚠️\n", state.timeouts);
        }

        let _ = writeln!(out, "Results:");
        let _ = writeln!(out, "  Total:   {total}");
        let _ = writeln!(out, "  Passed:  {}", state.passed);
        let _ = writeln!(out, "  Failed:  {}", state.failed);
        let _ = writeln!(out, "  Skipped: {}", state.skipped);
        let _ = writeln!(out, "  Errors:  {}", state.errored);
        if state.timeouts > 0 {
            let _ = writeln!(out, "  Timeouts: {}", state.timeouts);
        }
        out.push('\n');

        if !state.timeout_tests.is_empty() {
            let _ = writeln!(out, "TIMED OUT TESTS:");
            let _ = writeln!(out, "================");
            for name in &state.timeout_tests {
                let _ = writeln!(out, "  ⏰ {name}");
            }
            out.push('\n');
        }
        if !state.failed_tests.is_empty() {
            let _ = writeln!(out, "Failed tests:");
            for line in &state.failed_tests {
                let _ = writeln!(out, "  - {line}");
            }
            out.push('\n');
        }

        let tree = TreeBuilder::new().with_duration(duration).build(&state.results, run_id, &self.network);
        let rendered = tree.render_text();
        if !rendered.is_empty() {
            let _ = writeln!(out, "TEST TREE:");
            let _ = writeln!(out, "==========");
            out.push_str(&rendered);
            out.push('\n');
        }

        let _ = writeln!(out, "Full details: see {}", run_dir(&self.log_dir, run_id).display());
        out
    }
}

impl ResultSink for SummarySink {
    fn consume(&self, result: &TestResult, run_id: &str) -> Result<(), SinkError> {
        let mut runs = self.runs.lock().map_err(|err| SinkError::Poisoned(err.to_string()))?;
        runs.entry(run_id.to_string()).or_default().record(result);
        Ok(())
    }

    fn complete(&self, run_id: &str) -> Result<(), SinkError> {
        let state = {
            let mut runs = self.runs.lock().map_err(|err| SinkError::Poisoned(err.to_string()))?;
            runs.remove(run_id).unwrap_or_default()
        };
        let dir = run_dir(&self.log_dir, run_id);
        ensure_dir(&dir)?;
        let path = dir.join(SUMMARY_FILE);
        fs::write(&path, self.render(run_id, &state))
            .map_err(|err| SinkError::Io(format!("{}: {err}", path.display())))
    }

    fn name(&self) -> &'static str {
        "summary"
    }
}
