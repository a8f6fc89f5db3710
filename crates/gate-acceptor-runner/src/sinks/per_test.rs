// gate-acceptor-runner/src/sinks/per_test.rs
// ============================================================================
// Module: Per-Test File Sink
// Description: Writes one log file per unit and per subtest.
// Purpose: Give every failure a self-contained file with its output.
// Dependencies: gate-acceptor-core, serde_json
// ============================================================================

//! ## Overview
//! Files land in `passed/` or `failed/` under the run directory and are named
//! with [`readable_name`]. A path is written at most once per run; a later
//! result mapping to the same path is ignored.
//! Each file holds the error banner for failures, the plain-text output
//! extracted from the event stream, the raw JSON snippet, and a short result
//! summary for passes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use gate_acceptor_core::ResultSink;
use gate_acceptor_core::SinkError;
use gate_acceptor_core::TestEvent;
use gate_acceptor_core::TestResult;
use gate_acceptor_core::format_duration;

use super::FAILED_DIR;
use super::PASSED_DIR;
use super::ensure_dir;
use super::readable_name;
use super::run_dir;

/// Separator line between file sections.
const RULE_WIDTH: usize = 80;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Writes `passed/<name>.log` and `failed/<name>.log` files.
#[derive(Debug)]
pub struct PerTestFileSink {
    /// Root directory holding run directories.
    log_dir: PathBuf,
    /// Paths already written, keyed by run ID.
    written: Mutex<HashMap<String, HashSet<PathBuf>>>,
}

impl PerTestFileSink {
    /// Creates a sink writing under `log_dir`.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            written: Mutex::new(HashMap::new()),
        }
    }

    /// Writes the file for one result unless its path was already written.
    fn write_once(&self, result: &TestResult, run_id: &str) -> Result<(), SinkError> {
        let bucket = if result.status.is_failure() { FAILED_DIR } else { PASSED_DIR };
        let dir = run_dir(&self.log_dir, run_id).join(bucket);
        let path = dir.join(format!("{}.log", readable_name(&result.metadata)));
        {
            let mut written = self.written.lock().map_err(|err| SinkError::Poisoned(err.to_string()))?;
            if !written.entry(run_id.to_string()).or_default().insert(path.clone()) {
                return Ok(());
            }
        }
        ensure_dir(&dir)?;
        fs::write(&path, render(result)).map_err(|err| SinkError::Io(format!("{}: {err}", path.display())))
    }
}

impl ResultSink for PerTestFileSink {
    fn consume(&self, result: &TestResult, run_id: &str) -> Result<(), SinkError> {
        let run = run_dir(&self.log_dir, run_id);
        ensure_dir(&run.join(PASSED_DIR))?;
        ensure_dir(&run.join(FAILED_DIR))?;
        self.write_once(result, run_id)?;
        let mut stack: Vec<&TestResult> = result.sub_tests.values().rev().collect();
        while let Some(sub) = stack.pop() {
            self.write_once(sub, run_id)?;
            stack.extend(sub.sub_tests.values().rev());
        }
        Ok(())
    }

    fn complete(&self, run_id: &str) -> Result<(), SinkError> {
        let mut written = self.written.lock().map_err(|err| SinkError::Poisoned(err.to_string()))?;
        written.remove(run_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "per_test"
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Extracts the `Output` text of every decodable event line.
///
/// Lines that are not events are kept verbatim.
#[must_use]
pub fn plaintext_output(stdout: &str) -> String {
    let mut text = String::new();
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TestEvent>(line) {
            Ok(event) => text.push_str(&event.output),
            Err(_) => {
                text.push_str(line);
                text.push('\n');
            }
        }
    }
    text
}

/// Renders the log file body for one result.
fn render(result: &TestResult) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let failed = result.status.is_failure();
    let error = result.error.as_deref().unwrap_or_default();
    let stdout = result.stdout.as_deref().unwrap_or_default();
    let plaintext = plaintext_output(stdout);
    let mut out = String::new();

    if failed {
        let _ = writeln!(out, "\n{rule}");
        if result.timed_out {
            let _ = writeln!(out, "TIMEOUT ERROR SUMMARY:");
            let _ = writeln!(out, "======================\n");
            let _ = writeln!(out, "This test failed due to timeout!");
            let _ = writeln!(out, "Timeout Duration: {}", format_duration(result.metadata.timeout));
            let _ = writeln!(out, "Error: {error}\n");
        } else {
            let _ = writeln!(out, "ERROR SUMMARY:");
            let _ = writeln!(out, "=============\n");
            if !error.is_empty() {
                let _ = writeln!(out, "{error}\n");
            }
        }
    }

    let _ = writeln!(out, "PLAINTEXT OUTPUT:");
    let _ = writeln!(out, "================\n");
    if result.timed_out {
        let _ = writeln!(out, "*** TIMEOUT ERROR ***");
        let _ = writeln!(out, "{error}");
        let _ = writeln!(out, "*** END TIMEOUT ERROR ***\n");
        if plaintext.is_empty() {
            let _ = writeln!(out, "No output captured before timeout occurred.");
        } else {
            let _ = writeln!(out, "PARTIAL OUTPUT BEFORE TIMEOUT:");
            let _ = writeln!(out, "------------------------------");
            let _ = writeln!(out, "{plaintext}");
        }
    } else if plaintext.is_empty() {
        let _ = writeln!(out, "No output captured.");
    } else {
        let _ = writeln!(out, "{plaintext}");
    }

    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "JSON OUTPUT:");
    let _ = writeln!(out, "============\n");
    if !stdout.is_empty() {
        if result.timed_out {
            let _ = writeln!(out, "PARTIAL JSON OUTPUT (BEFORE TIMEOUT):");
            let _ = writeln!(out, "-------------------------------------");
        }
        let _ = writeln!(out, "{stdout}");
    } else if result.timed_out {
        let _ = writeln!(out, "No JSON output captured before timeout.");
    } else {
        let _ = writeln!(out, "No JSON output available.");
    }

    if !failed {
        let _ = writeln!(out, "\n{rule}");
        let _ = writeln!(out, "RESULT SUMMARY:");
        let _ = writeln!(out, "===============\n");
        let _ = writeln!(out, "Test passed: {}", result.metadata.func_name.as_deref().unwrap_or_default());
        let _ = writeln!(out, "Duration:    {}", format_duration(result.duration));
    }
    out
}
