// gate-acceptor-runner/src/sinks/memory.rs
// ============================================================================
// Module: Memory Sink
// Description: In-memory result collection per run.
// Purpose: Observe sink traffic in tests and embedders.
// Dependencies: gate-acceptor-core
// ============================================================================

//! ## Overview
//! [`MemorySink`] records results per run ID and remembers which runs were
//! completed, so callers can assert on exactly what the runner delivered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

use gate_acceptor_core::ResultSink;
use gate_acceptor_core::SinkError;
use gate_acceptor_core::TestResult;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Sink that keeps every consumed result, grouped by run.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Results in arrival order, keyed by run ID.
    runs: Mutex<HashMap<String, Vec<TestResult>>>,
    /// Runs that have been completed.
    completed: Mutex<HashSet<String>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the results consumed for a run.
    #[must_use]
    pub fn results(&self, run_id: &str) -> Vec<TestResult> {
        self.runs.lock().map(|runs| runs.get(run_id).cloned().unwrap_or_default()).unwrap_or_default()
    }

    /// Returns true once `complete` was called for the run.
    #[must_use]
    pub fn is_complete(&self, run_id: &str) -> bool {
        self.completed.lock().is_ok_and(|completed| completed.contains(run_id))
    }
}

impl ResultSink for MemorySink {
    fn consume(&self, result: &TestResult, run_id: &str) -> Result<(), SinkError> {
        let mut runs = self.runs.lock().map_err(|err| SinkError::Poisoned(err.to_string()))?;
        runs.entry(run_id.to_string()).or_default().push(result.clone());
        Ok(())
    }

    fn complete(&self, run_id: &str) -> Result<(), SinkError> {
        let mut completed = self.completed.lock().map_err(|err| SinkError::Poisoned(err.to_string()))?;
        completed.insert(run_id.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
