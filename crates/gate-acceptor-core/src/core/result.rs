// crates/gate-acceptor-core/src/core/result.rs
// ============================================================================
// Module: Gate Acceptor Results
// Description: Validator metadata and per-unit test results.
// Purpose: Carry unit identity and outcome from executor to sinks and tree.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`ValidatorMetadata`] points at one executable unit. Executing it yields
//! exactly one [`TestResult`], which may carry a nested map of subtests
//! reported by the test binary. Subtests are keyed by their full slash-joined
//! name and iterate in sorted order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hierarchy::last_segment;
use crate::core::hierarchy::parse_test_name_hierarchy;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Outcome of a test or subtest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Test passed.
    Pass,
    /// Test failed (including timeouts).
    Fail,
    /// Test was skipped.
    Skip,
    /// Test could not be evaluated.
    Error,
}

impl TestStatus {
    /// Returns the lowercase label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Error => "error",
        }
    }

    /// Returns true for `Fail` and `Error`.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Validator Metadata
// ============================================================================

/// Kind of validator a unit was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorKind {
    /// Single test descriptor.
    Test,
    /// Suite grouping.
    Suite,
    /// Gate grouping.
    Gate,
}

/// Runtime pointer to a single executable unit.
///
/// # Invariants
/// - `id` is unique within one registry snapshot.
/// - `run_all` is true exactly when `func_name` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorMetadata {
    /// Derived unit identifier.
    pub id: String,
    /// Validator kind.
    pub kind: ValidatorKind,
    /// Owning gate identifier.
    pub gate: String,
    /// Owning suite, if any.
    pub suite: Option<String>,
    /// Package locator interpreted by the executor.
    pub package: String,
    /// Test function name; `None` runs every test in the package.
    pub func_name: Option<String>,
    /// Per-unit timeout; zero disables the timeout.
    pub timeout: Duration,
    /// Whether the unit runs the whole package.
    pub run_all: bool,
}

impl ValidatorMetadata {
    /// Returns the raw-output key (`package::func` or `package`).
    #[must_use]
    pub fn test_key(&self) -> String {
        match &self.func_name {
            Some(func) => format!("{}::{func}", self.package),
            None => self.package.clone(),
        }
    }

    /// Returns the fully qualified name used in summaries (`package.func`).
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.func_name {
            Some(func) => format!("{}.{func}", self.package),
            None => self.package.clone(),
        }
    }

    /// Returns a short label for logs: the function name or the package.
    #[must_use]
    pub fn label(&self) -> &str {
        self.func_name.as_deref().unwrap_or(&self.package)
    }
}

// ============================================================================
// SECTION: Test Result
// ============================================================================

/// Outcome of one executable unit or one of its subtests.
///
/// # Invariants
/// - `timed_out` implies `status == Fail` and `error.is_some()`.
/// - `hierarchy_path` is the split of the subtest's full name (empty for units
///   run in package mode).
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    /// Unit metadata (subtests inherit gate, suite, and package).
    pub metadata: ValidatorMetadata,
    /// Final status.
    pub status: TestStatus,
    /// Error description when failed.
    pub error: Option<String>,
    /// Wall-clock or reported duration.
    pub duration: Duration,
    /// Whether the unit exceeded its timeout.
    pub timed_out: bool,
    /// Bounded stdout snippet.
    pub stdout: Option<String>,
    /// Nested subtests keyed by full test name.
    pub sub_tests: BTreeMap<String, Self>,
    /// Full hierarchy path of the test name.
    pub hierarchy_path: Vec<String>,
}

impl TestResult {
    /// Creates a result with the given status and no subtests.
    #[must_use]
    pub fn new(metadata: ValidatorMetadata, status: TestStatus) -> Self {
        let hierarchy_path = metadata
            .func_name
            .as_deref()
            .map(|name| parse_test_name_hierarchy(name).1)
            .unwrap_or_default();
        Self {
            metadata,
            status,
            error: None,
            duration: Duration::ZERO,
            timed_out: false,
            stdout: None,
            sub_tests: BTreeMap::new(),
            hierarchy_path,
        }
    }

    /// Creates a failed result carrying an error message.
    #[must_use]
    pub fn failure(metadata: ValidatorMetadata, error: impl Into<String>) -> Self {
        let mut result = Self::new(metadata, TestStatus::Fail);
        result.error = Some(error.into());
        result
    }

    /// Returns the nesting depth (0 for top-level tests).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.hierarchy_path.len().saturating_sub(1)
    }

    /// Returns true when this result is nested under another test.
    #[must_use]
    pub fn is_sub_test(&self) -> bool {
        self.depth() > 0
    }

    /// Returns the display name: the last hierarchy segment or the package.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.metadata.func_name.as_deref().map_or(&self.metadata.package, last_segment)
    }

    /// Appends a line to the error message.
    pub fn append_error(&mut self, message: &str) {
        match &mut self.error {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(message);
            }
            None => self.error = Some(message.to_string()),
        }
    }

    /// Marks the result as timed out with the given diagnostic.
    pub fn mark_timed_out(&mut self, diagnostic: &str) {
        self.status = TestStatus::Fail;
        self.timed_out = true;
        self.append_error(diagnostic);
    }

    /// Counts this result plus all nested subtests.
    #[must_use]
    pub fn total_count(&self) -> usize {
        1 + self.sub_tests.values().map(Self::total_count).sum::<usize>()
    }
}
