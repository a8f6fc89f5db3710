// crates/gate-acceptor-core/src/runtime/parser.rs
// ============================================================================
// Module: Gate Acceptor Event Parser
// Description: Streaming parser for line-delimited JSON test events.
// Purpose: Turn one unit's event stream into a nested `TestResult`.
// Dependencies: crate::core, serde, serde_json, time
// ============================================================================

//! ## Overview
//! Test binaries report progress as one JSON object per line with the fields
//! `Time`, `Action`, `Package`, `Test`, `Elapsed` and `Output`. The parser
//! keeps one entry per test name, moves it through `run -> output* ->
//! pass|fail|skip`, and assembles the entries into the unit result.
//!
//! A unit without a function name runs in package mode: every named test is
//! a subtest and the package-level event (empty `Test`) decides the outcome.
//! A unit with function `F` only looks at events for `F`, for `F/...`, and
//! at package-level terminal events as a fallback.
//!
//! Security posture: event streams come from child processes and are
//! untrusted. Lines that fail to decode are skipped and counted, and every
//! captured output buffer is bounded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::BufRead;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::TestResult;
use crate::core::TestStatus;
use crate::core::ValidatorMetadata;
use crate::core::format_duration;
use crate::core::hierarchy::parent_name;
use crate::core::unit_id;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default cap on captured output per test entry.
pub const DEFAULT_ENTRY_OUTPUT_LIMIT: usize = 64 * 1024;

/// Error used when the stream contains no decodable events.
pub const NO_OUTPUT_ERROR: &str = "no test output";

/// Error used when a test never reports a terminal event.
pub const INCOMPLETE_OUTPUT_ERROR: &str = "incomplete output";

/// Error used for subtests cut short by a unit timeout.
pub const SUBTEST_TIMEOUT_ERROR: &str = "subtest timed out";

/// Marker appended to output that hit the capture limit.
const TRUNCATION_MARKER: &str = "\n...[output truncated]";

// ============================================================================
// SECTION: Events
// ============================================================================

/// Action field of a test event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    /// Test is about to run.
    Run,
    /// Package-level start.
    Start,
    /// Test paused (parallel tests).
    Pause,
    /// Test resumed.
    Cont,
    /// Output line.
    Output,
    /// Test passed.
    Pass,
    /// Test failed.
    Fail,
    /// Test skipped.
    Skip,
    /// Benchmark output.
    Bench,
    /// Any action this parser does not understand.
    #[serde(other)]
    Unknown,
}

/// One decoded line of the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEvent {
    /// RFC 3339 timestamp.
    #[serde(rename = "Time", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Event action.
    #[serde(rename = "Action")]
    pub action: EventAction,
    /// Package the event belongs to.
    #[serde(rename = "Package", default)]
    pub package: String,
    /// Full test name; empty for package-level events.
    #[serde(rename = "Test", default)]
    pub test: String,
    /// Elapsed seconds on terminal events.
    #[serde(rename = "Elapsed", default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    /// Output text for `output` events.
    #[serde(rename = "Output", default)]
    pub output: String,
}

impl TestEvent {
    /// Returns the parsed timestamp, if present and well-formed.
    fn timestamp(&self) -> Option<OffsetDateTime> {
        self.time.as_deref().and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
    }
}

// ============================================================================
// SECTION: Report
// ============================================================================

/// Parse result plus stream diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseReport {
    /// Assembled unit result.
    pub result: TestResult,
    /// Number of events decoded.
    pub events: usize,
    /// Number of non-empty lines that failed to decode.
    pub malformed_lines: usize,
    /// Read error that ended the stream early, if any.
    pub read_error: Option<String>,
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Stateless parser configuration; one parse call owns all per-stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventParser {
    /// Cap on captured output per entry, in bytes.
    output_limit: usize,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser {
    /// Creates a parser with the default output limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            output_limit: DEFAULT_ENTRY_OUTPUT_LIMIT,
        }
    }

    /// Overrides the per-entry output limit.
    #[must_use]
    pub const fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    /// Parses a completed event stream.
    pub fn parse<R: BufRead>(&self, reader: R, metadata: &ValidatorMetadata) -> TestResult {
        self.parse_with_report(reader, metadata, None).result
    }

    /// Parses the stream of a unit that hit its timeout.
    ///
    /// The result is always a timed-out failure; passing or unfinished
    /// subtests are marked as timed out too.
    pub fn parse_with_timeout<R: BufRead>(
        &self,
        reader: R,
        metadata: &ValidatorMetadata,
        timeout: Duration,
    ) -> TestResult {
        self.parse_with_report(reader, metadata, Some(timeout)).result
    }

    /// Parses a stream and returns the result with decode diagnostics.
    pub fn parse_with_report<R: BufRead>(
        &self,
        reader: R,
        metadata: &ValidatorMetadata,
        timeout: Option<Duration>,
    ) -> ParseReport {
        let mut state = StreamState::new(metadata.func_name.clone(), self.output_limit);
        let mut events = 0usize;
        let mut malformed_lines = 0usize;
        let mut read_error = None;

        for line in reader.split(b'\n') {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    read_error = Some(err.to_string());
                    break;
                }
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<TestEvent>(&line) {
                Ok(event) => {
                    events += 1;
                    state.apply(&event);
                }
                Err(_) => malformed_lines += 1,
            }
        }

        let result = if events == 0 {
            let mut result = TestResult::failure(metadata.clone(), NO_OUTPUT_ERROR);
            if let Some(limit) = timeout {
                result.mark_timed_out(&timeout_message(limit));
            }
            result
        } else {
            state.finish(metadata, timeout)
        };
        ParseReport {
            result,
            events,
            malformed_lines,
            read_error,
        }
    }
}

/// Formats the unit-level timeout diagnostic.
fn timeout_message(limit: Duration) -> String {
    format!("test exceeded timeout of {}", format_duration(limit))
}

// ============================================================================
// SECTION: Entry State
// ============================================================================

/// Output buffer that stops growing at a byte limit.
#[derive(Debug, Default)]
struct BoundedText {
    /// Captured text.
    text: String,
    /// Whether anything was dropped.
    truncated: bool,
}

impl BoundedText {
    /// Appends text, keeping the buffer at or under `limit` bytes.
    fn push(&mut self, chunk: &str, limit: usize) {
        if self.truncated {
            return;
        }
        let room = limit.saturating_sub(self.text.len());
        if chunk.len() <= room {
            self.text.push_str(chunk);
            return;
        }
        let mut end = room;
        while !chunk.is_char_boundary(end) {
            end -= 1;
        }
        self.text.push_str(&chunk[..end]);
        self.truncated = true;
    }

    /// Returns the trimmed text with a truncation marker when needed.
    fn rendered(&self) -> Option<String> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut rendered = trimmed.to_string();
        if self.truncated {
            rendered.push_str(TRUNCATION_MARKER);
        }
        Some(rendered)
    }
}

/// Lifecycle state of one test name.
#[derive(Debug, Default)]
struct Entry {
    /// Terminal status, once reported.
    status: Option<TestStatus>,
    /// Set once a `run`/`start` event arrives.
    started: bool,
    /// Timestamp of the `run`/`start` event.
    started_at: Option<OffsetDateTime>,
    /// Reported duration.
    duration: Duration,
    /// Captured output.
    output: BoundedText,
}

impl Entry {
    /// Applies one event to the entry.
    fn apply(&mut self, event: &TestEvent, limit: usize) {
        match event.action {
            EventAction::Run | EventAction::Start => {
                self.started = true;
                self.started_at = event.timestamp();
            }
            EventAction::Output => self.output.push(&event.output, limit),
            EventAction::Pass => self.terminate(TestStatus::Pass, event),
            EventAction::Fail => self.terminate(TestStatus::Fail, event),
            EventAction::Skip => self.terminate(TestStatus::Skip, event),
            EventAction::Pause | EventAction::Cont | EventAction::Bench | EventAction::Unknown => {}
        }
    }

    /// Records a terminal event and its duration.
    fn terminate(&mut self, status: TestStatus, event: &TestEvent) {
        self.status = Some(status);
        let elapsed = event.elapsed.and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        let delta = match (self.started_at, event.timestamp()) {
            (Some(start), Some(end)) => Duration::try_from(end - start).ok(),
            _ => None,
        };
        self.duration = elapsed.or(delta).unwrap_or_default();
    }
}

// ============================================================================
// SECTION: Stream State
// ============================================================================

/// Per-stream parse state.
struct StreamState {
    /// Function the unit focuses on; `None` in package mode.
    focus: Option<String>,
    /// Output cap per entry.
    limit: usize,
    /// Package-level entry (events with an empty `Test`).
    package: Entry,
    /// Focused function entry in single-test mode.
    unit: Entry,
    /// Subtest entries keyed by full test name.
    subtests: BTreeMap<String, Entry>,
}

impl StreamState {
    /// Creates empty state for a unit.
    fn new(focus: Option<String>, limit: usize) -> Self {
        Self {
            focus,
            limit,
            package: Entry::default(),
            unit: Entry::default(),
            subtests: BTreeMap::new(),
        }
    }

    /// Routes one event to the entry it belongs to.
    fn apply(&mut self, event: &TestEvent) {
        let limit = self.limit;
        if event.test.is_empty() {
            self.package.apply(event, limit);
            return;
        }
        match self.focus.as_deref() {
            None => self.subtests.entry(event.test.clone()).or_default().apply(event, limit),
            Some(focus) if event.test == focus => self.unit.apply(event, limit),
            Some(focus) => {
                let nested = event
                    .test
                    .strip_prefix(focus)
                    .is_some_and(|rest| rest.starts_with('/'));
                if nested {
                    self.subtests.entry(event.test.clone()).or_default().apply(event, limit);
                }
            }
        }
    }

    /// Assembles the unit result.
    fn finish(mut self, metadata: &ValidatorMetadata, timeout: Option<Duration>) -> TestResult {
        self.synthesize_parents();
        let timed_out = timeout.is_some();
        let top_parent = self.focus.clone();
        let sub_tests = self.assemble(top_parent.as_deref(), metadata, timed_out);

        let focused = match self.focus {
            Some(_) => &self.unit,
            None => &self.package,
        };
        // Single-test streams fall back to the package-level verdict.
        let terminal = focused.status.or(match self.focus {
            Some(_) => self.package.status,
            None => None,
        });
        let duration = if focused.status.is_some() { focused.duration } else { self.package.duration };
        // A started unit without a verdict never finished, whatever its children did.
        let started = focused.started || self.package.started;

        let mut result = TestResult::new(metadata.clone(), TestStatus::Pass);
        result.duration = duration;
        let rolled_up = roll_up(sub_tests.values().map(|child| child.status));
        result.status = match (terminal, rolled_up) {
            (Some(TestStatus::Pass), Some(TestStatus::Fail)) => TestStatus::Fail,
            (Some(status), _) => status,
            (None, Some(status)) if !started => status,
            (None, _) => TestStatus::Fail,
        };
        if result.status == TestStatus::Fail {
            let output = focused.output.rendered().or_else(|| self.package.output.rendered());
            result.error = match (terminal, output) {
                (None, _) => Some(INCOMPLETE_OUTPUT_ERROR.to_string()),
                (Some(_), Some(output)) => Some(output),
                (Some(_), None) => failed_subtest_summary(&sub_tests),
            };
        }
        result.sub_tests = sub_tests;
        if let Some(limit) = timeout {
            result.mark_timed_out(&timeout_message(limit));
        }
        result
    }

    /// Adds empty entries for intermediate parents that never reported.
    fn synthesize_parents(&mut self) {
        let mut missing = BTreeSet::new();
        for name in self.subtests.keys() {
            let mut current = name.as_str();
            while let Some(parent) = parent_name(current) {
                if Some(parent) == self.focus.as_deref() || self.subtests.contains_key(parent) {
                    break;
                }
                missing.insert(parent.to_string());
                current = parent;
            }
        }
        for name in missing {
            self.subtests.insert(name, Entry::default());
        }
    }

    /// Builds the subtests whose parent is `parent` (the unit itself for `None`
    /// in package mode, or the focus function in single-test mode).
    fn assemble(
        &self,
        parent: Option<&str>,
        metadata: &ValidatorMetadata,
        timed_out: bool,
    ) -> BTreeMap<String, TestResult> {
        let mut children = BTreeMap::new();
        for (name, entry) in &self.subtests {
            if parent_name(name) != parent {
                continue;
            }
            let nested = self.assemble(Some(name), metadata, timed_out);
            children.insert(name.clone(), build_subtest(name, entry, nested, metadata, timed_out));
        }
        children
    }
}

/// Builds one subtest result from its entry and already-built children.
fn build_subtest(
    name: &str,
    entry: &Entry,
    children: BTreeMap<String, TestResult>,
    metadata: &ValidatorMetadata,
    timed_out: bool,
) -> TestResult {
    let mut sub_metadata = metadata.clone();
    sub_metadata.id = unit_id(&metadata.gate, metadata.suite.as_deref(), &metadata.package, Some(name));
    sub_metadata.func_name = Some(name.to_string());
    sub_metadata.run_all = false;

    let mut result = TestResult::new(sub_metadata, TestStatus::Pass);
    result.duration = entry.duration;
    result.stdout = entry.output.rendered();
    let rolled_up = roll_up(children.values().map(|child| child.status));
    result.status = match (entry.status, rolled_up) {
        (Some(TestStatus::Pass), Some(TestStatus::Fail)) => TestStatus::Fail,
        (Some(status), _) => status,
        (None, Some(status)) if !entry.started => status,
        (None, _) => TestStatus::Fail,
    };
    result.sub_tests = children;

    if timed_out && (entry.status.is_none() || result.status == TestStatus::Pass) {
        result.status = TestStatus::Fail;
        result.timed_out = true;
        result.error = Some(SUBTEST_TIMEOUT_ERROR.to_string());
    } else if result.status == TestStatus::Fail {
        result.error = match entry.status {
            None if entry.started || result.sub_tests.is_empty() => {
                Some(INCOMPLETE_OUTPUT_ERROR.to_string())
            }
            _ => entry.output.rendered().or_else(|| failed_subtest_summary(&result.sub_tests)),
        };
    }
    result
}

/// Combines child statuses: any failure fails, all skips skip, else pass.
fn roll_up(statuses: impl Iterator<Item = TestStatus>) -> Option<TestStatus> {
    let mut seen = false;
    let mut all_skipped = true;
    for status in statuses {
        seen = true;
        if status.is_failure() {
            return Some(TestStatus::Fail);
        }
        all_skipped &= status == TestStatus::Skip;
    }
    match (seen, all_skipped) {
        (false, _) => None,
        (true, true) => Some(TestStatus::Skip),
        (true, false) => Some(TestStatus::Pass),
    }
}

/// Names the failing children when a failed entry produced no output.
fn failed_subtest_summary(children: &BTreeMap<String, TestResult>) -> Option<String> {
    let failed: Vec<&str> = children
        .iter()
        .filter(|(_, child)| child.status.is_failure())
        .map(|(name, _)| name.as_str())
        .collect();
    if failed.is_empty() {
        return None;
    }
    Some(format!("failed subtests: {}", failed.join(", ")))
}
