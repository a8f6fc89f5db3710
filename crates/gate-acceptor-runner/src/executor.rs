// gate-acceptor-runner/src/executor.rs
// ============================================================================
// Module: Process Executor
// Description: Runs one unit as a child process and parses its event stream.
// Purpose: Turn a validator unit into a result with timeout and cancellation.
// Dependencies: gate-acceptor-core, gate-acceptor-config, tokio, tempfile
// ============================================================================

//! ## Overview
//! [`ProcessExecutor`] renders the command template for a unit, spawns the
//! child in the test directory, and streams stdout to a temporary capture
//! file plus a [`TailBuffer`]. The child is killed when its timeout plus a
//! grace period elapses or when the run is cancelled. The capture is parsed
//! with [`EventParser`], exit codes are reconciled with the parsed verdict,
//! and the full capture is archived through the optional [`RawOutputStore`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::future::pending;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use gate_acceptor_config::CommandConfig;
use gate_acceptor_config::DEFAULT_TAIL_BYTES;
use gate_acceptor_config::PACKAGE_PLACEHOLDER;
use gate_acceptor_config::TEST_PLACEHOLDER;
use gate_acceptor_config::TIMEOUT_PLACEHOLDER;
use gate_acceptor_core::EventLog;
use gate_acceptor_core::EventParser;
use gate_acceptor_core::LogEvent;
use gate_acceptor_core::LogLevel;
use gate_acceptor_core::ParseReport;
use gate_acceptor_core::RawOutputStore;
use gate_acceptor_core::TestResult;
use gate_acceptor_core::TestStatus;
use gate_acceptor_core::ValidatorMetadata;
use gate_acceptor_core::format_duration;
use gate_acceptor_core::raw_output_key;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::process::Command;
use tokio::time::sleep;
use tokio::time::timeout;

use crate::signal::CancelSignal;
use crate::signal::cancelled;
use crate::signal::is_cancelled;
use crate::tail::TailBuffer;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Extra time granted past a unit timeout before the child is killed.
pub const KILL_GRACE: Duration = Duration::from_millis(200);
/// Time allowed for output pipes to drain after the child exits.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);
/// Retained stderr bytes per unit.
const STDERR_LIMIT: usize = 64 * 1024;
/// Read chunk size for child pipes.
const READ_CHUNK: usize = 8 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Unit execution failures.
///
/// The display strings are the error texts recorded on [`TestResult::error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The child could not be started.
    #[error("failed to run test: {0}")]
    Spawn(String),
    /// The child exited with code 2.
    #[error("test compilation failed: {0}")]
    CompileFail(String),
    /// The child exited with an unexpected code or signal.
    #[error("test execution failed with exit code {code}: {stderr}")]
    UnexpectedExit {
        /// Exit code, or -1 when terminated by a signal.
        code: i32,
        /// Captured stderr.
        stderr: String,
    },
    /// The child exited with code 1 while its events reported success.
    #[error("test exited with code 1 but reported success")]
    ExitMismatch,
    /// The unit ran past its timeout.
    #[error("test exceeded timeout of {0}")]
    Timeout(String),
    /// The run was cancelled while the unit was pending or running.
    #[error("test cancelled")]
    Cancelled,
    /// A local package path does not exist under the test directory.
    #[error("local package path does not exist: {0}")]
    MissingPackage(String),
}

// ============================================================================
// SECTION: Executor Contract
// ============================================================================

/// Per-unit execution context supplied by the runner.
#[derive(Clone)]
pub struct UnitContext {
    /// Run the unit belongs to.
    pub run_id: String,
    /// Run cancellation signal.
    pub cancel: CancelSignal,
    /// Operational log for the run.
    pub log: Arc<dyn EventLog>,
}

/// Executes a single unit.
///
/// Implementations never fail: every problem becomes a failed [`TestResult`].
#[async_trait]
pub trait UnitExecutor: Send + Sync {
    /// Runs the unit and returns its result.
    async fn execute(&self, metadata: &ValidatorMetadata, context: &UnitContext) -> TestResult;
}


// ============================================================================
// SECTION: Command Template
// ============================================================================

/// Program and argument template rendered per unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    /// Program to execute.
    pub program: String,
    /// Arguments for every unit.
    pub args: Vec<String>,
    /// Arguments appended when the unit names a test function.
    pub test_args: Vec<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self::from_config(&CommandConfig::default())
    }
}

impl CommandTemplate {
    /// Builds a template from runtime configuration.
    #[must_use]
    pub fn from_config(config: &CommandConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            test_args: config.test_args.clone(),
            env: config.env.clone(),
        }
    }

    /// Creates a template from a program and per-unit arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            test_args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Renders the argument list for a unit.
    #[must_use]
    pub fn render(&self, metadata: &ValidatorMetadata) -> Vec<String> {
        let test = if metadata.run_all { None } else { metadata.func_name.as_deref() };
        let timeout = format_duration(metadata.timeout);
        let substitute = |arg: &String| {
            arg.replace(PACKAGE_PLACEHOLDER, &metadata.package)
                .replace(TIMEOUT_PLACEHOLDER, &timeout)
                .replace(TEST_PLACEHOLDER, test.unwrap_or_default())
        };
        let mut rendered: Vec<String> = self.args.iter().map(substitute).collect();
        if test.is_some() {
            rendered.extend(self.test_args.iter().map(substitute));
        }
        rendered
    }
}

// ============================================================================
// SECTION: Process Executor
// ============================================================================

/// Executor settings independent of the command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Working directory for every child.
    pub testdir: PathBuf,
    /// Stdout bytes retained as the result snippet.
    pub tail_bytes: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            testdir: PathBuf::from("."),
            tail_bytes: DEFAULT_TAIL_BYTES,
        }
    }
}

/// Executor spawning one child process per unit.
#[derive(Clone)]
pub struct ProcessExecutor {
    /// Command template.
    template: CommandTemplate,
    /// Working directory and capture limits.
    settings: ExecutorSettings,
    /// Event stream parser.
    parser: EventParser,
    /// Archive for full captures.
    store: Option<Arc<dyn RawOutputStore>>,
}

impl ProcessExecutor {
    /// Creates an executor without a raw output store.
    #[must_use]
    pub fn new(template: CommandTemplate, settings: ExecutorSettings) -> Self {
        Self {
            template,
            settings,
            parser: EventParser::new(),
            store: None,
        }
    }

    /// Attaches a raw output store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RawOutputStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the event parser.
    #[must_use]
    pub const fn with_parser(mut self, parser: EventParser) -> Self {
        self.parser = parser;
        self
    }

    /// Returns the command template.
    #[must_use]
    pub const fn template(&self) -> &CommandTemplate {
        &self.template
    }

    /// Returns the missing local package path, if the unit names one.
    async fn missing_local_package(&self, package: &str) -> Option<PathBuf> {
        if !(package.starts_with("./") || package.starts_with("../")) {
            return None;
        }
        let path = self.settings.testdir.join(package);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => None,
            _ => Some(path),
        }
    }

    /// Builds the child command for a unit.
    fn command(&self, metadata: &ValidatorMetadata) -> Command {
        let mut command = Command::new(&self.template.program);
        command
            .args(self.template.render(metadata))
            .current_dir(&self.settings.testdir)
            .envs(&self.template.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Archives the capture, or a timeout marker when nothing was captured.
    fn archive(
        &self,
        metadata: &ValidatorMetadata,
        capture: &Path,
        captured: u64,
        timed_out: bool,
        context: &UnitContext,
    ) {
        let Some(store) = &self.store else {
            return;
        };
        let key = raw_output_key(&context.run_id, &metadata.id);
        let stored = if captured > 0 {
            store.store_from_file(&key, capture)
        } else if timed_out {
            store.store(&key, timeout_marker(metadata).as_bytes())
        } else {
            return;
        };
        if let Err(err) = stored {
            context.log.emit(
                LogEvent::new(LogLevel::Warn, "raw_store_failed", err.to_string())
                    .with_run(&context.run_id)
                    .with_unit(&metadata.id),
            );
        }
    }
}

#[async_trait]
impl UnitExecutor for ProcessExecutor {
    async fn execute(&self, metadata: &ValidatorMetadata, context: &UnitContext) -> TestResult {
        if let Some(path) = self.missing_local_package(&metadata.package).await {
            let err = ExecError::MissingPackage(path.display().to_string());
            context.log.emit(
                LogEvent::new(LogLevel::Error, "package_missing", err.to_string())
                    .with_run(&context.run_id)
                    .with_unit(&metadata.id),
            );
            return TestResult::failure(metadata.clone(), err.to_string());
        }
        if is_cancelled(&context.cancel) {
            return TestResult::failure(metadata.clone(), ExecError::Cancelled.to_string());
        }

        let capture = match NamedTempFile::new() {
            Ok(capture) => capture,
            Err(err) => {
                return TestResult::failure(metadata.clone(), ExecError::Spawn(err.to_string()).to_string());
            }
        };
        let capture_writer = match capture.as_file().try_clone() {
            Ok(file) => tokio::fs::File::from_std(file),
            Err(err) => {
                return TestResult::failure(metadata.clone(), ExecError::Spawn(err.to_string()).to_string());
            }
        };

        let started = Instant::now();
        let mut child = match self.command(metadata).spawn() {
            Ok(child) => child,
            Err(err) => {
                return TestResult::failure(metadata.clone(), ExecError::Spawn(err.to_string()).to_string());
            }
        };
        context.log.emit(
            LogEvent::new(LogLevel::Info, "unit_started", format!("running {}", metadata.label()))
                .with_run(&context.run_id)
                .with_unit(&metadata.id),
        );

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(pump(stdout, Some(capture_writer), self.settings.tail_bytes))
        });
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(pump(stderr, None, STDERR_LIMIT)));

        let limit = (!metadata.timeout.is_zero()).then(|| metadata.timeout + KILL_GRACE);
        let exit = wait_for_exit(&mut child, limit, context.cancel.clone()).await;
        let duration = started.elapsed();

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        let stderr_text = stderr.as_ref().and_then(|(tail, _)| tail.snippet()).unwrap_or_default();
        let stderr_text = stderr_text.trim().to_string();
        let captured = stdout.as_ref().map_or(0, |(_, bytes)| *bytes);

        let timed_out = !metadata.timeout.is_zero()
            && (duration >= metadata.timeout || matches!(exit, ChildExit::Killed));
        if timed_out {
            context.log.emit(
                LogEvent::new(
                    LogLevel::Warn,
                    "unit_timeout",
                    ExecError::Timeout(format_duration(metadata.timeout)).to_string(),
                )
                .with_run(&context.run_id)
                .with_unit(&metadata.id)
                .with_field("duration_ms", u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
                .with_field("captured_bytes", captured),
            );
        }

        let mut result = match exit {
            ChildExit::Cancelled => {
                let mut result = TestResult::failure(metadata.clone(), ExecError::Cancelled.to_string());
                result.duration = duration;
                result
            }
            _ => {
                let report = self.parse_capture(capture.path(), metadata, timed_out).await;
                if report.malformed_lines > 0 {
                    context.log.emit(
                        LogEvent::new(LogLevel::Warn, "malformed_events", "skipped undecodable event lines")
                            .with_run(&context.run_id)
                            .with_unit(&metadata.id)
                            .with_field("lines", report.malformed_lines),
                    );
                }
                let mut result = report.result;
                if !timed_out {
                    result.duration = duration;
                }
                reconcile_exit(&mut result, &exit, &stderr_text, timed_out);
                result
            }
        };
        if let Some((tail, _)) = &stdout
            && let Some(snippet) = tail.snippet()
        {
            result.stdout = Some(snippet);
        }
        if timed_out {
            result.duration = duration;
        }
        // The file store moves the capture, so archive after parsing.
        self.archive(metadata, capture.path(), captured, timed_out, context);

        context.log.emit(
            LogEvent::new(LogLevel::Info, "unit_finished", format!("{} {}", metadata.label(), result.status.as_str()))
                .with_run(&context.run_id)
                .with_unit(&metadata.id)
                .with_field("status", result.status.as_str())
                .with_field("duration_ms", u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
                .with_field("timed_out", result.timed_out),
        );
        result
    }
}

impl ProcessExecutor {
    /// Parses the capture file off the async runtime.
    async fn parse_capture(&self, path: &Path, metadata: &ValidatorMetadata, timed_out: bool) -> ParseReport {
        let parser = self.parser;
        let path = path.to_path_buf();
        let owned = metadata.clone();
        let window = timed_out.then_some(metadata.timeout);
        let parsed = tokio::task::spawn_blocking(move || {
            File::open(&path).map(|file| parser.parse_with_report(BufReader::new(file), &owned, window))
        })
        .await;
        match parsed {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => unparsed(metadata, &format!("failed to read test output: {err}")),
            Err(err) => unparsed(metadata, &format!("failed to parse test output: {err}")),
        }
    }
}

// ============================================================================
// SECTION: Child Lifecycle
// ============================================================================

/// How the child process ended.
enum ChildExit {
    /// The child exited on its own.
    Exited(ExitStatus),
    /// The child was killed after its deadline.
    Killed,
    /// The child was killed because the run was cancelled.
    Cancelled,
    /// Waiting on the child failed.
    WaitFailed(String),
}

/// Waits for the child, killing it on deadline or cancellation.
async fn wait_for_exit(child: &mut Child, limit: Option<Duration>, cancel: CancelSignal) -> ChildExit {
    let deadline = async {
        match limit {
            Some(limit) => sleep(limit).await,
            None => pending::<()>().await,
        }
    };
    let exit = tokio::select! {
        status = child.wait() => {
            return match status {
                Ok(status) => ChildExit::Exited(status),
                Err(err) => ChildExit::WaitFailed(err.to_string()),
            };
        }
        () = deadline => ChildExit::Killed,
        () = cancelled(cancel) => ChildExit::Cancelled,
    };
    let _ = child.start_kill();
    let _ = child.wait().await;
    exit
}

/// Copies a child pipe into an optional file and a tail buffer.
async fn pump<R>(mut reader: R, mut sink: Option<tokio::fs::File>, capacity: usize) -> (TailBuffer, u64)
where
    R: AsyncRead + Unpin,
{
    let mut tail = TailBuffer::new(capacity);
    let mut total = 0u64;
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        let bytes = &chunk[.. read];
        if let Some(file) = sink.as_mut()
            && file.write_all(bytes).await.is_err()
        {
            sink = None;
        }
        tail.push(bytes);
        total = total.saturating_add(u64::try_from(read).unwrap_or(u64::MAX));
    }
    if let Some(file) = sink.as_mut() {
        let _ = file.flush().await;
    }
    (tail, total)
}

/// Waits for a pump task, giving up after [`DRAIN_GRACE`].
///
/// A grandchild that inherited the pipe can keep it open after the child is
/// killed; the pump is abandoned in that case.
async fn drain(task: Option<tokio::task::JoinHandle<(TailBuffer, u64)>>) -> Option<(TailBuffer, u64)> {
    let mut task = task?;
    match timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(_)) => None,
        Err(_) => {
            task.abort();
            None
        }
    }
}

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Applies exit-code rules on top of the parsed verdict.
///
/// Stderr is appended to any resulting error, including errors that already
/// quote it.
fn reconcile_exit(result: &mut TestResult, exit: &ChildExit, stderr: &str, timed_out: bool) {
    let code = match exit {
        ChildExit::Exited(status) => status.code(),
        ChildExit::Killed | ChildExit::Cancelled => None,
        ChildExit::WaitFailed(err) => {
            result.status = TestStatus::Fail;
            result.error = Some(ExecError::Spawn(err.clone()).to_string());
            return;
        }
    };
    if !timed_out {
        match code {
            Some(0) => {}
            Some(1) => {
                if result.status == TestStatus::Pass {
                    result.status = TestStatus::Fail;
                    result.error = Some(ExecError::ExitMismatch.to_string());
                }
            }
            Some(2) => {
                result.status = TestStatus::Fail;
                result.error = Some(ExecError::CompileFail(stderr.to_string()).to_string());
            }
            other => {
                result.status = TestStatus::Fail;
                result.error = Some(
                    ExecError::UnexpectedExit {
                        code: other.unwrap_or(-1),
                        stderr: stderr.to_string(),
                    }
                    .to_string(),
                );
            }
        }
    }
    if !stderr.is_empty() && result.error.is_some() {
        result.append_error(&format!("stderr: {stderr}"));
    }
}

/// Builds a report for a capture that could not be parsed.
fn unparsed(metadata: &ValidatorMetadata, error: &str) -> ParseReport {
    ParseReport {
        result: TestResult::failure(metadata.clone(), error),
        events: 0,
        malformed_lines: 0,
        read_error: Some(error.to_string()),
    }
}

/// Synthetic event stored when a unit timed out without output.
#[derive(Serialize)]
struct TimeoutMarker<'a> {
    /// Event time.
    #[serde(rename = "Time")]
    time: String,
    /// Always `timeout`.
    #[serde(rename = "Action")]
    action: &'static str,
    /// Unit package.
    #[serde(rename = "Package")]
    package: &'a str,
    /// Unit function, empty for whole-package units.
    #[serde(rename = "Test")]
    test: &'a str,
    /// Human-readable marker text.
    #[serde(rename = "Output")]
    output: String,
}

/// Renders the timeout marker line for a unit.
fn timeout_marker(metadata: &ValidatorMetadata) -> String {
    let marker = TimeoutMarker {
        time: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        action: "timeout",
        package: &metadata.package,
        test: metadata.func_name.as_deref().unwrap_or_default(),
        output: format!(
            "TEST TIMED OUT after {} - no JSON output captured\n",
            format_duration(metadata.timeout)
        ),
    };
    let mut line = serde_json::to_string(&marker).unwrap_or_default();
    line.push('\n');
    line
}
