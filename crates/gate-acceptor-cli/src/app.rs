// crates/gate-acceptor-cli/src/app.rs
// ============================================================================
// Module: Application Wiring
// Description: Builds the run pipeline from configuration and drives it.
// Purpose: Connect registry, executor, sinks, runner, and scheduler.
// Dependencies: gate-acceptor-config, gate-acceptor-core, gate-acceptor-runner, tokio
// ============================================================================

//! ## Overview
//! [`App::build`] loads and validates configuration, selects the units to
//! run, and assembles the runner with its report sinks. [`App::execute`]
//! hands the runner to a [`Scheduler`]: a single run returns when it
//! finishes, a periodic schedule runs until Ctrl-C. The process exit code
//! mirrors the most recent run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gate_acceptor_config::GateAcceptorConfig;
use gate_acceptor_core::EventLog;
use gate_acceptor_core::NoopEventLog;
use gate_acceptor_core::Registry;
use gate_acceptor_core::RegistrySettings;
use gate_acceptor_core::ValidatorConfig;
use gate_acceptor_core::ValidatorMetadata;
use gate_acceptor_core::format_duration;
use gate_acceptor_runner::CancelSignal;
use gate_acceptor_runner::CommandTemplate;
use gate_acceptor_runner::ExecutorSettings;
use gate_acceptor_runner::FileRawOutputStore;
use gate_acceptor_runner::PerTestFileSink;
use gate_acceptor_runner::ProcessExecutor;
use gate_acceptor_runner::RawEventSink;
use gate_acceptor_runner::RunOutcome;
use gate_acceptor_runner::RunnerSettings;
use gate_acceptor_runner::ScheduleMode;
use gate_acceptor_runner::ScheduledRun;
use gate_acceptor_runner::Scheduler;
use gate_acceptor_runner::SinkSet;
use gate_acceptor_runner::StderrEventLog;
use gate_acceptor_runner::SummarySink;
use gate_acceptor_runner::TestRunner;
use gate_acceptor_runner::cancel_channel;
use gate_acceptor_runner::sinks::run_dir;
use thiserror::Error;
use tokio::sync::watch;

use crate::args::Cli;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Exit code when every unit passed or nothing ran.
pub const EXIT_PASS: u8 = 0;
/// Exit code when any unit failed or timed out.
pub const EXIT_FAIL: u8 = 1;
/// Exit code for configuration and runtime errors.
pub const EXIT_ERROR: u8 = 2;

/// Time allowed for an in-flight run to drain after Ctrl-C.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// Directory under the log root holding archived unit streams.
const RAW_STORE_DIR: &str = "raw";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures mapped to [`EXIT_ERROR`].
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration or validator document problem.
    #[error("configuration error: {0}")]
    Config(String),
    /// Failure while running or scheduling.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// CLI result alias for fallible operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Loads the TOML config, layers the flags on top, and validates the result.
///
/// # Errors
///
/// Returns [`CliError::Config`] when loading or validation fails.
pub fn resolve_config(cli: &Cli) -> CliResult<GateAcceptorConfig> {
    let mut config =
        GateAcceptorConfig::load(cli.config.as_deref()).map_err(|err| CliError::Config(err.to_string()))?;
    config.apply_overrides(cli.overrides());
    config.validate().map_err(|err| CliError::Config(err.to_string()))?;
    Ok(config)
}

/// Builds the registry and returns the units selected by the gate filter.
///
/// Listed gateless packages take precedence over discovery, which takes
/// precedence over a validator document.
///
/// # Errors
///
/// Returns [`CliError::Config`] when the document is invalid or the
/// selection is empty.
pub fn select_units(config: &GateAcceptorConfig, log: &dyn EventLog) -> CliResult<Vec<ValidatorMetadata>> {
    let settings = RegistrySettings {
        default_timeout: config.runner.default_timeout,
        timeout_override: config.runner.timeout,
        exclude_gates: config.runner.exclude_gates.clone(),
    };
    let registry = match config.runner.validators.as_deref() {
        _ if !config.runner.gateless.is_empty() => Registry::gateless(&config.runner.gateless, &settings),
        Some(path) if !config.is_gateless() => {
            ValidatorConfig::load(path).and_then(|document| Registry::from_config(&document, &settings, log))
        }
        _ => Registry::discover(&config.runner.testdir, &settings, log),
    }
    .map_err(|err| CliError::Config(err.to_string()))?;
    registry.select(&config.runner.gates).map_err(|err| CliError::Config(err.to_string()))
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Fully wired run pipeline.
pub struct App {
    /// Run cadence.
    mode: ScheduleMode,
    /// Scheduled callback holding the runner and the last outcome.
    run: Arc<AcceptanceRun>,
    /// Operational event log.
    log: Arc<dyn EventLog>,
    /// Cancels the in-flight run.
    cancel: watch::Sender<bool>,
    /// Receiver handed to the scheduler.
    signal: CancelSignal,
}

impl App {
    /// Assembles the pipeline from parsed flags.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] when configuration, unit selection, or the raw
    /// output store cannot be set up.
    pub fn build(cli: &Cli) -> CliResult<Self> {
        let config = resolve_config(cli)?;
        let log: Arc<dyn EventLog> = if config.logging.stderr {
            Arc::new(StderrEventLog::new(config.logging.level))
        } else {
            Arc::new(NoopEventLog)
        };
        let units = select_units(&config, log.as_ref())?;

        let log_dir = config.logging.log_dir.clone();
        let store = FileRawOutputStore::new(log_dir.join(RAW_STORE_DIR))
            .map_err(|err| CliError::Runtime(err.to_string()))?;
        let raw_events = Arc::new(RawEventSink::new(&log_dir, Arc::new(store)));
        let executor = ProcessExecutor::new(
            CommandTemplate::from_config(&config.runner.command),
            ExecutorSettings {
                testdir: config.test_root(),
                tail_bytes: config.runner.tail_bytes,
            },
        )
        .with_store(raw_events.clone());
        let sinks = SinkSet::new(Arc::clone(&log))
            .with(Arc::new(SummarySink::new(&log_dir, config.runner.network.clone())))
            .with(Arc::new(PerTestFileSink::new(&log_dir)))
            .with(raw_events);
        let runner =
            TestRunner::new(Arc::new(executor), Arc::new(sinks), Arc::clone(&log), RunnerSettings::from_config(&config));

        let mode = config.periodic_interval().map_or(ScheduleMode::RunOnce, ScheduleMode::Periodic);
        let (cancel, signal) = cancel_channel();
        let run = Arc::new(AcceptanceRun {
            runner,
            units,
            log_dir,
            cancel: signal.clone(),
            last: Mutex::new(None),
        });
        Ok(Self {
            mode,
            run,
            log,
            cancel,
            signal,
        })
    }

    /// Returns the run cadence.
    #[must_use]
    pub const fn mode(&self) -> ScheduleMode {
        self.mode
    }

    /// Runs according to the schedule and returns the process exit code.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Runtime`] when a single run fails outright or the
    /// scheduler cannot shut down in time.
    pub async fn execute(self) -> CliResult<u8> {
        let callback: Arc<dyn ScheduledRun> = self.run.clone();
        let scheduler =
            Scheduler::new(self.mode, callback, Arc::clone(&self.log)).with_cancel(self.signal.clone());
        match self.mode {
            ScheduleMode::RunOnce => {
                let run = scheduler.run_once();
                tokio::pin!(run);
                let result = tokio::select! {
                    result = &mut run => result,
                    Ok(()) = tokio::signal::ctrl_c() => {
                        self.cancel.send_replace(true);
                        run.await
                    }
                };
                result.map_err(|err| CliError::Runtime(err.to_string()))?;
            }
            ScheduleMode::Periodic(_) => {
                scheduler.start().map_err(|err| CliError::Runtime(err.to_string()))?;
                let interrupted = tokio::signal::ctrl_c().await;
                self.cancel.send_replace(true);
                scheduler.stop();
                scheduler
                    .wait_for_shutdown(SHUTDOWN_DEADLINE)
                    .await
                    .map_err(|err| CliError::Runtime(err.to_string()))?;
                interrupted.map_err(|err| CliError::Runtime(format!("failed to wait for Ctrl-C: {err}")))?;
            }
        }
        Ok(self.run.exit_code())
    }
}

// ============================================================================
// SECTION: Scheduled Run
// ============================================================================

/// One acceptance run over a fixed unit list.
struct AcceptanceRun {
    /// Runner shared by every scheduled run.
    runner: TestRunner,
    /// Units selected at startup.
    units: Vec<ValidatorMetadata>,
    /// Root of the run directories.
    log_dir: PathBuf,
    /// Cancellation shared with the scheduler.
    cancel: CancelSignal,
    /// Most recent outcome.
    last: Mutex<Option<RunOutcome>>,
}

impl AcceptanceRun {
    /// Exit code of the most recent run; a pass when nothing has finished.
    fn exit_code(&self) -> u8 {
        self.last
            .lock()
            .ok()
            .and_then(|last| last.as_ref().map(RunOutcome::exit_code))
            .unwrap_or(EXIT_PASS)
    }
}

#[async_trait]
impl ScheduledRun for AcceptanceRun {
    async fn run(&self) -> Result<(), String> {
        let outcome = self.runner.run(&self.units, self.cancel.clone()).await.map_err(|err| err.to_string())?;
        let report = render_outcome(&outcome, Some(&self.log_dir));
        let mut stdout = std::io::stdout();
        write!(stdout, "{report}").map_err(|err| format!("failed to write stdout: {err}"))?;
        if let Ok(mut last) = self.last.lock() {
            *last = Some(outcome);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Reporting
// ============================================================================

/// Renders the end-of-run report printed to stdout.
///
/// The first line carries the status and counts; failed and timed-out units
/// follow, then the run directory when one was written.
#[must_use]
pub fn render_outcome(outcome: &RunOutcome, log_dir: Option<&Path>) -> String {
    let stats = outcome.tree.stats;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "run {} {}: {} tests, {} passed, {} failed, {} skipped, {} errors, {} timeouts in {}",
        outcome.run_id.as_str(),
        outcome.status().as_str().to_uppercase(),
        stats.total,
        stats.passed,
        stats.failed,
        stats.skipped,
        stats.errored,
        stats.timeouts,
        format_duration(outcome.duration),
    );
    for name in outcome.failed_test_names() {
        let _ = writeln!(out, "  FAIL    {name}");
    }
    for name in outcome.timeout_test_names() {
        let _ = writeln!(out, "  TIMEOUT {name}");
    }
    if let Some(log_dir) = log_dir {
        let _ = writeln!(out, "details: {}", run_dir(log_dir, outcome.run_id.as_str()).display());
    }
    out
}
