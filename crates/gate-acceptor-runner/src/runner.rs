// gate-acceptor-runner/src/runner.rs
// ============================================================================
// Module: Parallel Test Runner
// Description: Bounded fan-out of units with ordered result collection.
// Purpose: Execute one run and assemble its outcome, tree, and reports.
// Dependencies: gate-acceptor-core, gate-acceptor-config, tokio, time
// ============================================================================

//! ## Overview
//! A run dispatches units in registry order. Each dispatch waits for a
//! semaphore permit, so at most `concurrency` children are alive. Workers
//! send `(dispatch index, result)` pairs over a bounded channel to a single
//! collector on the caller's task, which feeds the sinks and fills the
//! result slot for that index. The tree is built once the channel drains.
//!
//! Cancellation stops further dispatch; units already running are killed by
//! their executor and report `test cancelled`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use gate_acceptor_config::EffectiveConfigSnapshot;
use gate_acceptor_config::GateAcceptorConfig;
use gate_acceptor_config::MAX_REASONABLE_CONCURRENCY;
use gate_acceptor_core::EventLog;
use gate_acceptor_core::LogEvent;
use gate_acceptor_core::LogLevel;
use gate_acceptor_core::ResultSink;
use gate_acceptor_core::RunId;
use gate_acceptor_core::TestResult;
use gate_acceptor_core::TestStatus;
use gate_acceptor_core::TestTree;
use gate_acceptor_core::TreeBuilder;
use gate_acceptor_core::ValidatorMetadata;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::events::FileEventLog;
use crate::events::TeeEventLog;
use crate::executor::UnitContext;
use crate::executor::UnitExecutor;
use crate::signal::CancelSignal;
use crate::signal::cancelled;
use crate::sinks::CONFIG_SNAPSHOT_FILE;
use crate::sinks::EVENTS_FILE;
use crate::sinks::run_dir;
use crate::sinks::timed_out_subtests;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Run-level failures. Unit failures never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// The run could not be configured.
    #[error("runner config error: {0}")]
    Config(String),
    /// The run directory could not be prepared.
    #[error("runner io error: {0}")]
    Io(String),
    /// The dispatcher task failed.
    #[error("runner task failed: {0}")]
    Join(String),
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Run-wide settings.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Maximum concurrently running units; clamped to `1..=32`.
    pub concurrency: usize,
    /// Network name recorded on the tree.
    pub network: String,
    /// Root for run directories; `None` disables per-run files.
    pub log_dir: Option<PathBuf>,
    /// Minimum level for the per-run `events.log`.
    pub log_level: LogLevel,
    /// Effective configuration written as `config.json`.
    pub snapshot: Option<EffectiveConfigSnapshot>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            network: "local".to_string(),
            log_dir: None,
            log_level: LogLevel::Info,
            snapshot: None,
        }
    }
}

impl RunnerSettings {
    /// Derives settings from a validated runtime configuration.
    #[must_use]
    pub fn from_config(config: &GateAcceptorConfig) -> Self {
        Self {
            concurrency: config.runner.effective_concurrency(),
            network: config.runner.network.clone(),
            log_dir: Some(config.logging.log_dir.clone()),
            log_level: config.logging.level,
            snapshot: Some(EffectiveConfigSnapshot::from_config(config)),
        }
    }

    /// Returns the clamped worker count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.concurrency.clamp(1, MAX_REASONABLE_CONCURRENCY)
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Everything produced by one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Run identifier.
    pub run_id: RunId,
    /// Wall-clock start.
    pub started_at: OffsetDateTime,
    /// Wall-clock end.
    pub finished_at: OffsetDateTime,
    /// Monotonic run duration.
    pub duration: Duration,
    /// Result hierarchy.
    pub tree: TestTree,
    /// Unit results in dispatch order.
    pub results: Vec<TestResult>,
}

impl RunOutcome {
    /// Returns `package.func` for every failed or errored unit.
    #[must_use]
    pub fn failed_test_names(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|result| result.status.is_failure())
            .map(|result| result.metadata.qualified_name())
            .collect()
    }

    /// Returns names of timed-out units and subtests.
    #[must_use]
    pub fn timeout_test_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for result in &self.results {
            if result.timed_out {
                names.push(result.metadata.qualified_name());
            }
            names.extend(timed_out_subtests(result));
        }
        names
    }

    /// Returns the overall status.
    ///
    /// `Skip` when no test ran, `Fail` on any failed or errored unit or leaf,
    /// `Pass` otherwise.
    #[must_use]
    pub fn status(&self) -> TestStatus {
        if self.tree.test_nodes.is_empty() {
            return TestStatus::Skip;
        }
        let stats = self.tree.stats;
        if stats.failed + stats.errored > 0 || self.results.iter().any(|result| result.status.is_failure()) {
            TestStatus::Fail
        } else {
            TestStatus::Pass
        }
    }

    /// Returns the process exit code: 1 on failure, 0 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(self.status() == TestStatus::Fail)
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Executes runs over a shared executor and sink set.
#[derive(Clone)]
pub struct TestRunner {
    /// Unit executor shared by all workers.
    executor: Arc<dyn UnitExecutor>,
    /// Result consumers.
    sinks: Arc<dyn ResultSink>,
    /// Base operational log.
    log: Arc<dyn EventLog>,
    /// Run-wide settings.
    settings: RunnerSettings,
}

impl TestRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        executor: Arc<dyn UnitExecutor>,
        sinks: Arc<dyn ResultSink>,
        log: Arc<dyn EventLog>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            executor,
            sinks,
            log,
            settings,
        }
    }

    /// Returns the runner settings.
    #[must_use]
    pub const fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Runs units under a freshly generated run ID.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] when the run directory cannot be prepared or
    /// the dispatcher fails.
    pub async fn run(&self, units: &[ValidatorMetadata], cancel: CancelSignal) -> Result<RunOutcome, RunnerError> {
        self.run_with_id(RunId::generate(), units, cancel).await
    }

    /// Runs units under the given run ID.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] when the run directory cannot be prepared or
    /// the dispatcher fails.
    pub async fn run_with_id(
        &self,
        run_id: RunId,
        units: &[ValidatorMetadata],
        cancel: CancelSignal,
    ) -> Result<RunOutcome, RunnerError> {
        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();
        let log = self.prepare_run(&run_id)?;
        let workers = self.settings.worker_count();
        log.emit(
            LogEvent::new(LogLevel::Info, "run_started", format!("running {} units", units.len()))
                .with_run(run_id.as_str())
                .with_field("units", units.len())
                .with_field("concurrency", workers),
        );

        let context = UnitContext {
            run_id: run_id.as_str().to_string(),
            cancel,
            log: Arc::clone(&log),
        };
        let (sender, mut receiver) = mpsc::channel::<(usize, TestResult)>(workers * 2);
        let dispatcher = tokio::spawn(dispatch(
            units.to_vec(),
            Arc::clone(&self.executor),
            Arc::new(Semaphore::new(workers)),
            sender,
            context,
        ));

        let mut slots: Vec<Option<TestResult>> = vec![None; units.len()];
        while let Some((index, result)) = receiver.recv().await {
            if let Err(err) = self.sinks.consume(&result, run_id.as_str()) {
                log.emit(
                    LogEvent::new(LogLevel::Error, "sink_failed", err.to_string())
                        .with_run(run_id.as_str())
                        .with_unit(&result.metadata.id)
                        .with_field("sink", self.sinks.name()),
                );
            }
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(result);
            }
        }
        let dispatched = dispatcher.await.map_err(|err| RunnerError::Join(err.to_string()))?;
        if dispatched < units.len() {
            log.emit(
                LogEvent::new(LogLevel::Warn, "dispatch_cancelled", "run cancelled before all units started")
                    .with_run(run_id.as_str())
                    .with_field("skipped", units.len() - dispatched),
            );
        }

        let results: Vec<TestResult> = slots.into_iter().flatten().collect();
        let duration = clock.elapsed();
        let tree = TreeBuilder::new().with_timestamp(started_at).with_duration(duration).build(
            &results,
            run_id.as_str(),
            &self.settings.network,
        );
        if let Err(err) = self.sinks.complete(run_id.as_str()) {
            log.emit(
                LogEvent::new(LogLevel::Error, "sink_failed", err.to_string())
                    .with_run(run_id.as_str())
                    .with_field("sink", self.sinks.name()),
            );
        }

        let outcome = RunOutcome {
            run_id,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            duration,
            tree,
            results,
        };
        log.emit(
            LogEvent::new(LogLevel::Info, "run_finished", format!("run {}", outcome.status().as_str()))
                .with_run(outcome.run_id.as_str())
                .with_field("total", outcome.tree.stats.total)
                .with_field("passed", outcome.tree.stats.passed)
                .with_field("failed", outcome.tree.stats.failed)
                .with_field("timeouts", outcome.tree.stats.timeouts)
                .with_field("duration_ms", u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
        );
        Ok(outcome)
    }

    /// Creates the run directory, writes `config.json`, and opens `events.log`.
    fn prepare_run(&self, run_id: &RunId) -> Result<Arc<dyn EventLog>, RunnerError> {
        let Some(log_dir) = &self.settings.log_dir else {
            return Ok(Arc::clone(&self.log));
        };
        let dir = run_dir(log_dir, run_id.as_str());
        fs::create_dir_all(&dir).map_err(|err| RunnerError::Io(format!("{}: {err}", dir.display())))?;
        if let Some(snapshot) = &self.settings.snapshot {
            let json = snapshot
                .for_run(run_id.as_str())
                .to_json_pretty()
                .map_err(|err| RunnerError::Config(err.to_string()))?;
            let path = dir.join(CONFIG_SNAPSHOT_FILE);
            fs::write(&path, json).map_err(|err| RunnerError::Io(format!("{}: {err}", path.display())))?;
        }
        let path = dir.join(EVENTS_FILE);
        let file = FileEventLog::new(&path, self.settings.log_level)
            .map_err(|err| RunnerError::Io(format!("{}: {err}", path.display())))?;
        Ok(Arc::new(TeeEventLog::new(vec![Arc::clone(&self.log), Arc::new(file)])))
    }
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Dispatches units in order and waits for every worker.
///
/// Returns the number of units dispatched.
async fn dispatch(
    units: Vec<ValidatorMetadata>,
    executor: Arc<dyn UnitExecutor>,
    semaphore: Arc<Semaphore>,
    sender: mpsc::Sender<(usize, TestResult)>,
    context: UnitContext,
) -> usize {
    let mut workers = JoinSet::new();
    let mut dispatched = 0usize;
    for (index, unit) in units.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            () = cancelled(context.cancel.clone()) => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        dispatched += 1;
        let executor = Arc::clone(&executor);
        let sender = sender.clone();
        let context = context.clone();
        workers.spawn(async move {
            let result = executor.execute(&unit, &context).await;
            drop(permit);
            let _ = sender.send((index, result)).await;
        });
    }
    drop(sender);
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            context.log.emit(
                LogEvent::new(LogLevel::Error, "worker_failed", err.to_string()).with_run(&context.run_id),
            );
        }
    }
    dispatched
}
