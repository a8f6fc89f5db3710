// crates/gate-acceptor-runner/tests/runner.rs
// ============================================================================
// Module: Parallel Runner Tests
// Description: Fan-out, ordering, cancellation, and outcome reporting.
// Purpose: Validate run-level behavior with scripted and real executors.
// ============================================================================

//! ## Overview
//! Most tests drive [`TestRunner`] with a scripted executor whose verdicts
//! and delays are chosen per unit. One test runs a real timed-out child to
//! check the names reported for timeouts.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use gate_acceptor_core::RunId;
use gate_acceptor_core::TestResult;
use gate_acceptor_core::TestStatus;
use gate_acceptor_core::ValidatorKind;
use gate_acceptor_core::ValidatorMetadata;
use gate_acceptor_core::unit_id;
use gate_acceptor_runner::MemoryEventLog;
use gate_acceptor_runner::MemorySink;
use gate_acceptor_runner::RunnerSettings;
use gate_acceptor_runner::SinkSet;
use gate_acceptor_runner::TestRunner;
use gate_acceptor_runner::UnitContext;
use gate_acceptor_runner::UnitExecutor;
use gate_acceptor_runner::cancel_channel;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn unit(package: &str, func: &str) -> ValidatorMetadata {
    ValidatorMetadata {
        id: unit_id("smoke", None, package, Some(func)),
        kind: ValidatorKind::Test,
        gate: "smoke".to_string(),
        suite: None,
        package: package.to_string(),
        func_name: Some(func.to_string()),
        timeout: Duration::from_secs(5),
        run_all: false,
    }
}

/// Executor whose verdict comes from the function name prefix.
///
/// `TestFail*` fails, `TestSlowSub*` passes with a timed-out subtest, and
/// anything else passes. Earlier units sleep longer so completion order is
/// the reverse of dispatch order.
#[derive(Default)]
struct ScriptedExecutor {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl UnitExecutor for ScriptedExecutor {
    async fn execute(&self, metadata: &ValidatorMetadata, _context: &UnitContext) -> TestResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = 60u64.saturating_sub(u64::try_from(call).unwrap() * 10);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let func = metadata.func_name.clone().unwrap_or_default();
        if func.starts_with("TestFail") {
            return TestResult::failure(metadata.clone(), "boom");
        }
        let mut result = TestResult::new(metadata.clone(), TestStatus::Pass);
        if func.starts_with("TestSlowSub") {
            let name = format!("{func}/Slow");
            let mut sub_md = metadata.clone();
            sub_md.func_name = Some(name.clone());
            let mut sub = TestResult::failure(sub_md, "subtest timed out");
            sub.timed_out = true;
            result.status = TestStatus::Fail;
            result.error = Some("subtest failed".to_string());
            result.sub_tests.insert(name, sub);
        }
        result
    }
}

fn runner(executor: Arc<ScriptedExecutor>, sink: Arc<MemorySink>, concurrency: usize) -> TestRunner {
    let log = Arc::new(MemoryEventLog::new());
    TestRunner::new(
        executor,
        Arc::new(SinkSet::new(log.clone()).with(sink)),
        log,
        RunnerSettings {
            concurrency,
            ..RunnerSettings::default()
        },
    )
}

// ============================================================================
// SECTION: Ordering and Reporting
// ============================================================================

/// Tests that results keep dispatch order even when completion is reversed.
#[tokio::test(flavor = "multi_thread")]
async fn results_keep_dispatch_order() {
    let executor = Arc::new(ScriptedExecutor::default());
    let sink = Arc::new(MemorySink::new());
    let units = vec![unit("pkg/a", "TestOne"), unit("pkg/a", "TestTwo"), unit("pkg/b", "TestThree")];
    let (_cancel, signal) = cancel_channel();

    let outcome = runner(executor, sink.clone(), 3)
        .run_with_id(RunId::new("run-order"), &units, signal)
        .await
        .unwrap();

    let order: Vec<_> = outcome.results.iter().map(|result| result.metadata.id.clone()).collect();
    let expected: Vec<_> = units.iter().map(|unit| unit.id.clone()).collect();
    assert_eq!(order, expected);
    let orders: Vec<_> =
        outcome.tree.resolve(&outcome.tree.test_nodes).filter_map(|node| node.execution_order).collect();
    assert!(orders.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(sink.results("run-order").len(), 3);
    assert!(sink.is_complete("run-order"));
    assert_eq!(outcome.status(), TestStatus::Pass);
    assert_eq!(outcome.exit_code(), 0);
}

/// Tests that failed and timed-out names are qualified as `package.func`.
#[tokio::test(flavor = "multi_thread")]
async fn outcome_names_failures_and_timeouts() {
    let executor = Arc::new(ScriptedExecutor::default());
    let units = vec![unit("pkg/a", "TestOk"), unit("pkg/a", "TestFailBad"), unit("pkg/b", "TestSlowSub")];
    let (_cancel, signal) = cancel_channel();

    let outcome = runner(executor, Arc::new(MemorySink::new()), 2).run(&units, signal).await.unwrap();

    assert_eq!(outcome.failed_test_names(), vec!["pkg/a.TestFailBad".to_string(), "pkg/b.TestSlowSub".to_string()]);
    assert_eq!(outcome.timeout_test_names(), vec!["pkg/b.TestSlowSub/Slow".to_string()]);
    assert_eq!(outcome.status(), TestStatus::Fail);
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome.finished_at >= outcome.started_at);
}

/// Tests that no more than `concurrency` units run at once.
#[tokio::test(flavor = "multi_thread")]
async fn concurrency_bounds_in_flight_units() {
    let executor = Arc::new(ScriptedExecutor::default());
    let units: Vec<_> = (0 .. 6).map(|index| unit("pkg/a", &format!("Test{index}"))).collect();
    let (_cancel, signal) = cancel_channel();

    let outcome = runner(executor.clone(), Arc::new(MemorySink::new()), 2).run(&units, signal).await.unwrap();

    assert_eq!(outcome.results.len(), 6);
    assert!(executor.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 6);
}

/// Tests that an empty run is skipped rather than passed.
#[tokio::test(flavor = "multi_thread")]
async fn empty_run_is_skipped() {
    let (_cancel, signal) = cancel_channel();

    let outcome = runner(Arc::new(ScriptedExecutor::default()), Arc::new(MemorySink::new()), 1)
        .run(&[], signal)
        .await
        .unwrap();

    assert_eq!(outcome.status(), TestStatus::Skip);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.tree.stats.total, 0);
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Tests that units are not dispatched after cancellation.
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_run_dispatches_nothing() {
    let executor = Arc::new(ScriptedExecutor::default());
    let sink = Arc::new(MemorySink::new());
    let log = Arc::new(MemoryEventLog::new());
    let runner = TestRunner::new(
        executor.clone(),
        Arc::new(SinkSet::new(log.clone()).with(sink.clone())),
        log.clone(),
        RunnerSettings::default(),
    );
    let (cancel, signal) = cancel_channel();
    cancel.send_replace(true);

    let outcome = runner
        .run_with_id(RunId::new("run-cancel"), &[unit("pkg/a", "TestOne"), unit("pkg/a", "TestTwo")], signal)
        .await
        .unwrap();

    assert!(outcome.results.is_empty());
    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    assert!(sink.is_complete("run-cancel"));
    let skipped = log.events_named("dispatch_cancelled");
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].fields["skipped"], 2);
}

// ============================================================================
// SECTION: Real Processes
// ============================================================================

/// Tests that a real child past its timeout is named in both name lists.
#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn timed_out_child_is_reported_by_name() {
    use gate_acceptor_runner::CommandTemplate;
    use gate_acceptor_runner::ExecutorSettings;
    use gate_acceptor_runner::ProcessExecutor;

    let dir = tempfile::TempDir::new().unwrap();
    let executor = ProcessExecutor::new(
        CommandTemplate::new("sh", vec!["-c".to_string(), "sleep 0.5".to_string()]),
        ExecutorSettings {
            testdir: dir.path().to_path_buf(),
            ..ExecutorSettings::default()
        },
    );
    let mut slow = unit("example/slow", "TestSlow");
    slow.timeout = Duration::from_millis(100);
    let log = Arc::new(MemoryEventLog::new());
    let runner = TestRunner::new(
        Arc::new(executor),
        Arc::new(SinkSet::new(log.clone())),
        log,
        RunnerSettings::default(),
    );
    let (_cancel, signal) = cancel_channel();

    let outcome = runner.run(&[slow], signal).await.unwrap();

    assert_eq!(outcome.failed_test_names(), vec!["example/slow.TestSlow".to_string()]);
    assert_eq!(outcome.timeout_test_names(), vec!["example/slow.TestSlow".to_string()]);
    assert_eq!(outcome.tree.stats.timeouts, 1);
    assert_eq!(outcome.exit_code(), 1);
}
