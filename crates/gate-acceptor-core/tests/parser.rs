// crates/gate-acceptor-core/tests/parser.rs
// ============================================================================
// Module: Event Parser Tests
// Description: Package mode, single-test mode, nesting, and timeout parsing.
// Purpose: Verify how event streams map onto nested results.
// ============================================================================

//! ## Overview
//! Feeds recorded JSON event streams through `EventParser` and checks the
//! resulting status, errors, durations, and subtest layout.

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

use std::time::Duration;

use gate_acceptor_core::EventParser;
use gate_acceptor_core::TestStatus;
use gate_acceptor_core::ValidatorKind;
use gate_acceptor_core::ValidatorMetadata;
use gate_acceptor_core::unit_id;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn unit(func: Option<&str>) -> ValidatorMetadata {
    ValidatorMetadata {
        id: unit_id("smoke", None, "test/pkg", func),
        kind: ValidatorKind::Test,
        gate: "smoke".to_string(),
        suite: None,
        package: "test/pkg".to_string(),
        func_name: func.map(ToString::to_string),
        timeout: Duration::from_secs(60),
        run_all: func.is_none(),
    }
}

fn line(action: &str, test: &str, extra: &str) -> String {
    format!(
        r#"{{"Time":"2025-09-23T10:00:00Z","Action":"{action}","Package":"test/pkg","Test":"{test}"{extra}}}"#
    )
}

fn output(test: &str, text: &str) -> String {
    line("output", test, &format!(r#","Output":"{text}\n""#))
}

fn stream(lines: &[String]) -> Vec<u8> {
    let mut joined = lines.join("\n");
    joined.push('\n');
    joined.into_bytes()
}

// ============================================================================
// SECTION: Single-Test Mode
// ============================================================================

/// Tests that subtests of the focused function are captured with output.
#[test]
fn single_test_mode_captures_subtests() {
    let input = stream(&[
        line("run", "TestMain", ""),
        output("TestMain", "=== RUN   TestMain"),
        line("run", "TestMain", ""),
        line("run", "TestMain/SubTest1", ""),
        output("TestMain/SubTest1", "    test.go:15: SubTest1 log message"),
        line("pass", "TestMain/SubTest1", r#","Elapsed":0.01"#),
        line("run", "TestMain/SubTest2", ""),
        output("TestMain/SubTest2", "    test.go:20: SubTest2 log message"),
        line("pass", "TestMain/SubTest2", r#","Elapsed":0.01"#),
        line("run", "TestOther", ""),
        line("fail", "TestOther", ""),
        line("pass", "TestMain", r#","Elapsed":0.25"#),
    ]);
    let result = EventParser::new().parse(input.as_slice(), &unit(Some("TestMain")));
    assert_eq!(result.status, TestStatus::Pass);
    assert_eq!(result.duration, Duration::from_millis(250));
    let names: Vec<&String> = result.sub_tests.keys().collect();
    assert_eq!(names, vec!["TestMain/SubTest1", "TestMain/SubTest2"]);
    let first = &result.sub_tests["TestMain/SubTest1"];
    assert_eq!(first.status, TestStatus::Pass);
    assert_eq!(first.hierarchy_path, vec!["TestMain", "SubTest1"]);
    assert_eq!(first.depth(), 1);
    assert_eq!(first.display_name(), "SubTest1");
    assert!(first.stdout.as_deref().unwrap().contains("SubTest1 log message"));
    assert_eq!(first.metadata.id, "smoke::test/pkg::TestMain/SubTest1");
}

/// Tests that a failing subtest fails its passing parent.
#[test]
fn failing_subtest_fails_parent() {
    let input = stream(&[
        line("run", "TestMain", ""),
        line("run", "TestMain/Bad", ""),
        output("TestMain/Bad", "    bad_test.go:9: expected 1 got 2"),
        line("fail", "TestMain/Bad", r#","Elapsed":0.1"#),
        line("pass", "TestMain", r#","Elapsed":0.2"#),
    ]);
    let result = EventParser::new().parse(input.as_slice(), &unit(Some("TestMain")));
    assert_eq!(result.status, TestStatus::Fail);
    let bad = &result.sub_tests["TestMain/Bad"];
    assert_eq!(bad.status, TestStatus::Fail);
    assert!(bad.error.as_deref().unwrap().contains("expected 1 got 2"));
    assert!(result.error.as_deref().unwrap().contains("TestMain/Bad"));
}

/// Tests that a failing unit reports its own trimmed output.
#[test]
fn failing_unit_reports_output() {
    let input = stream(&[
        line("run", "TestMain", ""),
        output("TestMain", "    main_test.go:4: boom"),
        output("TestMain", "--- FAIL: TestMain (0.00s)"),
        line("fail", "TestMain", r#","Elapsed":0"#),
    ]);
    let result = EventParser::new().parse(input.as_slice(), &unit(Some("TestMain")));
    assert_eq!(result.status, TestStatus::Fail);
    assert_eq!(result.error.as_deref(), Some("main_test.go:4: boom\n--- FAIL: TestMain (0.00s)"));
}

/// Tests that the package-level verdict is used when the function never terminates.
#[test]
fn package_verdict_is_fallback_in_single_mode() {
    let input = stream(&[line("start", "", ""), line("run", "TestMain", ""), line("fail", "", "")]);
    let result = EventParser::new().parse(input.as_slice(), &unit(Some("TestMain")));
    assert_eq!(result.status, TestStatus::Fail);
}

/// Tests that a unit that never terminates is an incomplete failure.
#[test]
fn unterminated_unit_is_incomplete() {
    let input = stream(&[line("run", "TestMain", ""), output("TestMain", "working")]);
    let result = EventParser::new().parse(input.as_slice(), &unit(Some("TestMain")));
    assert_eq!(result.status, TestStatus::Fail);
    assert_eq!(result.error.as_deref(), Some("incomplete output"));
}

/// Tests that passing subtests do not rescue a focused function that never finished.
#[test]
fn unfinished_unit_with_passing_subtests_is_incomplete() {
    let input = stream(&[
        line("run", "TestFocus", ""),
        line("run", "TestFocus/a", ""),
        line("pass", "TestFocus/a", ""),
    ]);
    let result = EventParser::new().parse(input.as_slice(), &unit(Some("TestFocus")));
    assert_eq!(result.status, TestStatus::Fail);
    assert_eq!(result.error.as_deref(), Some("incomplete output"));
    assert_eq!(result.sub_tests["TestFocus/a"].status, TestStatus::Pass);
}

/// Tests the time-delta fallback when `Elapsed` is absent.
#[test]
fn duration_falls_back_to_time_delta() {
    let input = stream(&[
        r#"{"Time":"2025-09-23T10:00:00Z","Action":"run","Package":"test/pkg","Test":"TestMain"}"#
            .to_string(),
        r#"{"Time":"2025-09-23T10:00:01.5Z","Action":"pass","Package":"test/pkg","Test":"TestMain"}"#
            .to_string(),
    ]);
    let result = EventParser::new().parse(input.as_slice(), &unit(Some("TestMain")));
    assert_eq!(result.status, TestStatus::Pass);
    assert_eq!(result.duration, Duration::from_millis(1500));
}

// ============================================================================
// SECTION: Package Mode
// ============================================================================

/// Tests that every named test becomes a subtest in package mode.
#[test]
fn package_mode_collects_all_tests() {
    let input = stream(&[
        line("start", "", ""),
        line("run", "TestB", ""),
        line("pass", "TestB", r#","Elapsed":0.5"#),
        line("run", "TestA", ""),
        line("skip", "TestA", r#","Elapsed":0"#),
        output("", "ok  test/pkg 0.75s"),
        line("pass", "", r#","Elapsed":0.75"#),
    ]);
    let result = EventParser::new().parse(input.as_slice(), &unit(None));
    assert_eq!(result.status, TestStatus::Pass);
    assert_eq!(result.duration, Duration::from_millis(750));
    let names: Vec<&String> = result.sub_tests.keys().collect();
    assert_eq!(names, vec!["TestA", "TestB"]);
    assert_eq!(result.sub_tests["TestA"].status, TestStatus::Skip);
    assert_eq!(result.sub_tests["TestB"].duration, Duration::from_millis(500));
}

/// Tests that nested names hang under synthesized parents.
#[test]
fn nested_names_synthesize_missing_parents() {
    let input = stream(&[
        line("run", "TestParent/Sub1/SubSub", ""),
        line("fail", "TestParent/Sub1/SubSub", ""),
        line("fail", "", ""),
    ]);
    let result = EventParser::new().parse(input.as_slice(), &unit(None));
    assert_eq!(result.status, TestStatus::Fail);
    let parent = &result.sub_tests["TestParent"];
    let middle = &parent.sub_tests["TestParent/Sub1"];
    let leaf = &middle.sub_tests["TestParent/Sub1/SubSub"];
    assert_eq!(leaf.hierarchy_path, vec!["TestParent", "Sub1", "SubSub"]);
    assert_eq!(leaf.depth(), 2);
    assert_eq!(middle.status, TestStatus::Fail);
    assert_eq!(parent.status, TestStatus::Fail);
    assert_eq!(result.total_count(), 4);
}

/// Tests that the top-level roll-up decides when no package verdict exists.
#[test]
fn roll_up_without_package_verdict() {
    let input = stream(&[
        line("run", "TestA", ""),
        line("skip", "TestA", ""),
        line("run", "TestB", ""),
        line("skip", "TestB", ""),
    ]);
    let result = EventParser::new().parse(input.as_slice(), &unit(None));
    assert_eq!(result.status, TestStatus::Skip);
}

/// Tests that a started package without a verdict is incomplete.
#[test]
fn unfinished_package_is_incomplete() {
    let input = stream(&[line("start", "", ""), line("run", "TestA", ""), line("pass", "TestA", "")]);
    let result = EventParser::new().parse(input.as_slice(), &unit(None));
    assert_eq!(result.status, TestStatus::Fail);
    assert_eq!(result.error.as_deref(), Some("incomplete output"));
    assert_eq!(result.sub_tests["TestA"].status, TestStatus::Pass);
}

/// Tests that a missing timestamp still counts as a started unit.
#[test]
fn unfinished_unit_without_timestamps_is_incomplete() {
    let input = stream(&[
        r#"{"Action":"run","Package":"test/pkg","Test":"TestFocus"}"#.to_string(),
        r#"{"Action":"run","Package":"test/pkg","Test":"TestFocus/a"}"#.to_string(),
        r#"{"Action":"pass","Package":"test/pkg","Test":"TestFocus/a"}"#.to_string(),
    ]);
    let result = EventParser::new().parse(input.as_slice(), &unit(Some("TestFocus")));
    assert_eq!(result.status, TestStatus::Fail);
    assert_eq!(result.error.as_deref(), Some("incomplete output"));
}

// ============================================================================
// SECTION: Robustness
// ============================================================================

/// Tests that an empty stream fails with a fixed message.
#[test]
fn empty_stream_is_no_test_output() {
    let result = EventParser::new().parse(&b""[..], &unit(Some("TestMain")));
    assert_eq!(result.status, TestStatus::Fail);
    assert_eq!(result.error.as_deref(), Some("no test output"));
}

/// Tests that malformed lines are skipped and counted.
#[test]
fn malformed_lines_are_counted() {
    let mut lines = vec!["not json".to_string(), "{\"Action\":".to_string()];
    lines.push(line("run", "TestMain", ""));
    lines.push("# build output".to_string());
    lines.push(line("pass", "TestMain", ""));
    lines.push(line("bench", "TestMain", ""));
    lines.push(line("frobnicate", "TestMain", ""));
    let report =
        EventParser::new().parse_with_report(stream(&lines).as_slice(), &unit(Some("TestMain")), None);
    assert_eq!(report.malformed_lines, 3);
    assert_eq!(report.events, 4);
    assert_eq!(report.result.status, TestStatus::Pass);
}

/// Tests that captured output is bounded and marked as truncated.
#[test]
fn output_is_bounded() {
    let noisy = "x".repeat(100);
    let input = stream(&[
        line("run", "TestMain/Noisy", ""),
        output("TestMain/Noisy", &noisy),
        output("TestMain/Noisy", &noisy),
        line("fail", "TestMain/Noisy", ""),
        line("fail", "TestMain", ""),
    ]);
    let parser = EventParser::new().with_output_limit(128);
    let result = parser.parse(input.as_slice(), &unit(Some("TestMain")));
    let error = result.sub_tests["TestMain/Noisy"].error.clone().unwrap();
    assert!(error.ends_with("...[output truncated]"));
    assert!(error.len() <= 128 + "\n...[output truncated]".len());
}

// ============================================================================
// SECTION: Timeout Mode
// ============================================================================

/// Tests that timeout mode fails the unit and marks passing subtests.
#[test]
fn timeout_mode_marks_unit_and_subtests() {
    let input = stream(&[
        line("run", "TestMain", ""),
        line("run", "TestMain/Done", ""),
        line("pass", "TestMain/Done", ""),
        line("run", "TestMain/Hung", ""),
        line("run", "TestMain/Skipped", ""),
        line("skip", "TestMain/Skipped", ""),
    ]);
    let result = EventParser::new().parse_with_timeout(
        input.as_slice(),
        &unit(Some("TestMain")),
        Duration::from_millis(100),
    );
    assert_eq!(result.status, TestStatus::Fail);
    assert!(result.timed_out);
    assert!(result.error.as_deref().unwrap().contains("test exceeded timeout of 100ms"));
    for name in ["TestMain/Done", "TestMain/Hung"] {
        let sub = &result.sub_tests[name];
        assert_eq!(sub.status, TestStatus::Fail);
        assert!(sub.timed_out);
        assert_eq!(sub.error.as_deref(), Some("subtest timed out"));
    }
    assert_eq!(result.sub_tests["TestMain/Skipped"].status, TestStatus::Skip);
}

/// Tests that an empty stream still reports the timeout.
#[test]
fn timeout_mode_with_empty_stream() {
    let result =
        EventParser::new().parse_with_timeout(&b""[..], &unit(None), Duration::from_secs(2));
    assert!(result.timed_out);
    assert_eq!(result.status, TestStatus::Fail);
    let error = result.error.unwrap();
    assert!(error.contains("no test output"));
    assert!(error.contains("test exceeded timeout of 2s"));
}
