// crates/gate-acceptor-cli/tests/run_command.rs
// ============================================================================
// Module: CLI Run Tests
// Description: Integration tests running the gate-acceptor binary end to end.
// Purpose: Validate exit codes, stdout report, and the run directory.
// Dependencies: gate-acceptor-cli binary, tempfile
// ============================================================================

//! ## Overview
//! A shell script stands in for the test command. It prints canned events for
//! the requested test and exits 1 for tests named `TestFail*`.

#![cfg(unix)]
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

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const FAKE_TEST: &str = r#"pkg="$1"
test="$2"
printf '{"Action":"run","Package":"%s","Test":"%s"}\n' "$pkg" "$test"
printf '{"Action":"output","Package":"%s","Test":"%s","Output":"running %s\\n"}\n' "$pkg" "$test" "$test"
case "$test" in
  TestFail*)
    printf '{"Action":"fail","Package":"%s","Test":"%s","Elapsed":0.01}\n' "$pkg" "$test"
    printf '{"Action":"fail","Package":"%s","Elapsed":0.02}\n' "$pkg"
    exit 1
    ;;
esac
printf '{"Action":"pass","Package":"%s","Test":"%s","Elapsed":0.01}\n' "$pkg" "$test"
printf '{"Action":"pass","Package":"%s","Elapsed":0.02}\n' "$pkg"
"#;

const VALIDATORS: &str = r"
gates:
  - id: pass
    tests:
      - name: TestOk
        package: example/ok
  - id: mixed
    inherits: [pass]
    tests:
      - name: TestFailBad
        package: example/bad
";

fn gate_acceptor_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gate-acceptor"))
}

/// Lays out the script, validators, and config; returns the config path.
fn workspace(dir: &TempDir, extra_runner: &str) -> PathBuf {
    let root = dir.path();
    fs::write(root.join("fake-test.sh"), FAKE_TEST).unwrap();
    fs::write(root.join("validators.yaml"), VALIDATORS).unwrap();
    let config = format!(
        r#"[runner]
validators = "{root}/validators.yaml"
testdir = "{root}"
network = "devnet"
{extra_runner}

[runner.command]
program = "sh"
args = ["fake-test.sh", "{{package}}", "{{test}}"]
test_args = []

[logging]
log_dir = "{root}/logs"
stderr = false
"#,
        root = root.display(),
    );
    let path = root.join("gate-acceptor.toml");
    fs::write(&path, config).unwrap();
    path
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(gate_acceptor_bin())
        .env_remove("GATE_ACCEPTOR_CONFIG")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .unwrap()
}

/// Returns the single run directory under `logs/`.
fn run_dir(dir: &TempDir) -> PathBuf {
    let mut runs: Vec<PathBuf> = fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.file_name().and_then(|name| name.to_str()).is_some_and(|name| name.starts_with("testrun-")))
        .collect();
    assert_eq!(runs.len(), 1, "{runs:?}");
    runs.remove(0)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies a passing gate exits 0 and writes the run directory.
#[test]
fn passing_gate_exits_zero_with_reports() {
    let dir = TempDir::new().unwrap();
    let config = workspace(&dir, "");

    let output = run(&config, &["--gate", "pass", "--run-once"]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(" PASS: 1 tests, 1 passed, 0 failed"), "{stdout}");
    let run = run_dir(&dir);
    let summary = fs::read_to_string(run.join("summary.log")).unwrap();
    assert!(summary.contains("  Passed:  1\n"));
    assert!(run.join("passed/pass_ok_TestOk.log").is_file());
    assert!(run.join("config.json").is_file());
    assert!(run.join("events.log").is_file());
    let raw = fs::read_to_string(run.join("raw_go_events.log")).unwrap();
    assert!(raw.contains(r#""Test":"TestOk""#));
}

/// Verifies a failing unit exits 1 and is named in the report.
#[test]
fn failing_unit_exits_one() {
    let dir = TempDir::new().unwrap();
    let config = workspace(&dir, "concurrency = 2");

    let output = run(&config, &["--gate", "mixed"]);

    assert_eq!(output.status.code(), Some(1), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("  FAIL    example/bad.TestFailBad"), "{stdout}");
    let run = run_dir(&dir);
    assert!(run.join("failed/mixed_bad_TestFailBad.log").is_file());
    assert!(run.join("passed/pass_ok_TestOk.log").is_file());
}

/// Verifies an unknown gate is a configuration error.
#[test]
fn unknown_gate_exits_two() {
    let dir = TempDir::new().unwrap();
    let config = workspace(&dir, "");

    let output = run(&config, &["--gate", "missing"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown gate 'missing'"), "{stderr}");
}

/// Verifies invalid config values fail before any run starts.
#[test]
fn invalid_config_exits_two() {
    let dir = TempDir::new().unwrap();
    let config = workspace(&dir, "concurrency = 0");

    let output = run(&config, &[]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("concurrency"));
    assert!(!dir.path().join("logs").exists());
}
