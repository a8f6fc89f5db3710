// crates/gate-acceptor-core/tests/registry.rs
// ============================================================================
// Module: Validator Registry Tests
// Description: Unit ordering, IDs, gate filters, exclusions, and gateless mode.
// Purpose: Confirm the registry emits each declared test exactly once.
// ============================================================================

//! ## Overview
//! Builds registries from YAML documents and checks the emitted units.

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

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use gate_acceptor_core::ConfigError;
use gate_acceptor_core::EventLog;
use gate_acceptor_core::LogEvent;
use gate_acceptor_core::LogLevel;
use gate_acceptor_core::NoopEventLog;
use gate_acceptor_core::Registry;
use gate_acceptor_core::RegistrySettings;
use gate_acceptor_core::ValidatorConfig;
use gate_acceptor_core::ValidatorMetadata;
use gate_acceptor_core::discover_test_packages;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const DOCUMENT: &str = r"
gates:
  - id: base
    tests:
      - package: ./pkg/base
        name: TestBase
      - package: ./pkg/whole
  - id: extended
    inherits: [base]
    tests:
      - package: ./pkg/ext
        name: TestExt
        timeout: 45s
    suites:
      zeta:
        tests:
          - package: ./pkg/zeta
            name: TestZeta
      alpha:
        tests:
          - package: ./pkg/alpha
            name: TestAlphaOne
          - package: ./pkg/alpha
            name: TestAlphaTwo
  - id: flaky
    tests:
      - package: ./pkg/ext
        name: TestExt
      - package: ./pkg/alpha
";

#[derive(Default)]
struct RecordingLog {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingLog {
    fn events_named(&self, name: &str) -> Vec<LogEvent> {
        self.events.lock().unwrap().iter().filter(|event| event.event == name).cloned().collect()
    }
}

impl EventLog for RecordingLog {
    fn record(&self, event: &LogEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn enabled(&self, _level: LogLevel) -> bool {
        true
    }
}

fn registry(settings: &RegistrySettings) -> Registry {
    let config = ValidatorConfig::from_yaml_str(DOCUMENT).unwrap();
    Registry::from_config(&config, settings, &NoopEventLog).unwrap()
}

fn ids(units: &[ValidatorMetadata]) -> Vec<&str> {
    units.iter().map(|unit| unit.id.as_str()).collect()
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// Tests gate order, direct-before-suite, and sorted suite order.
#[test]
fn units_follow_declaration_order() {
    let registry = registry(&RegistrySettings::default());
    assert_eq!(
        ids(registry.validators()),
        vec![
            "base::./pkg/base::TestBase",
            "base::./pkg/whole",
            "extended::./pkg/ext::TestExt",
            "extended/alpha::./pkg/alpha::TestAlphaOne",
            "extended/alpha::./pkg/alpha::TestAlphaTwo",
            "extended/zeta::./pkg/zeta::TestZeta",
            "flaky::./pkg/ext::TestExt",
            "flaky::./pkg/alpha",
        ]
    );
}

/// Tests that inherited tests are not re-emitted under the child gate.
#[test]
fn inherited_tests_are_emitted_once() {
    let registry = registry(&RegistrySettings::default());
    let base_count = registry
        .validators()
        .iter()
        .filter(|unit| unit.func_name.as_deref() == Some("TestBase"))
        .count();
    assert_eq!(base_count, 1);
    let resolved = registry.resolved_gate("extended").unwrap();
    assert!(resolved.tests.iter().any(|test| test.name.as_deref() == Some("TestBase")));
}

/// Tests run-all inference and timeout defaults.
#[test]
fn run_all_and_timeouts_are_derived() {
    let settings = RegistrySettings {
        default_timeout: Duration::from_secs(90),
        ..RegistrySettings::default()
    };
    let registry = registry(&settings);
    let whole = &registry.validators()[1];
    assert!(whole.run_all);
    assert_eq!(whole.func_name, None);
    assert_eq!(whole.timeout, Duration::from_secs(90));
    let ext = &registry.validators()[2];
    assert!(!ext.run_all);
    assert_eq!(ext.timeout, Duration::from_secs(45));
}

/// Tests that the timeout override beats declared timeouts.
#[test]
fn timeout_override_applies_to_every_unit() {
    let settings = RegistrySettings {
        timeout_override: Some(Duration::from_secs(3)),
        ..RegistrySettings::default()
    };
    let registry = registry(&settings);
    assert!(registry.validators().iter().all(|unit| unit.timeout == Duration::from_secs(3)));
}

/// Tests that an explicit run_all flag wins over a name.
#[test]
fn explicit_run_all_ignores_name() {
    let yaml = r"
gates:
  - id: only
    tests:
      - package: ./pkg/all
        name: TestIgnored
        run_all: true
";
    let config = ValidatorConfig::from_yaml_str(yaml).unwrap();
    let registry =
        Registry::from_config(&config, &RegistrySettings::default(), &NoopEventLog).unwrap();
    let unit = &registry.validators()[0];
    assert!(unit.run_all);
    assert_eq!(unit.id, "only::./pkg/all");
}

/// Tests that repeated direct tests collapse while repeated suite entries get suffixed IDs.
#[test]
fn duplicate_declarations_get_unique_ids() {
    let yaml = r"
gates:
  - id: dup
    tests:
      - package: ./pkg/a
        name: TestA
      - package: ./pkg/a
        name: TestA
    suites:
      twice:
        tests:
          - package: ./pkg/b
            name: TestB
          - package: ./pkg/b
            name: TestB
";
    let config = ValidatorConfig::from_yaml_str(yaml).unwrap();
    let registry =
        Registry::from_config(&config, &RegistrySettings::default(), &NoopEventLog).unwrap();
    assert_eq!(
        ids(registry.validators()),
        vec!["dup::./pkg/a::TestA", "dup/twice::./pkg/b::TestB", "dup/twice::./pkg/b::TestB#2"]
    );
}

// ============================================================================
// SECTION: Gate Filters
// ============================================================================

/// Tests that selecting a gate includes the gates it inherits from.
#[test]
fn select_includes_inherited_gates() {
    let registry = registry(&RegistrySettings::default());
    let selected = registry.select(&["extended".to_string()]).unwrap();
    let gates: Vec<&str> = selected.iter().map(|unit| unit.gate.as_str()).collect();
    assert_eq!(gates, vec!["base", "base", "extended", "extended", "extended", "extended"]);
}

/// Tests that an empty filter selects everything.
#[test]
fn empty_filter_selects_all() {
    let registry = registry(&RegistrySettings::default());
    assert_eq!(registry.select(&[]).unwrap().len(), registry.validators().len());
}

/// Tests that unknown gates are rejected.
#[test]
fn unknown_gate_is_rejected() {
    let registry = registry(&RegistrySettings::default());
    assert_eq!(
        registry.select(&["nope".to_string()]).unwrap_err(),
        ConfigError::UnknownGate("nope".to_string())
    );
}

/// Tests that an empty document yields no validators.
#[test]
fn empty_document_has_no_validators() {
    let config = ValidatorConfig::from_yaml_str("").unwrap();
    let registry =
        Registry::from_config(&config, &RegistrySettings::default(), &NoopEventLog).unwrap();
    assert!(matches!(registry.select(&[]), Err(ConfigError::NoValidators(_))));
}

/// Tests transitive inherited-gate collection.
#[test]
fn inherited_gates_are_transitive() {
    let yaml = r"
gates:
  - id: a
    tests: [{ package: ./a }]
  - id: b
    inherits: [a]
  - id: c
    inherits: [b]
";
    let config = ValidatorConfig::from_yaml_str(yaml).unwrap();
    let registry =
        Registry::from_config(&config, &RegistrySettings::default(), &NoopEventLog).unwrap();
    let inherited: Vec<String> = registry.inherited_gates("c").into_iter().collect();
    assert_eq!(inherited, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(registry.select(&["c".to_string()]).unwrap().len(), 1);
}

/// Tests that configuration errors surface from the resolver.
#[test]
fn cyclic_document_is_rejected() {
    let yaml = r"
gates:
  - id: a
    inherits: [b]
  - id: b
    inherits: [a]
";
    let config = ValidatorConfig::from_yaml_str(yaml).unwrap();
    let err = Registry::from_config(&config, &RegistrySettings::default(), &NoopEventLog)
        .unwrap_err();
    assert!(matches!(err, ConfigError::Cycle { .. }));
}

// ============================================================================
// SECTION: Exclusions
// ============================================================================

/// Tests tuple and package-prefix exclusion with logging.
#[test]
fn exclude_gates_remove_matching_units() {
    let config = ValidatorConfig::from_yaml_str(DOCUMENT).unwrap();
    let settings = RegistrySettings {
        exclude_gates: vec!["flaky".to_string()],
        ..RegistrySettings::default()
    };
    let log = RecordingLog::default();
    let registry = Registry::from_config(&config, &settings, &log).unwrap();
    assert_eq!(
        ids(registry.validators()),
        vec!["base::./pkg/base::TestBase", "base::./pkg/whole", "extended/zeta::./pkg/zeta::TestZeta"]
    );
    let excluded: Vec<String> = log
        .events_named("unit_excluded")
        .iter()
        .map(|event| event.fields["test"].as_str().unwrap().to_string())
        .collect();
    assert!(excluded.contains(&"./pkg/ext::TestExt".to_string()));
    assert!(excluded.contains(&"./pkg/alpha::*".to_string()));
}

/// Tests that package prefixes only match on segment boundaries.
#[test]
fn package_prefix_respects_segment_boundaries() {
    let yaml = r"
gates:
  - id: main
    tests:
      - package: ./pkg/net
      - package: ./pkg/net/p2p
        name: TestPeers
      - package: ./pkg/network
  - id: skip
    tests:
      - package: ./pkg/net
";
    let config = ValidatorConfig::from_yaml_str(yaml).unwrap();
    let settings = RegistrySettings {
        exclude_gates: vec!["skip".to_string()],
        ..RegistrySettings::default()
    };
    let registry = Registry::from_config(&config, &settings, &NoopEventLog).unwrap();
    assert_eq!(ids(registry.validators()), vec!["main::./pkg/network"]);
}

/// Tests that unknown exclude gates are logged and ignored.
#[test]
fn unknown_exclude_gate_is_ignored() {
    let config = ValidatorConfig::from_yaml_str(DOCUMENT).unwrap();
    let settings = RegistrySettings {
        exclude_gates: vec!["missing".to_string()],
        ..RegistrySettings::default()
    };
    let log = RecordingLog::default();
    let registry = Registry::from_config(&config, &settings, &log).unwrap();
    assert_eq!(registry.validators().len(), 8);
    assert_eq!(log.events_named("exclude_gate_missing").len(), 1);
}

// ============================================================================
// SECTION: Gateless
// ============================================================================

/// Tests that gateless mode emits one run-all unit per package.
#[test]
fn gateless_mode_runs_every_package() {
    let packages = vec!["./pkg/a".to_string(), "./pkg/b".to_string()];
    let registry = Registry::gateless(&packages, &RegistrySettings::default()).unwrap();
    assert_eq!(ids(registry.validators()), vec!["gateless::./pkg/a", "gateless::./pkg/b"]);
    assert!(registry.validators().iter().all(|unit| unit.run_all && unit.gate == "gateless"));
    assert_eq!(registry.select(&["gateless".to_string()]).unwrap().len(), 2);
}

/// Tests that gateless mode without packages is an error.
#[test]
fn gateless_mode_requires_packages() {
    assert!(matches!(
        Registry::gateless(&[], &RegistrySettings::default()),
        Err(ConfigError::NoValidators(_))
    ));
}

// ============================================================================
// SECTION: Discovery
// ============================================================================

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "package x\n").unwrap();
}

/// Tests that discovery finds test packages in walk order and skips ignored directories.
#[test]
fn discovery_finds_test_packages() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "root_test.go");
    touch(dir.path(), "b/c/deep_test.go");
    touch(dir.path(), "a/unit_test.go");
    touch(dir.path(), "a/helper.go");
    touch(dir.path(), "docs/readme.md");
    touch(dir.path(), "lib/code.go");
    touch(dir.path(), ".cache/cached_test.go");
    touch(dir.path(), "_old/old_test.go");
    touch(dir.path(), "a/testdata/fixture_test.go");

    let packages = discover_test_packages(dir.path()).unwrap();

    assert_eq!(packages, vec![".", "./a", "./b/c"]);
}

/// Tests that a trailing `/...` on the test directory is accepted.
#[test]
fn discovery_accepts_recursive_pattern() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "pkg/one/one_test.go");
    let pattern = format!("{}/...", dir.path().display());

    let packages = discover_test_packages(Path::new(&pattern)).unwrap();

    assert_eq!(packages, vec!["./pkg/one"]);
}

/// Tests that a missing test directory is a discovery error.
#[test]
fn discovery_rejects_missing_directory() {
    let dir = TempDir::new().unwrap();
    let err = discover_test_packages(&dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, ConfigError::Discovery(_)), "{err}");
}

/// Tests that discovered packages become gateless run-all units.
#[test]
fn discovered_packages_become_gateless_units() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "x/x_test.go");
    touch(dir.path(), "y/y_test.go");
    let log = RecordingLog::default();
    let settings = RegistrySettings {
        timeout_override: Some(Duration::from_secs(7)),
        ..RegistrySettings::default()
    };

    let registry = Registry::discover(dir.path(), &settings, &log).unwrap();

    assert_eq!(ids(registry.validators()), vec!["gateless::./x", "gateless::./y"]);
    assert!(registry.validators().iter().all(|unit| unit.run_all && unit.timeout == Duration::from_secs(7)));
    assert_eq!(log.events_named("packages_discovered").len(), 1);
}

/// Tests that a directory without test packages yields no units.
#[test]
fn discovery_without_packages_is_error() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "lib/code.go");
    assert!(matches!(
        Registry::discover(dir.path(), &RegistrySettings::default(), &NoopEventLog),
        Err(ConfigError::NoValidators(_))
    ));
}
