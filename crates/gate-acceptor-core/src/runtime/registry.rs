// crates/gate-acceptor-core/src/runtime/registry.rs
// ============================================================================
// Module: Gate Acceptor Validator Registry
// Description: Flattens resolved gates into ordered executable units.
// Purpose: Produce deterministic `ValidatorMetadata` lists with gate filters.
// Dependencies: crate::core, crate::interfaces, crate::runtime::resolver
// ============================================================================

//! ## Overview
//! The registry walks gates in declaration order, emitting direct tests
//! before suites and suite tests in declared order. A gate emits only the
//! tests it declares itself; inherited tests are reached through the parent
//! gate, and selecting a gate also selects everything it inherits from.
//!
//! Invariants:
//! - Unit IDs are unique within a registry.
//! - Exclusion never reorders the remaining units.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::core::ConfigError;
use crate::core::GateDescriptor;
use crate::core::TestDescriptor;
use crate::core::TestKey;
use crate::core::ValidatorConfig;
use crate::core::ValidatorKind;
use crate::core::ValidatorMetadata;
use crate::core::unit_id;
use crate::interfaces::EventLog;
use crate::interfaces::LogEvent;
use crate::interfaces::LogLevel;
use crate::runtime::discovery::discover_test_packages;
use crate::runtime::discovery::test_root;
use crate::runtime::resolver::resolve_gates;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-unit timeout when neither the test nor the settings provide one.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Synthetic gate name used when packages run without a validator document.
pub const GATELESS_GATE: &str = "gateless";

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Registry construction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Timeout for tests that do not declare one.
    pub default_timeout: Duration,
    /// Timeout that overrides every unit when set.
    pub timeout_override: Option<Duration>,
    /// Gates whose tests are removed from every other gate.
    pub exclude_gates: Vec<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TEST_TIMEOUT,
            timeout_override: None,
            exclude_gates: Vec::new(),
        }
    }
}

impl RegistrySettings {
    /// Returns the timeout applied to a descriptor.
    fn timeout_for(&self, declared: Option<Duration>) -> Duration {
        self.timeout_override.or(declared).unwrap_or(self.default_timeout)
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Ordered set of executable units derived from a validator document.
#[derive(Debug, Clone)]
pub struct Registry {
    /// Gates after inheritance resolution.
    resolved: Vec<GateDescriptor>,
    /// Direct parents per gate, as declared.
    inherits: HashMap<String, Vec<String>>,
    /// Units in registry order.
    validators: Vec<ValidatorMetadata>,
}

impl Registry {
    /// Builds a registry from a validator document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document is invalid or inheritance
    /// cannot be resolved.
    pub fn from_config(
        config: &ValidatorConfig,
        settings: &RegistrySettings,
        log: &dyn EventLog,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let resolved = resolve_gates(&config.gates)?;
        let inherits = config
            .gates
            .iter()
            .map(|gate| (gate.id.clone(), gate.inherits.clone()))
            .collect();

        let mut validators = Vec::new();
        let mut ids = HashSet::new();
        for (declared, merged) in config.gates.iter().zip(&resolved) {
            let declared_keys: HashSet<TestKey> =
                declared.tests.iter().map(TestDescriptor::key).collect();
            for test in merged.tests.iter().filter(|test| declared_keys.contains(&test.key())) {
                validators.push(build_unit(&merged.id, None, test, settings, &mut ids));
            }
            for (suite_name, suite) in &merged.suites {
                if !declared.suites.contains_key(suite_name) {
                    continue;
                }
                for test in &suite.tests {
                    validators.push(build_unit(&merged.id, Some(suite_name), test, settings, &mut ids));
                }
            }
        }

        let mut registry = Self {
            resolved,
            inherits,
            validators,
        };
        registry.apply_exclusions(&settings.exclude_gates, log);
        log.emit(
            LogEvent::new(LogLevel::Debug, "registry_loaded", "validator registry loaded")
                .with_field("validators", registry.validators.len())
                .with_field("gates", registry.resolved.len()),
        );
        Ok(registry)
    }

    /// Builds a registry that runs every listed package in the `gateless` gate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoValidators`] when no packages are given.
    pub fn gateless(packages: &[String], settings: &RegistrySettings) -> Result<Self, ConfigError> {
        if packages.is_empty() {
            return Err(ConfigError::NoValidators("no packages given for gateless mode".to_string()));
        }
        let mut ids = HashSet::new();
        let validators = packages
            .iter()
            .map(|package| {
                build_unit(GATELESS_GATE, None, &TestDescriptor::package(package.clone()), settings, &mut ids)
            })
            .collect();
        Ok(Self {
            resolved: Vec::new(),
            inherits: HashMap::new(),
            validators,
        })
    }

    /// Builds a gateless registry from the packages found under `testdir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Discovery`] when the directory cannot be
    /// scanned and [`ConfigError::NoValidators`] when it holds no packages.
    pub fn discover(testdir: &Path, settings: &RegistrySettings, log: &dyn EventLog) -> Result<Self, ConfigError> {
        let packages = discover_test_packages(testdir)?;
        if packages.is_empty() {
            return Err(ConfigError::NoValidators(format!(
                "no test packages found in {}",
                test_root(testdir).display()
            )));
        }
        log.emit(
            LogEvent::new(LogLevel::Info, "packages_discovered", "created gateless units from discovered packages")
                .with_field("packages", packages.len()),
        );
        Self::gateless(&packages, settings)
    }

    /// Returns every unit in registry order.
    #[must_use]
    pub fn validators(&self) -> &[ValidatorMetadata] {
        &self.validators
    }

    /// Returns the resolved form of a gate.
    #[must_use]
    pub fn resolved_gate(&self, id: &str) -> Option<&GateDescriptor> {
        self.resolved.iter().find(|gate| gate.id == id)
    }

    /// Returns the direct parents of a gate as declared.
    #[must_use]
    pub fn gate_inherits(&self, id: &str) -> &[String] {
        self.inherits.get(id).map_or(&[], Vec::as_slice)
    }

    /// Returns every gate reachable from `id` through inheritance, excluding `id`.
    #[must_use]
    pub fn inherited_gates(&self, id: &str) -> BTreeSet<String> {
        let mut collected = BTreeSet::new();
        let mut pending: Vec<&str> = self.gate_inherits(id).iter().map(String::as_str).collect();
        while let Some(next) = pending.pop() {
            if collected.insert(next.to_string()) {
                pending.extend(self.gate_inherits(next).iter().map(String::as_str));
            }
        }
        collected
    }

    /// Selects units for the given gates plus everything they inherit from.
    ///
    /// An empty filter selects every unit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownGate`] for gates not in the document and
    /// [`ConfigError::NoValidators`] when the selection is empty.
    pub fn select(&self, gates: &[String]) -> Result<Vec<ValidatorMetadata>, ConfigError> {
        if gates.is_empty() {
            if self.validators.is_empty() {
                return Err(ConfigError::NoValidators("validator config declares no tests".to_string()));
            }
            return Ok(self.validators.clone());
        }

        let mut selected = BTreeSet::new();
        for gate in gates {
            let known = self.inherits.contains_key(gate)
                || self.validators.iter().any(|unit| &unit.gate == gate);
            if !known {
                return Err(ConfigError::UnknownGate(gate.clone()));
            }
            selected.insert(gate.clone());
            selected.extend(self.inherited_gates(gate));
        }

        let units: Vec<ValidatorMetadata> = self
            .validators
            .iter()
            .filter(|unit| selected.contains(&unit.gate))
            .cloned()
            .collect();
        if units.is_empty() {
            return Err(ConfigError::NoValidators(format!("gates [{}] select no tests", gates.join(", "))));
        }
        Ok(units)
    }

    /// Removes units covered by the tests declared in `exclude_gates`.
    fn apply_exclusions(&mut self, exclude_gates: &[String], log: &dyn EventLog) {
        if exclude_gates.is_empty() {
            return;
        }
        let skip = SkipSet::from_gates(&self.resolved, exclude_gates, log);
        let before = self.validators.len();
        let mut excluded = Vec::new();
        self.validators.retain(|unit| {
            if unit.kind != ValidatorKind::Test || !skip.matches(unit) {
                return true;
            }
            excluded.push(format_ref(&unit.package, unit.func_name.as_deref()));
            false
        });
        for reference in &excluded {
            log.emit(
                LogEvent::new(LogLevel::Info, "unit_excluded", "excluded by exclude-gates")
                    .with_field("test", reference.as_str()),
            );
        }
        if !excluded.is_empty() {
            log.emit(
                LogEvent::new(LogLevel::Info, "exclusions_applied", "exclude-gates removed tests")
                    .with_field("count", excluded.len())
                    .with_field("before", before)
                    .with_field("after", self.validators.len())
                    .with_field("exclude_gates", exclude_gates.join(",")),
            );
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds one unit, suffixing the ID if it collides with an earlier unit.
fn build_unit(
    gate: &str,
    suite: Option<&String>,
    test: &TestDescriptor,
    settings: &RegistrySettings,
    ids: &mut HashSet<String>,
) -> ValidatorMetadata {
    let package = test.package.trim().to_string();
    let func_name = test.func_name().map(ToString::to_string);
    let base = unit_id(gate, suite.map(String::as_str), &package, func_name.as_deref());
    let mut id = base.clone();
    let mut ordinal = 1usize;
    while !ids.insert(id.clone()) {
        ordinal += 1;
        id = format!("{base}#{ordinal}");
    }
    ValidatorMetadata {
        id,
        kind: ValidatorKind::Test,
        gate: gate.to_string(),
        suite: suite.cloned(),
        run_all: func_name.is_none(),
        package,
        func_name,
        timeout: settings.timeout_for(test.timeout),
    }
}

/// Formats an excluded test reference as `pkg::name` or `pkg::*`.
fn format_ref(package: &str, name: Option<&str>) -> String {
    format!("{package}::{}", name.unwrap_or("*"))
}

/// Tests removed by exclude-gates.
struct SkipSet {
    /// Exact `(package, name)` matches.
    by_tuple: HashSet<(String, String)>,
    /// Package prefixes matched on segment boundaries.
    by_package: BTreeSet<String>,
}

impl SkipSet {
    /// Collects skip entries from every test declared in the excluded gates.
    fn from_gates(resolved: &[GateDescriptor], exclude: &[String], log: &dyn EventLog) -> Self {
        let mut skip = Self {
            by_tuple: HashSet::new(),
            by_package: BTreeSet::new(),
        };
        for gate_id in exclude {
            let Some(gate) = resolved.iter().find(|gate| &gate.id == gate_id) else {
                log.emit(
                    LogEvent::new(LogLevel::Warn, "exclude_gate_missing", "exclude gate not found; ignoring")
                        .with_field("gate", gate_id.as_str()),
                );
                continue;
            };
            let suite_tests = gate.suites.values().flat_map(|suite| suite.tests.iter());
            for test in gate.tests.iter().chain(suite_tests) {
                let package = test.package.trim();
                match test.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
                    Some(name) => {
                        skip.by_tuple.insert((package.to_string(), name.to_string()));
                    }
                    None => {
                        skip.by_package.insert(package.to_string());
                    }
                }
            }
        }
        skip
    }

    /// Returns true when a unit is covered by the skip set.
    fn matches(&self, unit: &ValidatorMetadata) -> bool {
        if let Some(func) = &unit.func_name
            && self.by_tuple.contains(&(unit.package.clone(), func.clone()))
        {
            return true;
        }
        self.by_package.iter().any(|prefix| package_has_prefix(&unit.package, prefix))
    }
}

/// Returns true when `package` equals `prefix` or continues it after a `/`.
fn package_has_prefix(package: &str, prefix: &str) -> bool {
    package
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'))
}
