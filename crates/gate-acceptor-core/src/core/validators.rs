// crates/gate-acceptor-core/src/core/validators.rs
// ============================================================================
// Module: Gate Acceptor Validator Configuration
// Description: Declarative gate, suite, and test descriptors.
// Purpose: Load and validate the YAML document describing what to run.
// Dependencies: serde, serde_yaml, thiserror
// ============================================================================

//! ## Overview
//! A validator document lists gates. Each gate owns direct tests and named
//! suites, and may inherit from other gates. Loading enforces a size limit,
//! UTF-8, and basic schema rules; inheritance is resolved separately by
//! [`crate::runtime::resolve_gates`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::duration;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum validator document size in bytes.
pub(crate) const MAX_VALIDATOR_FILE_SIZE: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors raised before any test runs.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading the document.
    #[error("validator config io error: {0}")]
    Io(String),
    /// Document failed to parse or violates the schema.
    #[error("invalid validator config: {0}")]
    Schema(String),
    /// Inheritance chain contains a cycle.
    #[error("circular inheritance detected: {}", path.join(" -> "))]
    Cycle {
        /// Gate IDs along the cycle, starting and ending at the repeated gate.
        path: Vec<String>,
    },
    /// A gate inherits from a gate that does not exist.
    #[error("gate '{gate}' inherits from non-existent gate '{parent}'")]
    MissingParent {
        /// Inheriting gate.
        gate: String,
        /// Missing parent gate.
        parent: String,
    },
    /// A gate filter named an unknown gate.
    #[error("unknown gate '{0}'")]
    UnknownGate(String),
    /// The selection produced no executable units.
    #[error("no validators found: {0}")]
    NoValidators(String),
    /// The test directory could not be scanned for packages.
    #[error("test package discovery failed: {0}")]
    Discovery(String),
}

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Deduplication key for test descriptors: `(package, function)`.
pub type TestKey = (String, Option<String>);

/// Root validator document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Declared gates in document order.
    #[serde(default)]
    pub gates: Vec<GateDescriptor>,
}

/// Named bag of tests and suites with optional inheritance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDescriptor {
    /// Unique gate identifier.
    pub id: String,
    /// Human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parent gates, in merge order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherits: Vec<String>,
    /// Direct tests, in declared order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestDescriptor>,
    /// Suites keyed by name (iterated in sorted order).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub suites: BTreeMap<String, SuiteDescriptor>,
}

/// Intermediate grouping of tests within a gate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteDescriptor {
    /// Human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tests in declared order.
    #[serde(default)]
    pub tests: Vec<TestDescriptor>,
}

/// Single test entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDescriptor {
    /// Test function name; absent means run the whole package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Package locator.
    pub package: String,
    /// Explicit run-all flag; inferred from `name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_all: Option<bool>,
    /// Per-test timeout.
    #[serde(default, with = "duration::optional", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl TestDescriptor {
    /// Creates a descriptor for a single named test.
    #[must_use]
    pub fn named(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            package: package.into(),
            run_all: None,
            timeout: None,
        }
    }

    /// Creates a descriptor that runs every test in a package.
    #[must_use]
    pub fn package(package: impl Into<String>) -> Self {
        Self {
            name: None,
            package: package.into(),
            run_all: None,
            timeout: None,
        }
    }

    /// Returns the effective function name (ignored when running all tests).
    #[must_use]
    pub fn func_name(&self) -> Option<&str> {
        if self.run_all == Some(true) {
            return None;
        }
        self.name.as_deref().map(str::trim).filter(|name| !name.is_empty())
    }

    /// Returns true when the descriptor stands in for every test in the package.
    #[must_use]
    pub fn is_run_all(&self) -> bool {
        self.func_name().is_none()
    }

    /// Returns the `(package, function)` deduplication key.
    #[must_use]
    pub fn key(&self) -> TestKey {
        (self.package.trim().to_string(), self.func_name().map(ToString::to_string))
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl ValidatorConfig {
    /// Loads and validates a validator document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing, or validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        if bytes.len() > MAX_VALIDATOR_FILE_SIZE {
            return Err(ConfigError::Schema("validator config exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Schema("validator config must be utf-8".to_string()))?;
        Self::from_yaml_str(content)
    }

    /// Parses and validates a validator document from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] when parsing or validation fails.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(content).map_err(|err| ConfigError::Schema(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates schema rules that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] for empty or duplicate gate IDs and
    /// tests without a package.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for gate in &self.gates {
            let id = gate.id.trim();
            if id.is_empty() {
                return Err(ConfigError::Schema("gate id must be non-empty".to_string()));
            }
            if !seen.insert(id) {
                return Err(ConfigError::Schema(format!("duplicate gate id '{id}'")));
            }
            for test in &gate.tests {
                validate_test(id, None, test)?;
            }
            for (suite_name, suite) in &gate.suites {
                if suite_name.trim().is_empty() {
                    return Err(ConfigError::Schema(format!(
                        "gate '{id}' has a suite with an empty name"
                    )));
                }
                for test in &suite.tests {
                    validate_test(id, Some(suite_name), test)?;
                }
            }
        }
        Ok(())
    }

    /// Returns the gate with the given ID.
    #[must_use]
    pub fn gate(&self, id: &str) -> Option<&GateDescriptor> {
        self.gates.iter().find(|gate| gate.id == id)
    }
}

/// Validates a single test descriptor.
fn validate_test(gate: &str, suite: Option<&str>, test: &TestDescriptor) -> Result<(), ConfigError> {
    if test.package.trim().is_empty() {
        let location = suite.map_or_else(|| gate.to_string(), |suite| format!("{gate}/{suite}"));
        return Err(ConfigError::Schema(format!(
            "test in '{location}' is missing a package"
        )));
    }
    Ok(())
}
