// gate-acceptor-config/src/config.rs
// ============================================================================
// Module: Gate Acceptor Configuration
// Description: Configuration loading and validation for the test runner.
// Purpose: Provide strict config parsing with hard limits and CLI overrides.
// Dependencies: gate-acceptor-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with size and path limits. Every
//! section is optional; an absent default file yields the built-in defaults.
//! Command-line overrides are merged with [`GateAcceptorConfig::apply_overrides`]
//! before the final [`GateAcceptorConfig::validate`] pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use gate_acceptor_core::LogLevel;
use gate_acceptor_core::core::duration;
use gate_acceptor_core::test_root;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "gate-acceptor.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "GATE_ACCEPTOR_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound applied to the configured worker count.
pub const MAX_REASONABLE_CONCURRENCY: usize = 32;
/// Default per-unit timeout when a test declares none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Default stdout tail retained per unit.
pub const DEFAULT_TAIL_BYTES: usize = 64 * 1024;
/// Smallest accepted stdout tail.
pub(crate) const MIN_TAIL_BYTES: usize = 1024;
/// Largest accepted stdout tail.
pub(crate) const MAX_TAIL_BYTES: usize = 16 * 1024 * 1024;
/// Maximum number of extra environment variables for the child process.
pub(crate) const MAX_COMMAND_ENV: usize = 256;
/// Placeholder replaced with the unit package.
pub const PACKAGE_PLACEHOLDER: &str = "{package}";
/// Placeholder replaced with the unit function name.
pub const TEST_PLACEHOLDER: &str = "{test}";
/// Placeholder replaced with the unit timeout.
pub const TIMEOUT_PLACEHOLDER: &str = "{timeout}";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Gate Acceptor runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GateAcceptorConfig {
    /// Runner configuration.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Run scheduling configuration.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Operational logging and report output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Path the configuration was loaded from (not serialized).
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl GateAcceptorConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// An explicit path or `GATE_ACCEPTOR_CONFIG` must point at a readable
    /// file. When neither is set and `gate-acceptor.toml` does not exist, the
    /// built-in defaults are returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing, or limit checks fail.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path)?;
        validate_path(&resolved)?;
        if !explicit && !resolved.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.source = Some(resolved);
        Ok(config)
    }

    /// Parses configuration from TOML text and checks field limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or limit checks fail.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate_limits()?;
        Ok(config)
    }

    /// Merges command-line overrides into the configuration.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let runner = &mut self.runner;
        if let Some(testdir) = overrides.testdir {
            runner.testdir = testdir;
        }
        if overrides.validators.is_some() {
            runner.validators = overrides.validators;
        }
        if !overrides.gates.is_empty() {
            runner.gates = overrides.gates;
        }
        if !overrides.exclude_gates.is_empty() {
            runner.exclude_gates = overrides.exclude_gates;
        }
        if !overrides.gateless.is_empty() {
            runner.gateless = overrides.gateless;
        }
        if overrides.discover {
            runner.discover = true;
        }
        if let Some(concurrency) = overrides.concurrency {
            runner.concurrency = concurrency;
        }
        if let Some(default_timeout) = overrides.default_timeout {
            runner.default_timeout = default_timeout;
        }
        if overrides.timeout.is_some() {
            runner.timeout = overrides.timeout;
        }
        if let Some(network) = overrides.network {
            runner.network = network;
        }
        if let Some(interval) = overrides.run_interval {
            self.schedule.run_interval = Some(interval);
            self.schedule.run_once = false;
        }
        if overrides.run_once {
            self.schedule.run_once = true;
            self.schedule.run_interval = None;
        }
        if let Some(log_dir) = overrides.log_dir {
            self.logging.log_dir = log_dir;
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a limit is exceeded or a
    /// selected gate is also excluded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_limits()?;
        if let Some(gate) =
            self.runner.gates.iter().find(|gate| self.runner.exclude_gates.contains(gate))
        {
            return Err(ConfigError::Invalid(format!(
                "gate '{gate}' is both selected and excluded"
            )));
        }
        Ok(())
    }

    /// Validates field-level limits that hold regardless of overrides.
    fn validate_limits(&self) -> Result<(), ConfigError> {
        self.runner.validate()?;
        self.schedule.validate()?;
        self.logging.validate()
    }

    /// Returns the interval between runs, or `None` for a single run.
    #[must_use]
    pub fn periodic_interval(&self) -> Option<Duration> {
        if self.schedule.run_once {
            return None;
        }
        self.schedule.run_interval.filter(|interval| !interval.is_zero())
    }

    /// Returns true when packages are run without a validator document.
    ///
    /// Listed packages, an explicit discovery request, or a missing
    /// validator document all select gateless mode.
    #[must_use]
    pub fn is_gateless(&self) -> bool {
        !self.runner.gateless.is_empty() || self.runner.discover || self.runner.validators.is_none()
    }

    /// Returns the directory the test command runs in, without `/...`.
    #[must_use]
    pub fn test_root(&self) -> PathBuf {
        test_root(&self.runner.testdir)
    }
}

/// Test discovery and execution settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Directory the child process runs in.
    #[serde(default = "default_testdir")]
    pub testdir: PathBuf,
    /// Validator document path (YAML).
    #[serde(default)]
    pub validators: Option<PathBuf>,
    /// Number of units executed in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Timeout for units that declare none.
    #[serde(default = "default_timeout", with = "duration::required")]
    pub default_timeout: Duration,
    /// Timeout forced onto every unit.
    #[serde(default, with = "duration::optional")]
    pub timeout: Option<Duration>,
    /// Bytes of stdout retained per unit as a snippet.
    #[serde(default = "default_tail_bytes")]
    pub tail_bytes: usize,
    /// Network name recorded on every run.
    #[serde(default = "default_network")]
    pub network: String,
    /// Gates to run; empty runs every gate.
    #[serde(default)]
    pub gates: Vec<String>,
    /// Gates whose tests are skipped.
    #[serde(default)]
    pub exclude_gates: Vec<String>,
    /// Packages run whole without a validator document.
    #[serde(default)]
    pub gateless: Vec<String>,
    /// Discover packages under `testdir` even when a validator document is set.
    #[serde(default)]
    pub discover: bool,
    /// Child command template.
    #[serde(default)]
    pub command: CommandConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            testdir: default_testdir(),
            validators: None,
            concurrency: default_concurrency(),
            default_timeout: DEFAULT_TIMEOUT,
            timeout: None,
            tail_bytes: DEFAULT_TAIL_BYTES,
            network: default_network(),
            gates: Vec::new(),
            exclude_gates: Vec::new(),
            gateless: Vec::new(),
            discover: false,
            command: CommandConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Returns the worker count capped at [`MAX_REASONABLE_CONCURRENCY`].
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_REASONABLE_CONCURRENCY)
    }

    /// Validates runner limits.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("runner.testdir", &self.testdir.to_string_lossy())?;
        if let Some(validators) = &self.validators {
            validate_path_string("runner.validators", &validators.to_string_lossy())?;
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "runner.concurrency must be greater than zero".to_string(),
            ));
        }
        if !(MIN_TAIL_BYTES ..= MAX_TAIL_BYTES).contains(&self.tail_bytes) {
            return Err(ConfigError::Invalid("runner.tail_bytes out of range".to_string()));
        }
        if self.network.trim().is_empty() {
            return Err(ConfigError::Invalid("runner.network must be non-empty".to_string()));
        }
        validate_ids("runner.gates", &self.gates)?;
        validate_ids("runner.exclude_gates", &self.exclude_gates)?;
        validate_ids("runner.gateless", &self.gateless)?;
        self.command.validate()
    }
}

/// Child process command template.
///
/// The defaults reproduce
/// `go test {package} -count 1 -timeout {timeout} -v -json -run ^{test}$`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandConfig {
    /// Program to execute.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments for every unit.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Arguments appended only when a unit names a test function.
    #[serde(default = "default_test_args")]
    pub test_args: Vec<String>,
    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            test_args: default_test_args(),
            env: BTreeMap::new(),
        }
    }
}

impl CommandConfig {
    /// Validates the command template.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "runner.command.program must be non-empty".to_string(),
            ));
        }
        if !self.args.iter().any(|arg| arg.contains(PACKAGE_PLACEHOLDER)) {
            return Err(ConfigError::Invalid(format!(
                "runner.command.args must reference {PACKAGE_PLACEHOLDER}"
            )));
        }
        if !self.test_args.is_empty() && !self.test_args.iter().any(|arg| arg.contains(TEST_PLACEHOLDER)) {
            return Err(ConfigError::Invalid(format!(
                "runner.command.test_args must reference {TEST_PLACEHOLDER}"
            )));
        }
        if self.env.len() > MAX_COMMAND_ENV {
            return Err(ConfigError::Invalid("too many runner.command.env entries".to_string()));
        }
        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(ConfigError::Invalid(format!(
                    "runner.command.env key '{key}' is not a valid variable name"
                )));
            }
        }
        Ok(())
    }
}

/// Run scheduling settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// Run a single time and exit.
    #[serde(default)]
    pub run_once: bool,
    /// Interval between periodic runs; absent or zero means a single run.
    #[serde(default, with = "duration::optional")]
    pub run_interval: Option<Duration>,
}

impl ScheduleConfig {
    /// Validates schedule settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.run_once && self.run_interval.is_some_and(|interval| !interval.is_zero()) {
            return Err(ConfigError::Invalid(
                "schedule.run_once conflicts with schedule.run_interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Operational logging and report output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Root directory for per-run output.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Minimum level of operational events.
    #[serde(default = "default_level")]
    pub level: LogLevel,
    /// Mirror operational events to stderr.
    #[serde(default = "default_stderr")]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            level: default_level(),
            stderr: default_stderr(),
        }
    }
}

impl LoggingConfig {
    /// Validates logging settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("logging.log_dir", &self.log_dir.to_string_lossy())
    }
}

/// Command-line values layered over the file configuration.
///
/// `None` and empty lists leave the file value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Test directory override.
    pub testdir: Option<PathBuf>,
    /// Validator document override.
    pub validators: Option<PathBuf>,
    /// Gate selection override.
    pub gates: Vec<String>,
    /// Exclude-gate override.
    pub exclude_gates: Vec<String>,
    /// Gateless package list override.
    pub gateless: Vec<String>,
    /// Request package discovery under the test directory.
    pub discover: bool,
    /// Worker count override.
    pub concurrency: Option<usize>,
    /// Default timeout override.
    pub default_timeout: Option<Duration>,
    /// Forced timeout override.
    pub timeout: Option<Duration>,
    /// Network name override.
    pub network: Option<String>,
    /// Periodic interval override; clears `run_once`.
    pub run_interval: Option<Duration>,
    /// Force a single run.
    pub run_once: bool,
    /// Log directory override.
    pub log_dir: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Splits a comma-separated gate list, trimming entries and dropping blanks.
#[must_use]
pub fn split_gate_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Resolves the config path from CLI or environment defaults.
///
/// The flag is true when the path was given explicitly.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Rejects blank entries in an identifier list.
fn validate_ids(field: &str, values: &[String]) -> Result<(), ConfigError> {
    if values.iter().any(|value| value.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!("{field} entries must be non-empty")));
    }
    Ok(())
}

/// Default test directory.
fn default_testdir() -> PathBuf {
    PathBuf::from(".")
}

/// Default worker count.
const fn default_concurrency() -> usize {
    1
}

/// Default per-unit timeout.
const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Default stdout tail size.
const fn default_tail_bytes() -> usize {
    DEFAULT_TAIL_BYTES
}

/// Default network name.
fn default_network() -> String {
    "local".to_string()
}

/// Default child program.
fn default_program() -> String {
    "go".to_string()
}

/// Default per-unit arguments.
fn default_args() -> Vec<String> {
    ["test", PACKAGE_PLACEHOLDER, "-count", "1", "-timeout", TIMEOUT_PLACEHOLDER, "-v", "-json"]
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

/// Default arguments for units naming a test function.
fn default_test_args() -> Vec<String> {
    vec!["-run".to_string(), format!("^{TEST_PLACEHOLDER}$")]
}

/// Default log directory.
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Default operational log level.
const fn default_level() -> LogLevel {
    LogLevel::Info
}

/// Stderr logging is on unless disabled.
const fn default_stderr() -> bool {
    true
}
