// gate-acceptor-config/src/snapshot.rs
// ============================================================================
// Module: Effective Config Snapshot
// Description: Serializable record of the configuration a run actually used.
// Purpose: Persist the merged settings next to each run's reports.
// Dependencies: gate-acceptor-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A snapshot is taken after CLI overrides are merged, grouped by concern, and
//! written as `config.json` into the run directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use gate_acceptor_core::LogLevel;
use gate_acceptor_core::core::duration;
use serde::Serialize;

use crate::config::GateAcceptorConfig;

// ============================================================================
// SECTION: Snapshot Types
// ============================================================================

/// Effective runtime configuration grouped by domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfigSnapshot {
    /// Worker and timeout settings.
    pub runner: RunnerSnapshot,
    /// Scheduling and command settings.
    pub execution: ExecutionSnapshot,
    /// Logging settings.
    pub logging: LoggingSnapshot,
    /// Filesystem locations.
    pub paths: PathsSnapshot,
    /// Network the run targeted.
    pub network_name: String,
    /// Run identifier, when taken for a specific run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// Worker and timeout settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerSnapshot {
    /// Timeout for units that declare none.
    #[serde(with = "duration::required")]
    pub default_timeout: Duration,
    /// Timeout forced onto every unit.
    #[serde(with = "duration::optional")]
    pub timeout: Option<Duration>,
    /// Worker count after capping.
    pub concurrency: usize,
    /// Stdout tail size per unit.
    pub tail_bytes: usize,
}

/// Scheduling and command settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionSnapshot {
    /// Interval between periodic runs.
    #[serde(with = "duration::optional")]
    pub run_interval: Option<Duration>,
    /// Whether a single run was requested.
    pub run_once: bool,
    /// Child program.
    pub program: String,
    /// Selected gates.
    pub gates: Vec<String>,
    /// Excluded gates.
    pub exclude_gates: Vec<String>,
    /// Whether packages ran without a validator document.
    pub gateless: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggingSnapshot {
    /// Minimum operational log level.
    pub level: LogLevel,
    /// Whether events were mirrored to stderr.
    pub stderr: bool,
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathsSnapshot {
    /// Test directory.
    pub testdir: PathBuf,
    /// Validator document, if any.
    pub validators: Option<PathBuf>,
    /// Log root directory.
    pub log_dir: PathBuf,
    /// Runtime config file, if one was loaded.
    pub config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Construction
// ============================================================================

impl EffectiveConfigSnapshot {
    /// Captures the effective settings of `config`.
    #[must_use]
    pub fn from_config(config: &GateAcceptorConfig) -> Self {
        let runner = &config.runner;
        let interval = config.periodic_interval();
        Self {
            runner: RunnerSnapshot {
                default_timeout: runner.default_timeout,
                timeout: runner.timeout,
                concurrency: runner.effective_concurrency(),
                tail_bytes: runner.tail_bytes,
            },
            execution: ExecutionSnapshot {
                run_interval: interval,
                run_once: interval.is_none(),
                program: runner.command.program.clone(),
                gates: runner.gates.clone(),
                exclude_gates: runner.exclude_gates.clone(),
                gateless: config.is_gateless(),
            },
            logging: LoggingSnapshot {
                level: config.logging.level,
                stderr: config.logging.stderr,
            },
            paths: PathsSnapshot {
                testdir: runner.testdir.clone(),
                validators: runner.validators.clone(),
                log_dir: config.logging.log_dir.clone(),
                config: config.source.clone(),
            },
            network_name: runner.network.clone(),
            run_id: None,
        }
    }

    /// Returns a copy stamped with a run identifier.
    #[must_use]
    pub fn for_run(&self, run_id: &str) -> Self {
        Self {
            run_id: Some(run_id.to_string()),
            ..self.clone()
        }
    }

    /// Serializes the snapshot as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error from `serde_json`.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
