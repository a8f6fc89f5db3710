// crates/gate-acceptor-cli/src/args.rs
// ============================================================================
// Module: Command-Line Arguments
// Description: clap definitions for the gate-acceptor binary.
// Purpose: Turn flags into configuration overrides.
// Dependencies: clap, gate-acceptor-config, gate-acceptor-core
// ============================================================================

//! ## Overview
//! Every flag is optional; unset flags leave the TOML value (or its default)
//! in place. Durations accept the same forms as the config file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use clap::ArgAction;
use clap::Parser;
use gate_acceptor_config::ConfigOverrides;
use gate_acceptor_config::split_gate_list;
use gate_acceptor_core::parse_duration;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "gate-acceptor", version, about = "Runs acceptance-test gates and reports the results.")]
pub struct Cli {
    /// Runtime configuration file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Directory the test command runs in.
    #[arg(long, value_name = "DIR")]
    pub testdir: Option<PathBuf>,
    /// Validator document (YAML).
    #[arg(long, value_name = "PATH")]
    pub validators: Option<PathBuf>,
    /// Gate to run; repeat to select several.
    #[arg(long = "gate", value_name = "GATE", action = ArgAction::Append)]
    pub gates: Vec<String>,
    /// Comma-separated gates whose tests are skipped everywhere.
    #[arg(long, value_name = "GATES")]
    pub exclude_gates: Option<String>,
    /// Packages to run without a validator document; with no packages, the
    /// test directory is scanned for them.
    #[arg(long, value_name = "PACKAGE", num_args = 0 .., value_delimiter = ',')]
    pub gateless: Option<Vec<String>>,
    /// Interval between runs; zero runs once.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub run_interval: Option<Duration>,
    /// Run a single time and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub run_once: bool,
    /// Timeout applied to every unit, overriding declared timeouts.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,
    /// Timeout for units that declare none.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub default_timeout: Option<Duration>,
    /// Units run in parallel.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
    /// Root directory for per-run output.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
    /// Network name shown on the result tree.
    #[arg(long, value_name = "NAME")]
    pub network: Option<String>,
}

impl Cli {
    /// Converts the parsed flags into configuration overrides.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        let gateless: Vec<String> = self
            .gateless
            .iter()
            .flatten()
            .map(|package| package.trim().to_string())
            .filter(|package| !package.is_empty())
            .collect();
        ConfigOverrides {
            discover: self.gateless.is_some() && gateless.is_empty(),
            testdir: self.testdir.clone(),
            validators: self.validators.clone(),
            gates: self.gates.clone(),
            exclude_gates: self.exclude_gates.as_deref().map(split_gate_list).unwrap_or_default(),
            gateless,
            concurrency: self.concurrency,
            default_timeout: self.default_timeout,
            timeout: self.timeout,
            network: self.network.clone(),
            run_interval: self.run_interval,
            run_once: self.run_once,
            log_dir: self.log_dir.clone(),
        }
    }
}
