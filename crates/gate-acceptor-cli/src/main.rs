// crates/gate-acceptor-cli/src/main.rs
// ============================================================================
// Module: Gate Acceptor CLI Entry Point
// Description: Parses flags, runs the configured schedule, and exits.
// Purpose: Map run outcomes and errors to process exit codes.
// Dependencies: clap, gate-acceptor-cli, tokio
// ============================================================================

//! ## Overview
//! Exit code 0 means every unit passed, 1 means a unit failed or timed out,
//! and 2 means configuration or runtime errors stopped the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use gate_acceptor_cli::App;
use gate_acceptor_cli::Cli;
use gate_acceptor_cli::CliError;
use gate_acceptor_cli::CliResult;
use gate_acceptor_cli::EXIT_ERROR;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => emit_error(&err),
    }
}

/// Builds the pipeline and executes it.
async fn run() -> CliResult<u8> {
    let cli = Cli::parse();
    App::build(&cli)?.execute().await
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Reports an error on stderr and returns the error exit code.
fn emit_error(error: &CliError) -> ExitCode {
    let _ = write_stderr_line(&format!("gate-acceptor: {error}"));
    ExitCode::from(EXIT_ERROR)
}
