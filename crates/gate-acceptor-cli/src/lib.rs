// crates/gate-acceptor-cli/src/lib.rs
// ============================================================================
// Module: Gate Acceptor CLI Library
// Description: Argument parsing and pipeline wiring for the gate-acceptor binary.
// Purpose: Keep the binary entry point thin and the wiring testable.
// Dependencies: clap, gate-acceptor-config, gate-acceptor-core, gate-acceptor-runner
// ============================================================================

//! ## Overview
//! [`args::Cli`] defines the flags, [`app::App`] builds and drives the run
//! pipeline. The binary in `main.rs` only parses, executes, and maps errors
//! to exit codes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod app;
pub mod args;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use app::App;
pub use app::CliError;
pub use app::CliResult;
pub use app::EXIT_ERROR;
pub use app::EXIT_FAIL;
pub use app::EXIT_PASS;
pub use args::Cli;
