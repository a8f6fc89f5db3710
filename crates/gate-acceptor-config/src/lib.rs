// gate-acceptor-config/src/lib.rs
// ============================================================================
// Module: Gate Acceptor Config Library
// Description: Runtime config model, validation, and run snapshots.
// Purpose: Single source of truth for gate-acceptor.toml semantics.
// Dependencies: gate-acceptor-core, serde, toml
// ============================================================================

//! ## Overview
//! `gate-acceptor-config` defines the runtime configuration for the
//! acceptance-test runner: where tests live, how units are executed, how often
//! runs happen, and where logs go. Validation is strict and fails closed; the
//! CLI layers its flag overrides on top before validating.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod snapshot;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use snapshot::EffectiveConfigSnapshot;
