// crates/gate-acceptor-core/src/core/mod.rs
// ============================================================================
// Module: Gate Acceptor Core Types
// Description: Canonical configuration, metadata, and result structures.
// Purpose: Provide stable types shared by the resolver, runner, and sinks.
// Dependencies: serde, serde_yaml, time
// ============================================================================

//! ## Overview
//! Core types describe what gets run (gate descriptors, validator metadata)
//! and what came back (test results with nested subtests). They are the
//! source of truth for every sink and report built on top of the engine.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod duration;
pub mod hierarchy;
pub mod identifiers;
pub mod result;
pub mod validators;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use duration::DurationError;
pub use duration::format_duration;
pub use duration::parse_duration;
pub use hierarchy::last_segment;
pub use hierarchy::parse_test_name_hierarchy;
pub use identifiers::RunId;
pub use identifiers::unit_id;
pub use result::TestResult;
pub use result::TestStatus;
pub use result::ValidatorKind;
pub use result::ValidatorMetadata;
pub use validators::ConfigError;
pub use validators::GateDescriptor;
pub use validators::SuiteDescriptor;
pub use validators::TestDescriptor;
pub use validators::TestKey;
pub use validators::ValidatorConfig;
