// crates/gate-acceptor-core/src/lib.rs
// ============================================================================
// Module: Gate Acceptor Core Library
// Description: Public API surface for the Gate Acceptor core.
// Purpose: Expose config model, interfaces, and result-tree runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Gate Acceptor core owns the pure parts of the acceptance-test engine: the
//! gate/suite/test configuration model and its inheritance resolver, the
//! validator registry, the test-event parser, and the result-tree builder.
//! Nothing in this crate spawns processes or touches the network; the runner
//! crate drives these pieces and plugs in through [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::EventLog;
pub use interfaces::LogEvent;
pub use interfaces::LogLevel;
pub use interfaces::NoopEventLog;
pub use interfaces::RawOutputStore;
pub use interfaces::ResultSink;
pub use interfaces::SinkError;
pub use interfaces::StoreError;
pub use interfaces::raw_output_key;
pub use runtime::DEFAULT_TEST_TIMEOUT;
pub use runtime::EventAction;
pub use runtime::EventParser;
pub use runtime::GATELESS_GATE;
pub use runtime::NodeId;
pub use runtime::NodeKind;
pub use runtime::ParseReport;
pub use runtime::Registry;
pub use runtime::RegistrySettings;
pub use runtime::TestEvent;
pub use runtime::TestTree;
pub use runtime::TestTreeNode;
pub use runtime::TreeBuilder;
pub use runtime::TreeStats;
pub use runtime::TEST_FILE_SUFFIX;
pub use runtime::build_tree_prefix;
pub use runtime::discover_test_packages;
pub use runtime::resolve_gates;
pub use runtime::test_root;
