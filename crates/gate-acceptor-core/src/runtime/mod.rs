// crates/gate-acceptor-core/src/runtime/mod.rs
// ============================================================================
// Module: Gate Acceptor Runtime
// Description: Inheritance resolution, unit registry, event parsing, result tree.
// Purpose: Turn declarations into units and unit output into a result tree.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The runtime pipeline is pure apart from package discovery:
//! [`resolve_gates`] materializes inheritance, [`Registry`] flattens gates
//! (or discovered packages) into ordered units, [`EventParser`] turns a
//! unit's event stream into a [`crate::TestResult`], and [`TreeBuilder`]
//! assembles all results of a run into a [`TestTree`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod discovery;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod tree;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use discovery::TEST_FILE_SUFFIX;
pub use discovery::discover_test_packages;
pub use discovery::test_root;
pub use parser::EventAction;
pub use parser::EventParser;
pub use parser::ParseReport;
pub use parser::TestEvent;
pub use registry::DEFAULT_TEST_TIMEOUT;
pub use registry::GATELESS_GATE;
pub use registry::Registry;
pub use registry::RegistrySettings;
pub use resolver::resolve_gates;
pub use tree::NodeId;
pub use tree::NodeKind;
pub use tree::TestTree;
pub use tree::TestTreeNode;
pub use tree::TreeBuilder;
pub use tree::TreeStats;
pub use tree::build_tree_prefix;
