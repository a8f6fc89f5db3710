// crates/gate-acceptor-core/src/runtime/resolver.rs
// ============================================================================
// Module: Gate Acceptor Inheritance Resolver
// Description: Depth-first materialization of gate inheritance.
// Purpose: Merge parent tests and suites into each gate with cycle detection.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Each gate is resolved depth-first: parents are resolved before they are
//! merged in. The merge keeps the child's tests first, then appends each
//! parent's tests whose `(package, function)` key is not yet present.
//! Suites are imported from a parent only when the child has no suite of
//! that name.
//!
//! Invariants:
//! - The active DFS path is tracked per call; a gate already on the path is a
//!   cycle. Diamonds (two parents sharing an ancestor) are not cycles.
//! - Resolved gates are memoised for one call only, so repeated calls never
//!   share state and resolving a resolved config is a no-op.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;

use crate::core::ConfigError;
use crate::core::GateDescriptor;
use crate::core::TestDescriptor;
use crate::core::TestKey;

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Resolves inheritance for every gate, preserving declaration order.
///
/// # Errors
///
/// Returns [`ConfigError::Cycle`] on any transitive cycle,
/// [`ConfigError::MissingParent`] when a parent does not exist, and
/// [`ConfigError::Schema`] when gate IDs are duplicated.
pub fn resolve_gates(gates: &[GateDescriptor]) -> Result<Vec<GateDescriptor>, ConfigError> {
    let mut index = HashMap::with_capacity(gates.len());
    for gate in gates {
        if index.insert(gate.id.as_str(), gate).is_some() {
            return Err(ConfigError::Schema(format!("duplicate gate id '{}'", gate.id)));
        }
    }
    let mut resolver = Resolver {
        index,
        resolved: HashMap::new(),
    };
    let mut resolved = Vec::with_capacity(gates.len());
    for gate in gates {
        let mut path = Vec::new();
        resolved.push(resolver.resolve(&gate.id, &mut path)?);
    }
    Ok(resolved)
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Per-call resolution state.
struct Resolver<'a> {
    /// Declared gates by ID.
    index: HashMap<&'a str, &'a GateDescriptor>,
    /// Gates resolved during this call.
    resolved: HashMap<String, GateDescriptor>,
}

impl Resolver<'_> {
    /// Resolves one gate, recursing into its parents first.
    fn resolve(&mut self, id: &str, path: &mut Vec<String>) -> Result<GateDescriptor, ConfigError> {
        if path.iter().any(|active| active == id) {
            let mut cycle = path.clone();
            cycle.push(id.to_string());
            return Err(ConfigError::Cycle {
                path: cycle,
            });
        }
        if let Some(done) = self.resolved.get(id) {
            return Ok(done.clone());
        }
        let Some(&declared) = self.index.get(id) else {
            return Err(ConfigError::Schema(format!("unknown gate '{id}'")));
        };

        path.push(id.to_string());
        let mut merged = declared.clone();
        merged.tests = dedup_tests(&declared.tests);
        let mut keys: HashSet<TestKey> = merged.tests.iter().map(TestDescriptor::key).collect();
        let mut visited_parents = HashSet::new();

        for parent_id in &declared.inherits {
            if !self.index.contains_key(parent_id.as_str()) {
                return Err(ConfigError::MissingParent {
                    gate: id.to_string(),
                    parent: parent_id.clone(),
                });
            }
            if !visited_parents.insert(parent_id.as_str()) {
                continue;
            }
            let parent = self.resolve(parent_id, path)?;
            for test in parent.tests {
                if keys.insert(test.key()) {
                    merged.tests.push(test);
                }
            }
            for (name, suite) in parent.suites {
                merged.suites.entry(name).or_insert(suite);
            }
        }
        path.pop();

        self.resolved.insert(id.to_string(), merged.clone());
        Ok(merged)
    }
}

/// Removes repeated keys from a test list, keeping the first occurrence.
fn dedup_tests(tests: &[TestDescriptor]) -> Vec<TestDescriptor> {
    let mut seen = HashSet::new();
    tests.iter().filter(|test| seen.insert(test.key())).cloned().collect()
}
