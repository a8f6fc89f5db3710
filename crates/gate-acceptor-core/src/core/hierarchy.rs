// crates/gate-acceptor-core/src/core/hierarchy.rs
// ============================================================================
// Module: Gate Acceptor Test Name Hierarchy
// Description: Helpers for slash-separated subtest names.
// Purpose: Derive depth, path, and display names from `A/B/C` test names.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Test binaries name subtests by joining each level with `/`. Depth is the
//! number of separators between non-empty segments: `TestParent` is depth 0
//! and `TestParent/Sub1/SubSub` is depth 2.

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Separator between hierarchy levels in a test name.
pub const HIERARCHY_SEPARATOR: char = '/';

// ============================================================================
// SECTION: Functions
// ============================================================================

/// Splits a test name into its hierarchy path and returns `(depth, path)`.
///
/// Empty segments are dropped, so `"A//B"` parses like `"A/B"`. An empty
/// input yields `(0, [])`.
#[must_use]
pub fn parse_test_name_hierarchy(name: &str) -> (usize, Vec<String>) {
    let path: Vec<String> = name
        .split(HIERARCHY_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .collect();
    let depth = path.len().saturating_sub(1);
    (depth, path)
}

/// Returns the segment after the last separator, or the whole name.
#[must_use]
pub fn last_segment(name: &str) -> &str {
    name.trim_end_matches(HIERARCHY_SEPARATOR)
        .rsplit(HIERARCHY_SEPARATOR)
        .next()
        .unwrap_or(name)
}

/// Returns the name of the immediate parent, if the name is nested.
#[must_use]
pub fn parent_name(name: &str) -> Option<&str> {
    name.rfind(HIERARCHY_SEPARATOR).map(|index| &name[.. index]).filter(|parent| !parent.is_empty())
}
