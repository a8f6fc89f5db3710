// crates/gate-acceptor-core/src/runtime/tree.rs
// ============================================================================
// Module: Gate Acceptor Result Tree
// Description: Arena-backed hierarchy of gates, suites, packages, and tests.
// Purpose: Assemble one run's results into a deduplicated, ordered tree.
// Dependencies: crate::core, serde, time
// ============================================================================

//! ## Overview
//! [`TreeBuilder`] turns the flat list of unit results for a run into a
//! [`TestTree`]. Nodes live in an arena and refer to each other through
//! [`NodeId`] handles, so the flat indices (`test_nodes`, `failed_nodes`)
//! share identity with the hierarchy.
//!
//! Invariants:
//! - `depth(child) == depth(parent) + 1` and the root has depth 0.
//! - Leaf execution order is strictly increasing in input order; subtests
//!   follow their parent depth-first in sorted name order.
//! - Containers list container children first (by name), then leaves (by
//!   execution order).
//! - The tree is never mutated after `build` returns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::core::TestResult;
use crate::core::TestStatus;
use crate::core::format_duration;
use crate::core::hierarchy::last_segment;

// ============================================================================
// SECTION: Prefix Symbols
// ============================================================================

/// Connector for a node with siblings after it.
pub const TREE_BRANCH: &str = "├── ";
/// Connector for the last node among its siblings.
pub const TREE_LAST_BRANCH: &str = "└── ";
/// Indentation under an ancestor that has siblings after it.
pub const TREE_CONTINUE: &str = "│   ";
/// Indentation under an ancestor that was last.
pub const TREE_INDENT: &str = "    ";

/// Builds an ASCII tree prefix.
///
/// `depth` counts levels below the first visible level; `parent_is_last`
/// lists, outermost first, whether each ancestor was the last sibling.
#[must_use]
pub fn build_tree_prefix(depth: usize, is_last: bool, parent_is_last: &[bool]) -> String {
    if depth == 0 {
        return String::new();
    }
    let mut prefix = String::new();
    for level in 0..depth - 1 {
        if parent_is_last.get(level).copied().unwrap_or(false) {
            prefix.push_str(TREE_INDENT);
        } else {
            prefix.push_str(TREE_CONTINUE);
        }
    }
    prefix.push_str(if is_last { TREE_LAST_BRANCH } else { TREE_BRANCH });
    prefix
}

// ============================================================================
// SECTION: Node Types
// ============================================================================

/// Handle to a node inside a [`TestTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Kind of tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Tree root.
    Root,
    /// Gate container.
    Gate,
    /// Suite container.
    Suite,
    /// Package container for run-all units.
    Package,
    /// Test leaf.
    Test,
    /// Subtest leaf.
    Subtest,
}

impl NodeKind {
    /// Returns true for root, gate, suite, and package nodes.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Root | Self::Gate | Self::Suite | Self::Package)
    }

    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Gate => "gate",
            Self::Suite => "suite",
            Self::Package => "package",
            Self::Test => "test",
            Self::Subtest => "subtest",
        }
    }
}

/// Aggregate counts for a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TreeStats {
    /// Test and subtest nodes in the subtree.
    pub total: usize,
    /// Passed leaves.
    pub passed: usize,
    /// Failed leaves.
    pub failed: usize,
    /// Skipped leaves.
    pub skipped: usize,
    /// Errored leaves.
    pub errored: usize,
    /// Leaves that timed out.
    pub timeouts: usize,
    /// `passed / total * 100`; only set on the tree's own stats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_rate: Option<f64>,
}

impl TreeStats {
    /// Counts one leaf.
    const fn record(&mut self, status: TestStatus, timed_out: bool) {
        self.total += 1;
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Skip => self.skipped += 1,
            TestStatus::Error => self.errored += 1,
        }
        if timed_out {
            self.timeouts += 1;
        }
    }

    /// Adds another subtree's counts.
    const fn absorb(&mut self, other: &Self) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errored += other.errored;
        self.timeouts += other.timeouts;
    }

    /// Returns the container status implied by these counts.
    const fn derived_status(&self) -> TestStatus {
        if self.failed + self.errored > 0 {
            TestStatus::Fail
        } else if self.total > 0 && self.skipped == self.total {
            TestStatus::Skip
        } else {
            TestStatus::Pass
        }
    }

    /// Returns the pass rate as a percentage, if any leaves exist.
    #[allow(clippy::cast_precision_loss, reason = "Leaf counts are far below 2^52.")]
    fn compute_pass_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.passed as f64 / self.total as f64 * 100.0)
    }
}

/// Single node in the result tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestTreeNode {
    /// Handle of this node.
    pub id: NodeId,
    /// Node kind.
    pub kind: NodeKind,
    /// Display name.
    pub name: String,
    /// Owning gate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
    /// Owning suite.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    /// Owning package.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Unit identifier for nodes built from a result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    /// Status; derived from the subtree for containers.
    pub status: TestStatus,
    /// Duration.
    pub duration: Duration,
    /// Error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the node timed out.
    pub timed_out: bool,
    /// Execution order for leaves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_order: Option<usize>,
    /// Distance from the root.
    pub depth: usize,
    /// Parent handle; `None` only for the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    /// Child handles in display order.
    pub children: Vec<NodeId>,
    /// Counts over this node's subtree.
    pub stats: TreeStats,
    /// Split test name for test and subtest nodes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hierarchy_path: Vec<String>,
}

impl TestTreeNode {
    /// Returns true for test and subtest nodes.
    #[must_use]
    pub const fn is_leaf_kind(&self) -> bool {
        !self.kind.is_container()
    }
}

// ============================================================================
// SECTION: Tree
// ============================================================================

/// Result hierarchy of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestTree {
    /// Node arena; index 0 is the root.
    nodes: Vec<TestTreeNode>,
    /// Root handle.
    pub root: NodeId,
    /// Run identifier.
    pub run_id: String,
    /// Network or environment name.
    pub network_name: String,
    /// Run start time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Run duration.
    pub duration: Duration,
    /// Tree-wide counts with pass rate.
    pub stats: TreeStats,
    /// Test and subtest nodes in execution order.
    pub test_nodes: Vec<NodeId>,
    /// Failed or errored leaves in execution order.
    pub failed_nodes: Vec<NodeId>,
}

impl TestTree {
    /// Returns the node behind a handle.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&TestTreeNode> {
        self.nodes.get(id.0)
    }

    /// Returns every node in arena order.
    #[must_use]
    pub fn nodes(&self) -> &[TestTreeNode] {
        &self.nodes
    }

    /// Iterates the nodes behind a list of handles.
    pub fn resolve<'a>(&'a self, ids: &'a [NodeId]) -> impl Iterator<Item = &'a TestTreeNode> + 'a {
        ids.iter().filter_map(|id| self.node(*id))
    }

    /// Visits nodes in pre-order; returning false skips a node's children.
    pub fn walk<F>(&self, mut visitor: F)
    where
        F: FnMut(&TestTreeNode) -> bool,
    {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if visitor(node) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
    }

    /// Returns the slash-joined path from the first level below the root.
    #[must_use]
    pub fn path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = self.node(id);
        while let Some(node) = current {
            if node.kind == NodeKind::Root {
                break;
            }
            segments.push(node.name.as_str());
            current = node.parent.and_then(|parent| self.node(parent));
        }
        segments.reverse();
        segments.join("/")
    }

    /// Returns true when a node is the last child of its parent.
    fn is_last_sibling(&self, id: NodeId) -> bool {
        self.node(id)
            .and_then(|node| node.parent)
            .and_then(|parent| self.node(parent))
            .is_none_or(|parent| parent.children.last() == Some(&id))
    }

    /// Returns the ASCII tree prefix for a node; root and gates get none.
    #[must_use]
    pub fn tree_prefix(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        let Some(parent) = node.parent.and_then(|parent| self.node(parent)) else {
            return String::new();
        };
        if parent.kind == NodeKind::Root {
            return String::new();
        }
        let mut parent_is_last = Vec::new();
        let mut current = Some(parent);
        while let Some(ancestor) = current {
            let grandparent = ancestor.parent.and_then(|id| self.node(id));
            match grandparent {
                Some(grand) if grand.kind != NodeKind::Root => {
                    parent_is_last.push(self.is_last_sibling(ancestor.id));
                    current = Some(grand);
                }
                _ => break,
            }
        }
        parent_is_last.reverse();
        build_tree_prefix(node.depth.saturating_sub(1), self.is_last_sibling(id), &parent_is_last)
    }

    /// Renders the tree as indented text, one node per line.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        self.walk(|node| {
            if node.kind == NodeKind::Root {
                return true;
            }
            let prefix = self.tree_prefix(node.id);
            let _ = write!(out, "{prefix}{} {}", status_glyph(node.status), node.name);
            if node.is_leaf_kind() {
                let _ = write!(out, " ({})", format_duration(node.duration));
                if node.timed_out {
                    out.push_str(" [TIMEOUT]");
                }
            } else {
                let stats = node.stats;
                let _ = write!(
                    out,
                    " [{} tests, {} passed, {} failed]",
                    stats.total,
                    stats.passed,
                    stats.failed + stats.errored
                );
            }
            out.push('\n');
            true
        });
        out
    }
}

/// Returns a one-character status marker.
const fn status_glyph(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "✓",
        TestStatus::Fail => "✗",
        TestStatus::Skip => "⊝",
        TestStatus::Error => "⚠",
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds [`TestTree`] values from unit results.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    /// Fixed run timestamp; defaults to now.
    timestamp: Option<OffsetDateTime>,
    /// Fixed run duration; defaults to the sum of kept unit durations.
    duration: Option<Duration>,
}

/// Container lookup key: parent, kind, name.
type ContainerKey = (NodeId, NodeKind, String);

/// Owner labels copied onto every node built for one result.
struct Labels {
    /// Gate name.
    gate: String,
    /// Suite name.
    suite: Option<String>,
    /// Package locator.
    package: String,
}

impl TreeBuilder {
    /// Creates a builder with default timestamp and duration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the run timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fixes the run duration.
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Builds the tree for one run.
    #[must_use]
    pub fn build(&self, results: &[TestResult], run_id: &str, network_name: &str) -> TestTree {
        let kept = dedup_results(results);
        let mut arena = Arena::new();
        let mut order = 0usize;

        for result in &kept {
            let labels = Labels {
                gate: result.metadata.gate.clone(),
                suite: result.metadata.suite.clone(),
                package: result.metadata.package.clone(),
            };
            let mut parent = arena.container(arena.root(), NodeKind::Gate, &labels.gate, &labels);
            if let Some(suite) = &labels.suite {
                parent = arena.container(parent, NodeKind::Suite, suite, &labels);
            }

            if !result.metadata.run_all {
                let name = result.metadata.func_name.clone().unwrap_or_else(|| labels.package.clone());
                let leaf = arena.leaf(parent, NodeKind::Test, name, result, &labels, &mut order);
                arena.subtests(leaf, &result.sub_tests, &labels, &mut order);
                continue;
            }

            let package = arena.container(parent, NodeKind::Package, &labels.package, &labels);
            if result.sub_tests.is_empty() {
                let name = last_segment(&labels.package).to_string();
                arena.leaf(package, NodeKind::Test, name, result, &labels, &mut order);
            } else {
                arena.annotate(package, result);
                arena.subtests(package, &result.sub_tests, &labels, &mut order);
            }
        }

        arena.compute_stats();
        arena.sort_children();

        let mut test_nodes: Vec<NodeId> =
            arena.nodes.iter().filter(|node| node.is_leaf_kind()).map(|node| node.id).collect();
        test_nodes.sort_by_key(|id| arena.nodes[id.0].execution_order);
        let failed_nodes =
            test_nodes.iter().copied().filter(|id| arena.nodes[id.0].status.is_failure()).collect();

        let mut stats = arena.nodes[0].stats;
        stats.pass_rate = stats.compute_pass_rate();
        let duration = self
            .duration
            .unwrap_or_else(|| kept.iter().map(|result| result.duration).sum());

        TestTree {
            nodes: arena.nodes,
            root: NodeId(0),
            run_id: run_id.to_string(),
            network_name: network_name.to_string(),
            timestamp: self.timestamp.unwrap_or_else(OffsetDateTime::now_utc),
            duration,
            stats,
            test_nodes,
            failed_nodes,
        }
    }
}

/// Drops individual units superseded by a run-all unit's subtest of the
/// same name in the same package.
fn dedup_results(results: &[TestResult]) -> Vec<&TestResult> {
    let individual: HashSet<(&str, &str)> = results
        .iter()
        .filter(|result| !result.metadata.run_all)
        .filter_map(|result| {
            result
                .metadata
                .func_name
                .as_deref()
                .map(|func| (result.metadata.package.as_str(), func))
        })
        .collect();

    let mut covered = HashSet::new();
    for result in results.iter().filter(|result| result.metadata.run_all) {
        for name in result.sub_tests.keys() {
            let key = (result.metadata.package.as_str(), name.as_str());
            if individual.contains(&key) {
                covered.insert(key);
            }
        }
    }

    results
        .iter()
        .filter(|result| {
            result.metadata.run_all
                || !result
                    .metadata
                    .func_name
                    .as_deref()
                    .is_some_and(|func| covered.contains(&(result.metadata.package.as_str(), func)))
        })
        .collect()
}

// ============================================================================
// SECTION: Arena
// ============================================================================

/// Mutable node storage used while building.
struct Arena {
    /// Nodes; parents always precede their children.
    nodes: Vec<TestTreeNode>,
    /// Container lookup by parent, kind, and name.
    containers: HashMap<ContainerKey, NodeId>,
}

impl Arena {
    /// Creates an arena holding only the root.
    fn new() -> Self {
        let root = blank_node(NodeId(0), NodeKind::Root, String::new(), None, 0);
        Self {
            nodes: vec![root],
            containers: HashMap::new(),
        }
    }

    /// Returns the root handle.
    const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Appends a node under `parent` and returns its handle.
    fn push(&mut self, parent: NodeId, kind: NodeKind, name: String, labels: &Labels) -> NodeId {
        let id = NodeId(self.nodes.len());
        let depth = self.nodes[parent.0].depth + 1;
        let mut node = blank_node(id, kind, name, Some(parent), depth);
        node.gate = Some(labels.gate.clone());
        node.suite = match kind {
            NodeKind::Gate => None,
            _ => labels.suite.clone(),
        };
        node.package = match kind {
            NodeKind::Gate | NodeKind::Suite => None,
            _ => Some(labels.package.clone()),
        };
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Returns the container for `(parent, kind, name)`, creating it on first use.
    fn container(&mut self, parent: NodeId, kind: NodeKind, name: &str, labels: &Labels) -> NodeId {
        let key = (parent, kind, name.to_string());
        if let Some(id) = self.containers.get(&key) {
            return *id;
        }
        let id = self.push(parent, kind, name.to_string(), labels);
        self.containers.insert(key, id);
        id
    }

    /// Adds a leaf built from a result and stamps its execution order.
    fn leaf(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        name: String,
        result: &TestResult,
        labels: &Labels,
        order: &mut usize,
    ) -> NodeId {
        let id = self.push(parent, kind, name, labels);
        let node = &mut self.nodes[id.0];
        node.unit_id = Some(result.metadata.id.clone());
        node.status = result.status;
        node.duration = result.duration;
        node.error.clone_from(&result.error);
        node.timed_out = result.timed_out;
        node.hierarchy_path.clone_from(&result.hierarchy_path);
        node.execution_order = Some(*order);
        *order += 1;
        id
    }

    /// Adds nested subtests below `parent`, depth-first in name order.
    fn subtests(
        &mut self,
        parent: NodeId,
        subtests: &BTreeMap<String, TestResult>,
        labels: &Labels,
        order: &mut usize,
    ) {
        for (name, sub) in subtests {
            let display = last_segment(name).to_string();
            let id = self.leaf(parent, NodeKind::Subtest, display, sub, labels, order);
            self.subtests(id, &sub.sub_tests, labels, order);
        }
    }

    /// Copies a run-all result's duration and error onto its package container.
    fn annotate(&mut self, package: NodeId, result: &TestResult) {
        let node = &mut self.nodes[package.0];
        node.unit_id = Some(result.metadata.id.clone());
        node.duration = result.duration;
        node.error.clone_from(&result.error);
        node.timed_out = result.timed_out;
    }

    /// Fills subtree stats bottom-up and derives container statuses.
    fn compute_stats(&mut self) {
        for index in (0..self.nodes.len()).rev() {
            let mut stats = TreeStats::default();
            for child in &self.nodes[index].children {
                stats.absorb(&self.nodes[child.0].stats);
            }
            let node = &mut self.nodes[index];
            if node.is_leaf_kind() {
                stats.record(node.status, node.timed_out);
            } else {
                node.status = stats.derived_status();
            }
            node.stats = stats;
        }
    }

    /// Orders children: containers by name, then leaves by execution order.
    fn sort_children(&mut self) {
        for index in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[index].children);
            children.sort_by(|left, right| {
                let left = &self.nodes[left.0];
                let right = &self.nodes[right.0];
                match (left.kind.is_container(), right.kind.is_container()) {
                    (true, false) => std::cmp::Ordering::Less,
                    (false, true) => std::cmp::Ordering::Greater,
                    (true, true) => left.name.cmp(&right.name),
                    (false, false) => left.execution_order.cmp(&right.execution_order),
                }
            });
            self.nodes[index].children = children;
        }
    }
}

/// Creates a node with default status and no labels.
fn blank_node(
    id: NodeId,
    kind: NodeKind,
    name: String,
    parent: Option<NodeId>,
    depth: usize,
) -> TestTreeNode {
    TestTreeNode {
        id,
        kind,
        name,
        gate: None,
        suite: None,
        package: None,
        unit_id: None,
        status: TestStatus::Pass,
        duration: Duration::ZERO,
        error: None,
        timed_out: false,
        execution_order: None,
        depth,
        parent,
        children: Vec::new(),
        stats: TreeStats::default(),
        hierarchy_path: Vec::new(),
    }
}
