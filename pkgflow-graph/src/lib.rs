//! Name-keyed package dependency graph and processing-order resolver.
//!
//! This crate turns a mapping of package name to direct dependency names into
//! a deterministic install order in which every dependency comes before the
//! packages that require it.
//!
//! # Features
//!
//! - Forward (dependencies) and reverse (dependents) edges
//! - In-degree and out-degree per node
//! - Implicit leaves: dependency targets that never appear as a key
//! - Deterministic resolution, independent of map/set iteration order
//! - Cycle reporting as a separate diagnostic
//! - Content fingerprint of the edge set
//! - Optional serde support
//!
//! # Example
//!
//! ```
//! use pkgflow_graph::DependencyGraph;
//!
//! let graph = DependencyGraph::from_edges([
//!     ("a", vec!["b", "c"]),
//!     ("b", vec!["c"]),
//!     ("c", vec![]),
//! ]);
//!
//! let order = graph.resolve();
//! assert_eq!(order.as_slice(), ["c", "b", "a"]);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Node identifier in the graph.
///
/// Ids are indices into the lexicographically sorted node universe, so the
/// same input always produces the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Error types for graph lookups.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Package '{0}' not found in graph")]
    NodeNotFound(String),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Package dependency graph.
///
/// An edge `A -> B` means "A depends on B", so B must be processed first.
/// Every name mentioned as a dependency target is part of the node universe,
/// even when it never appears as a key of the input mapping.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, NodeId>,
    // Direct dependencies, deduplicated and sorted by id
    forward: Vec<Vec<NodeId>>,
    // Direct dependents, deduplicated and sorted by id
    reverse: Vec<Vec<NodeId>>,
}

impl DependencyGraph {
    /// Build a graph from `(package, dependencies)` pairs.
    ///
    /// Repeated keys are merged, duplicate edges collapse into one, and
    /// dangling dependency names become implicit leaves.
    pub fn from_edges<I, N, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let pairs: Vec<(String, Vec<String>)> = edges
            .into_iter()
            .map(|(name, deps)| (name.into(), deps.into_iter().map(Into::into).collect()))
            .collect();

        let universe: BTreeSet<&str> = pairs
            .iter()
            .flat_map(|(name, deps)| std::iter::once(name.as_str()).chain(deps.iter().map(String::as_str)))
            .collect();

        let names: Vec<String> = universe.into_iter().map(str::to_string).collect();
        let index: HashMap<String, NodeId> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), NodeId(i)))
            .collect();

        let mut forward: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); names.len()];
        let mut reverse: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); names.len()];

        for (name, deps) in &pairs {
            let from = index[name];
            for dep in deps {
                let to = index[dep];
                let _ = forward[from.0].insert(to);
                let _ = reverse[to.0].insert(from);
            }
        }

        Self {
            names,
            index,
            forward: forward.into_iter().map(|s| s.into_iter().collect()).collect(),
            reverse: reverse.into_iter().map(|s| s.into_iter().collect()).collect(),
        }
    }

    /// Number of nodes, including implicit leaves.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.forward.iter().map(Vec::len).sum()
    }

    /// All node names in lexicographic order.
    #[must_use]
    pub fn nodes(&self) -> &[String] {
        &self.names
    }

    /// Whether a package is part of the node universe.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up the id of a package.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the package is unknown.
    pub fn id(&self, name: &str) -> GraphResult<NodeId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))
    }

    /// Direct dependencies of a package, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the package is unknown.
    pub fn dependencies(&self, name: &str) -> GraphResult<Vec<&str>> {
        let id = self.id(name)?;
        Ok(self.forward[id.0].iter().map(|d| self.name(*d)).collect())
    }

    /// Direct dependents of a package, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the package is unknown.
    pub fn dependents(&self, name: &str) -> GraphResult<Vec<&str>> {
        let id = self.id(name)?;
        Ok(self.reverse[id.0].iter().map(|d| self.name(*d)).collect())
    }

    /// Number of direct dependencies.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the package is unknown.
    pub fn out_degree(&self, name: &str) -> GraphResult<usize> {
        self.id(name).map(|id| self.forward[id.0].len())
    }

    /// Number of direct dependents.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the package is unknown.
    pub fn in_degree(&self, name: &str) -> GraphResult<usize> {
        self.id(name).map(|id| self.reverse[id.0].len())
    }

    fn name(&self, id: NodeId) -> &str {
        &self.names[id.0]
    }

    /// Resolve a processing order.
    ///
    /// Packages without dependencies come first in lexicographic order. The
    /// remaining packages are visited in ascending out-degree (ties broken by
    /// name); each visit walks its dependencies depth-first in the same order
    /// and emits nodes in post-order, so dependencies precede dependents.
    ///
    /// Always returns a permutation of the node universe. Members of a cycle
    /// are emitted once each, but the order cannot satisfy every edge of the
    /// cycle; use [`DependencyGraph::find_cycles`] to flag them.
    #[must_use]
    pub fn resolve(&self) -> ProcessingOrder {
        let n = self.names.len();
        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);

        // Seed: everything that can be processed immediately
        for (i, deps) in self.forward.iter().enumerate() {
            if deps.is_empty() {
                placed[i] = true;
                order.push(NodeId(i));
            }
        }

        let by_priority = |a: &NodeId, b: &NodeId| {
            self.forward[a.0]
                .len()
                .cmp(&self.forward[b.0].len())
                .then_with(|| self.names[a.0].cmp(&self.names[b.0]))
        };

        let children: Vec<Vec<NodeId>> = self
            .forward
            .iter()
            .map(|deps| {
                let mut deps = deps.clone();
                deps.sort_by(by_priority);
                deps
            })
            .collect();

        let mut remaining: Vec<NodeId> = (0..n).map(NodeId).filter(|id| !placed[id.0]).collect();
        remaining.sort_by(by_priority);

        // Seeds have nothing left to visit
        let mut visited = placed.clone();
        let mut completion = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = Vec::new();

        for start in remaining {
            if visited[start.0] {
                continue;
            }
            visited[start.0] = true;
            stack.push((start, 0));

            while let Some((node, next)) = stack.last_mut() {
                if let Some(&child) = children[node.0].get(*next) {
                    *next += 1;
                    if !visited[child.0] {
                        visited[child.0] = true;
                        stack.push((child, 0));
                    }
                } else {
                    completion.push(*node);
                    let _ = stack.pop();
                }
            }
        }

        for id in completion {
            if !placed[id.0] {
                placed[id.0] = true;
                order.push(id);
            }
        }

        ProcessingOrder(order.into_iter().map(|id| self.names[id.0].clone()).collect())
    }

    /// Find dependency cycles.
    ///
    /// Each cycle is reported once, as the sequence of packages along the
    /// dependency path that closes it. Detection is iterative and visits
    /// nodes in name order, so the result is deterministic.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let n = self.names.len();
        let mut cycles = Vec::new();
        let mut visited = vec![false; n];
        let mut on_path = vec![false; n];
        let mut path: Vec<NodeId> = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = Vec::new();

        for start in 0..n {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            on_path[start] = true;
            path.push(NodeId(start));
            stack.push((NodeId(start), 0));

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                if let Some(&dep) = self.forward[node.0].get(*next) {
                    *next += 1;
                    if on_path[dep.0] {
                        if let Some(pos) = path.iter().position(|&id| id == dep) {
                            cycles.push(path[pos..].iter().map(|id| self.names[id.0].clone()).collect());
                        }
                    } else if !visited[dep.0] {
                        visited[dep.0] = true;
                        on_path[dep.0] = true;
                        path.push(dep);
                        stack.push((dep, 0));
                    }
                } else {
                    on_path[node.0] = false;
                    let _ = path.pop();
                    let _ = stack.pop();
                }
            }
        }

        cycles
    }

    /// SHA-256 fingerprint of the edge set.
    ///
    /// Two graphs with the same nodes and edges share a fingerprint no
    /// matter how their input was ordered.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (i, name) in self.names.iter().enumerate() {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            for dep in &self.forward[i] {
                hasher.update(self.names[dep.0].as_bytes());
                hasher.update([1u8]);
            }
            hasher.update([2u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Total order over the packages of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ProcessingOrder(Vec<String>);

impl ProcessingOrder {
    /// Package names in processing order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Iterate over package names in processing order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the order is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of a package in the order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }

    /// Edges `(dependent, dependency)` whose dependency is placed after the
    /// dependent. Empty for every acyclic graph.
    #[must_use]
    pub fn violations(&self, graph: &DependencyGraph) -> Vec<(String, String)> {
        let positions: HashMap<&str, usize> =
            self.0.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();

        let mut violations = Vec::new();
        for (i, name) in graph.names.iter().enumerate() {
            for dep in &graph.forward[i] {
                let dep_name = graph.name(*dep);
                if let (Some(a), Some(b)) = (positions.get(name.as_str()), positions.get(dep_name))
                    && b > a
                {
                    violations.push((name.clone(), dep_name.to_string()));
                }
            }
        }
        violations
    }

    /// Keep only the packages accepted by `keep`, preserving their order.
    ///
    /// Dropping packages never reorders the rest, so the
    /// dependency-before-dependent property of the remaining packages holds.
    #[must_use]
    pub fn retain<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        self.0.retain(|name| keep(name));
        self
    }

    /// Consume into the underlying vector.
    #[must_use]
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl<'a> IntoIterator for &'a ProcessingOrder {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Resolve a processing order straight from `(package, dependencies)` pairs.
///
/// Shorthand for [`DependencyGraph::from_edges`] followed by
/// [`DependencyGraph::resolve`].
pub fn resolve<I, N, D>(edges: I) -> ProcessingOrder
where
    I: IntoIterator<Item = (N, D)>,
    N: Into<String>,
    D: IntoIterator,
    D::Item: Into<String>,
{
    DependencyGraph::from_edges(edges).resolve()
}
