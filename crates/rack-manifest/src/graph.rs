//! Service dependency graph using `petgraph`.
//!
//! Builds a directed graph from service links and resolves a deterministic
//! start order: services are placed in repeated alphabetic passes, each pass
//! appending every service whose link targets are already placed.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use rack_common::error::ConfigError;

use crate::model::Manifest;

/// A dependency graph of services.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Edges point from a dependency to its dependent.
    graph: petgraph::Graph<String, ()>,
    /// Node of each service, in alphabetic order.
    nodes: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph of a manifest's links.
    #[must_use]
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut graph = Self::new();
        for name in manifest.names() {
            let _ = graph.add_service(name);
        }
        for service in manifest.services() {
            for link in &service.links {
                graph.add_dependency(&service.name, &link.target);
            }
        }
        graph
    }

    /// Adds a service node, returning the existing node if already present.
    pub fn add_service(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        let _ = self.nodes.insert(name.to_string(), idx);
        idx
    }

    /// Records that `dependent` links to `dependency`.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        let from = self.add_service(dependency);
        let to = self.add_service(dependent);
        if self.graph.find_edge(from, to).is_none() {
            let _ = self.graph.add_edge(from, to, ());
        }
    }

    /// Services `name` links to.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> BTreeSet<&str> {
        self.nodes.get(name).map_or_else(BTreeSet::new, |&idx| {
            self.graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|dep| self.graph[dep].as_str())
                .collect()
        })
    }

    /// Returns the start order: every service after all of its links, ties
    /// broken alphabetically.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Cycle`] naming every service that could not be
    /// placed.
    pub fn start_order(&self) -> Result<Vec<String>, ConfigError> {
        let mut order: Vec<String> = Vec::with_capacity(self.nodes.len());
        let mut placed: BTreeSet<&str> = BTreeSet::new();

        while order.len() < self.nodes.len() {
            let mut progress = false;
            for name in self.nodes.keys() {
                if placed.contains(name.as_str()) {
                    continue;
                }
                if self.dependencies(name).iter().all(|dep| placed.contains(dep)) {
                    let _ = placed.insert(name.as_str());
                    order.push(name.clone());
                    progress = true;
                }
            }

            if !progress {
                let services: Vec<String> = self
                    .nodes
                    .keys()
                    .filter(|name| !placed.contains(name.as_str()))
                    .cloned()
                    .collect();
                tracing::debug!(services = ?services, "dependency cycle detected");
                return Err(ConfigError::Cycle { services });
            }
        }

        Ok(order)
    }

    /// Returns the teardown order, the reverse of [`start_order`](Self::start_order).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Cycle`] as `start_order` does.
    pub fn teardown_order(&self) -> Result<Vec<String>, ConfigError> {
        let mut order = self.start_order()?;
        order.reverse();
        Ok(order)
    }
}

/// Start order of a manifest's services.
///
/// # Errors
///
/// Returns [`ConfigError::Cycle`] if the links form a cycle.
pub fn start_order(manifest: &Manifest) -> Result<Vec<String>, ConfigError> {
    DependencyGraph::from_manifest(manifest).start_order()
}
