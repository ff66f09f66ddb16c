//! Dependency graph of migration ids, used for cycle detection

use crate::error::{CoreError, CoreResult};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// A directed graph of migration dependencies
#[derive(Debug)]
pub struct DependencyGraph {
    /// The underlying graph
    graph: DiGraph<String, ()>,

    /// Map from migration id to node index
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Add a migration to the graph
    pub fn add_migration(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(id) {
            idx
        } else {
            let idx = self.graph.add_node(id.to_string());
            self.node_map.insert(id.to_string(), idx);
            idx
        }
    }

    /// Add a dependency edge (from depends on to)
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let from_idx = self.add_migration(from);
        let to_idx = self.add_migration(to);
        // Edge goes from dependency to dependent so topological order is dependencies first
        self.graph.add_edge(to_idx, from_idx, ());
    }

    /// Build the graph from `(id, dependencies)` pairs.
    ///
    /// Every dependency must name a migration in the set.
    pub fn build<'a, I>(migrations: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let entries: Vec<(&str, &[String])> = migrations.into_iter().collect();
        let mut graph = Self::new();

        for (id, _) in &entries {
            graph.add_migration(id);
        }

        for (id, deps) in &entries {
            for dep in deps.iter() {
                if !graph.contains(dep) {
                    return Err(CoreError::validation(
                        *id,
                        format!("depends on unknown migration '{}'", dep),
                    ));
                }
                graph.add_dependency(id, dep);
            }
        }

        Ok(graph)
    }

    /// Validate the graph has no cycles
    pub fn validate(&self) -> CoreResult<()> {
        self.topological_order().map(|_| ())
    }

    /// Ids in an order where dependencies come first
    pub fn topological_order(&self) -> CoreResult<Vec<String>> {
        match toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .into_iter()
                .map(|idx| self.graph[idx].clone())
                .collect()),
            Err(cycle) => Err(CoreError::Cycle {
                cycle: self.find_cycle_path(cycle.node_id()),
            }),
        }
    }

    /// Find a cycle path starting from a node for error reporting
    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let mut path: Vec<String> = vec![self.graph[start].clone()];
        let mut current = start;
        let mut visited = HashSet::new();
        visited.insert(current);

        while let Some(edge) = self.graph.edges(current).next() {
            let target = edge.target();
            path.push(self.graph[target].clone());

            if target == start || visited.contains(&target) {
                break;
            }

            visited.insert(target);
            current = target;
        }

        path.join(" -> ")
    }

    fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
