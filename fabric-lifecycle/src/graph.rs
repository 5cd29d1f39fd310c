//! Dependency graph with cycle detection and resolution.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use fabric_primitives::ComponentId;

/// Directed dependency graph. An edge `a -> b` means `a` requires `b` to be
/// READY before becoming READY itself.
///
/// The graph is writer-exclusive; readers take snapshots.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<ComponentId, Vec<ComponentId>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the dependencies of a component, replacing previous edges.
    pub fn register_dependency(&mut self, component: ComponentId, dependencies: Vec<ComponentId>) {
        info!(component = %component, count = dependencies.len(), "dependencies registered");
        self.edges.insert(component, dependencies);
    }

    /// Returns the direct dependencies of a component.
    #[must_use]
    pub fn dependencies_of(&self, component: &ComponentId) -> Vec<ComponentId> {
        self.edges.get(component).cloned().unwrap_or_default()
    }

    /// Returns a snapshot of the adjacency map.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<ComponentId, Vec<ComponentId>> {
        self.edges.clone()
    }

    /// Detects cycles via depth-first search with path tracking.
    ///
    /// Each returned cycle repeats its first node at the end
    /// (`[x, y, z, x]`).
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<Vec<ComponentId>> {
        let mut cycles = Vec::new();
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        for node in self.edges.keys() {
            self.dfs(node, &mut visited, &mut path, &mut cycles);
        }

        cycles
    }

    fn dfs(
        &self,
        node: &ComponentId,
        visited: &mut HashSet<ComponentId>,
        path: &mut Vec<ComponentId>,
        cycles: &mut Vec<Vec<ComponentId>>,
    ) {
        if let Some(start) = path.iter().position(|entry| entry == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node.clone());
            cycles.push(cycle);
            return;
        }
        if visited.contains(node) {
            return;
        }

        visited.insert(node.clone());
        path.push(node.clone());
        for dependency in self.edges.get(node).into_iter().flatten() {
            self.dfs(dependency, visited, path, cycles);
        }
        path.pop();
    }

    /// Breaks detected cycles by removing the last edge of each discovered
    /// path, returning the removed edges.
    ///
    /// Repeated cycles after resolution imply misconfiguration; the caller
    /// reports but continues.
    pub fn resolve_cycles(&mut self) -> Vec<(ComponentId, ComponentId)> {
        let cycles = self.detect_cycles();
        if cycles.is_empty() {
            return Vec::new();
        }
        warn!(count = cycles.len(), "dependency cycles detected");

        let mut removed = Vec::new();
        for cycle in cycles {
            if cycle.len() < 2 {
                continue;
            }
            let from = cycle[cycle.len() - 2].clone();
            let to = cycle[cycle.len() - 1].clone();
            if let Some(dependencies) = self.edges.get_mut(&from) {
                if let Some(position) = dependencies.iter().position(|dep| dep == &to) {
                    dependencies.remove(position);
                    info!(from = %from, to = %to, "removed dependency edge to break cycle");
                    removed.push((from, to));
                }
            }
        }

        let remaining = self.detect_cycles();
        if remaining.is_empty() {
            info!("all dependency cycles resolved");
        } else {
            warn!(count = remaining.len(), "cycles remain after resolution");
        }

        removed
    }
}
