//! Dependency graph construction and sibling-group ordering
//!
//! The graph is loaded once into an in-memory adjacency structure and all
//! reachability questions are answered iteratively over that structure, so
//! cycle checks cost O(V+E) regardless of how the edges are stored.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while building or ordering a dependency graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Edge {prerequisite} -> {dependent} in {unit} would create a cycle")]
    CycleRejected {
        unit: String,
        prerequisite: String,
        dependent: String,
    },

    #[error("Dependency graph for {unit} is cyclic: no execution order exists for {remaining} remaining node(s)")]
    CyclicGraph { unit: String, remaining: usize },

    #[error("Corrupt dependency graph for {unit}: edge references unknown node {node}")]
    UnknownNode { unit: String, node: Uuid },

    #[error("Corrupt dependency graph for {unit}: {node} cannot be its own prerequisite")]
    SelfDependency { unit: String, node: String },
}

/// A validated directed acyclic graph over a set of nodes scoped to one
/// compilation unit (one pipeline's steps, or the pipeline-inclusion graph).
///
/// Edges point from prerequisite to dependent. Nodes carry display names
/// used for diagnostics and for the stable within-group ordering.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    unit: String,
    names: BTreeMap<Uuid, String>,
    /// dependent -> prerequisites
    upstream: HashMap<Uuid, HashSet<Uuid>>,
    /// prerequisite -> dependents
    downstream: HashMap<Uuid, HashSet<Uuid>>,
}

impl DependencyGraph {
    /// Create an edgeless graph over the given `(id, display name)` nodes
    pub fn new(unit: impl Into<String>, nodes: impl IntoIterator<Item = (Uuid, String)>) -> Self {
        Self {
            unit: unit.into(),
            names: nodes.into_iter().collect(),
            upstream: HashMap::new(),
            downstream: HashMap::new(),
        }
    }

    /// Build a graph from an already-stored edge set, asserting it is still
    /// acyclic. Unknown nodes and self-edges are treated as corruption.
    pub fn from_edges(
        unit: impl Into<String>,
        nodes: impl IntoIterator<Item = (Uuid, String)>,
        edges: &[(Uuid, Uuid)],
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new(unit, nodes);
        for (prerequisite, dependent) in edges {
            graph.check_endpoints(*prerequisite, *dependent)?;
            graph.insert_edge(*prerequisite, *dependent);
        }
        // A stored edge set may have been corrupted after each edge was
        // individually accepted; deriving the groups proves a total order
        // still exists.
        graph.ordered_groups()?;
        Ok(graph)
    }

    /// Number of nodes in the graph
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Whether the graph knows the given node
    pub fn contains(&self, node: Uuid) -> bool {
        self.names.contains_key(&node)
    }

    /// Add a prerequisite -> dependent edge, rejecting it before commit if
    /// the dependent is already a (transitive) prerequisite of the
    /// prerequisite, which would close a cycle.
    pub fn add_edge(&mut self, prerequisite: Uuid, dependent: Uuid) -> Result<(), GraphError> {
        self.check_endpoints(prerequisite, dependent)?;
        if self.reachable_downstream(dependent).contains(&prerequisite) {
            return Err(GraphError::CycleRejected {
                unit: self.unit.clone(),
                prerequisite: self.display(prerequisite),
                dependent: self.display(dependent),
            });
        }
        self.insert_edge(prerequisite, dependent);
        Ok(())
    }

    /// Nodes eligible to become a prerequisite of `node`: every node except
    /// `node` itself and the nodes for which `node` is already a transitive
    /// prerequisite. Sorted by display name.
    pub fn available_prerequisites(&self, node: Uuid) -> Result<Vec<Uuid>, GraphError> {
        if !self.contains(node) {
            return Err(GraphError::UnknownNode {
                unit: self.unit.clone(),
                node,
            });
        }
        let blocked = self.reachable_downstream(node);
        let mut eligible: Vec<Uuid> = self
            .names
            .keys()
            .copied()
            .filter(|candidate| *candidate != node && !blocked.contains(candidate))
            .collect();
        eligible.sort_by(|a, b| self.names[a].cmp(&self.names[b]).then(a.cmp(b)));
        Ok(eligible)
    }

    /// Partition the graph into an ordered sequence of sibling groups.
    ///
    /// Group 0 holds every node with no prerequisites; each subsequent group
    /// holds the not-yet-placed nodes whose prerequisites all belong to
    /// earlier groups. Nodes within a group are mutually non-dependent and
    /// may run in any order; the within-group ordering is lexicographic by
    /// display name and carries no dependency meaning.
    pub fn ordered_groups(&self) -> Result<Vec<Vec<Uuid>>, GraphError> {
        let mut remaining: BTreeSet<Uuid> = self.names.keys().copied().collect();
        let mut placed: HashSet<Uuid> = HashSet::new();
        let mut groups = Vec::new();

        while !remaining.is_empty() {
            let mut group: Vec<Uuid> = remaining
                .iter()
                .filter(|node| {
                    self.upstream
                        .get(node)
                        .map_or(true, |prereqs| prereqs.iter().all(|p| placed.contains(p)))
                })
                .copied()
                .collect();

            if group.is_empty() {
                return Err(GraphError::CyclicGraph {
                    unit: self.unit.clone(),
                    remaining: remaining.len(),
                });
            }

            group.sort_by(|a, b| self.names[a].cmp(&self.names[b]).then(a.cmp(b)));
            for node in &group {
                placed.insert(*node);
                remaining.remove(node);
            }
            groups.push(group);
        }

        Ok(groups)
    }

    /// Every node reachable from `start` by walking dependent edges
    fn reachable_downstream(&self, start: Uuid) -> HashSet<Uuid> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<Uuid> = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if let Some(dependents) = self.downstream.get(&node) {
                for dependent in dependents {
                    if seen.insert(*dependent) {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
        seen
    }

    fn check_endpoints(&self, prerequisite: Uuid, dependent: Uuid) -> Result<(), GraphError> {
        for node in [prerequisite, dependent] {
            if !self.contains(node) {
                return Err(GraphError::UnknownNode {
                    unit: self.unit.clone(),
                    node,
                });
            }
        }
        if prerequisite == dependent {
            return Err(GraphError::SelfDependency {
                unit: self.unit.clone(),
                node: self.display(prerequisite),
            });
        }
        Ok(())
    }

    fn insert_edge(&mut self, prerequisite: Uuid, dependent: Uuid) {
        self.upstream
            .entry(dependent)
            .or_default()
            .insert(prerequisite);
        self.downstream
            .entry(prerequisite)
            .or_default()
            .insert(dependent);
    }

    fn display(&self, node: Uuid) -> String {
        self.names
            .get(&node)
            .cloned()
            .unwrap_or_else(|| node.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_nodes(names: &[&str]) -> Vec<(Uuid, String)> {
        names
            .iter()
            .map(|n| (Uuid::new_v4(), n.to_string()))
            .collect()
    }

    #[test]
    fn test_single_group_for_edgeless_graph() {
        let nodes = named_nodes(&["b", "a", "c"]);
        let graph = DependencyGraph::new("test", nodes.clone());

        let groups = graph.ordered_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
        // Lexicographic by display name
        assert_eq!(groups[0][0], nodes[1].0);
        assert_eq!(groups[0][1], nodes[0].0);
        assert_eq!(groups[0][2], nodes[2].0);
    }

    #[test]
    fn test_groups_partition_all_nodes() {
        let nodes = named_nodes(&["a", "b", "c", "d", "e"]);
        let ids: Vec<Uuid> = nodes.iter().map(|(id, _)| *id).collect();
        let mut graph = DependencyGraph::new("test", nodes);

        graph.add_edge(ids[0], ids[2]).unwrap();
        graph.add_edge(ids[1], ids[2]).unwrap();
        graph.add_edge(ids[2], ids[3]).unwrap();

        let groups = graph.ordered_groups().unwrap();
        let total: usize = groups.iter().map(Vec::len).sum();
        assert_eq!(total, 5);

        // No node may appear in more than one group
        let mut seen = HashSet::new();
        for group in &groups {
            for node in group {
                assert!(seen.insert(*node), "node appeared twice across groups");
            }
        }
    }

    #[test]
    fn test_no_prerequisite_in_same_or_later_group() {
        let nodes = named_nodes(&["a", "b", "c", "d"]);
        let ids: Vec<Uuid> = nodes.iter().map(|(id, _)| *id).collect();
        let mut graph = DependencyGraph::new("test", nodes);

        graph.add_edge(ids[0], ids[2]).unwrap();
        graph.add_edge(ids[1], ids[2]).unwrap();
        graph.add_edge(ids[1], ids[3]).unwrap();

        let groups = graph.ordered_groups().unwrap();
        let position: HashMap<Uuid, usize> = groups
            .iter()
            .enumerate()
            .flat_map(|(i, group)| group.iter().map(move |id| (*id, i)))
            .collect();

        for (prereq, dependent) in [(ids[0], ids[2]), (ids[1], ids[2]), (ids[1], ids[3])] {
            assert!(position[&prereq] < position[&dependent]);
        }
    }

    #[test]
    fn test_two_roots_one_joint_dependent() {
        let nodes = named_nodes(&["a", "b", "c"]);
        let ids: Vec<Uuid> = nodes.iter().map(|(id, _)| *id).collect();
        let mut graph = DependencyGraph::new("test", nodes);

        graph.add_edge(ids[0], ids[2]).unwrap();
        graph.add_edge(ids[1], ids[2]).unwrap();

        let groups = graph.ordered_groups().unwrap();
        assert_eq!(groups, vec![vec![ids[0], ids[1]], vec![ids[2]]]);
    }

    #[test]
    fn test_add_edge_rejects_cycle() {
        let nodes = named_nodes(&["a", "b", "c"]);
        let ids: Vec<Uuid> = nodes.iter().map(|(id, _)| *id).collect();
        let mut graph = DependencyGraph::new("test", nodes);

        graph.add_edge(ids[0], ids[1]).unwrap();
        graph.add_edge(ids[1], ids[2]).unwrap();

        let err = graph.add_edge(ids[2], ids[0]).unwrap_err();
        assert!(matches!(err, GraphError::CycleRejected { .. }));

        // The rejected edge must not have been committed
        assert!(graph.ordered_groups().is_ok());
    }

    #[test]
    fn test_add_edge_rejects_self_dependency() {
        let nodes = named_nodes(&["a"]);
        let id = nodes[0].0;
        let mut graph = DependencyGraph::new("test", nodes);

        let err = graph.add_edge(id, id).unwrap_err();
        assert!(matches!(err, GraphError::SelfDependency { .. }));
    }

    #[test]
    fn test_add_edge_rejects_unknown_node() {
        let nodes = named_nodes(&["a"]);
        let id = nodes[0].0;
        let mut graph = DependencyGraph::new("test", nodes);

        let err = graph.add_edge(id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode { .. }));
    }

    #[test]
    fn test_from_edges_detects_stored_cycle() {
        let nodes = named_nodes(&["a", "b"]);
        let ids: Vec<Uuid> = nodes.iter().map(|(id, _)| *id).collect();

        let err =
            DependencyGraph::from_edges("test", nodes, &[(ids[0], ids[1]), (ids[1], ids[0])])
                .unwrap_err();
        assert!(matches!(err, GraphError::CyclicGraph { remaining: 2, .. }));
    }

    #[test]
    fn test_available_prerequisites_excludes_self_and_downstream() {
        let nodes = named_nodes(&["a", "b", "c", "d"]);
        let ids: Vec<Uuid> = nodes.iter().map(|(id, _)| *id).collect();
        let mut graph = DependencyGraph::new("test", nodes);

        // a -> b -> c, d unrelated
        graph.add_edge(ids[0], ids[1]).unwrap();
        graph.add_edge(ids[1], ids[2]).unwrap();

        let eligible = graph.available_prerequisites(ids[0]).unwrap();
        assert!(!eligible.contains(&ids[0]), "must never include the node itself");
        assert!(!eligible.contains(&ids[1]), "direct dependent is ineligible");
        assert!(!eligible.contains(&ids[2]), "transitive dependent is ineligible");
        assert_eq!(eligible, vec![ids[3]]);
    }

    #[test]
    fn test_available_prerequisites_for_leaf_includes_everything_else() {
        let nodes = named_nodes(&["a", "b", "c"]);
        let ids: Vec<Uuid> = nodes.iter().map(|(id, _)| *id).collect();
        let mut graph = DependencyGraph::new("test", nodes);

        graph.add_edge(ids[0], ids[2]).unwrap();
        graph.add_edge(ids[1], ids[2]).unwrap();

        let eligible = graph.available_prerequisites(ids[2]).unwrap();
        assert_eq!(eligible, vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_diamond_dependencies_group_correctly() {
        // most <- {first, less, another_less}; {less, another_less} <- least
        let nodes = named_nodes(&["most", "first", "less", "another_less", "least", "free"]);
        let ids: Vec<Uuid> = nodes.iter().map(|(id, _)| *id).collect();
        let mut graph = DependencyGraph::new("test", nodes);

        graph.add_edge(ids[1], ids[0]).unwrap();
        graph.add_edge(ids[2], ids[0]).unwrap();
        graph.add_edge(ids[3], ids[0]).unwrap();
        graph.add_edge(ids[4], ids[2]).unwrap();
        graph.add_edge(ids[4], ids[3]).unwrap();

        let groups = graph.ordered_groups().unwrap();
        assert_eq!(groups.len(), 3);
        // Group 0: no incoming edges at all
        assert_eq!(groups[0], vec![ids[1], ids[5], ids[4]]);
        assert_eq!(groups[1], vec![ids[3], ids[2]]);
        assert_eq!(groups[2], vec![ids[0]]);
    }
}
