use std::collections::{BTreeMap, BTreeSet};

use crate::config::NodeConfig;
use crate::errors::ValidationError;

/// Dependency relationships of a DAG pipeline.
///
/// Maps each node id to the ids it depends on. The map is ordered so that
/// every traversal of the graph is deterministic, which in turn makes level
/// computation and execution order reproducible across runs.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph(pub BTreeMap<String, Vec<String>>);

impl DependencyGraph {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_nodes(nodes: &[NodeConfig]) -> Self {
        let mut graph = BTreeMap::new();
        for node in nodes {
            graph.insert(node.id.clone(), node.dependencies.clone());
        }
        Self(graph)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compute execution levels with Kahn's algorithm.
    ///
    /// Level L contains every node whose dependencies all sit in levels
    /// `< L`; nodes within a level are sorted lexically so that scheduling
    /// order is deterministic. If the graph contains a cycle, the algorithm
    /// cannot consume every node and the leftover members are reported.
    pub fn kahn_levels(&self) -> Result<Vec<Vec<String>>, ValidationError> {
        let mut remaining: BTreeMap<&str, BTreeSet<&str>> = self
            .0
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.iter().map(String::as_str).collect()))
            .collect();

        let mut levels = Vec::new();
        loop {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                break;
            }

            for id in &ready {
                remaining.remove(*id);
            }
            for deps in remaining.values_mut() {
                for id in &ready {
                    deps.remove(*id);
                }
            }
            // BTreeMap iteration already yields the ready set in lexical order.
            levels.push(ready.into_iter().map(String::from).collect());
        }

        if !remaining.is_empty() {
            return Err(ValidationError::CyclicDependency {
                members: remaining.keys().map(|id| id.to_string()).collect(),
            });
        }

        Ok(levels)
    }

    /// Flat topological order (levels concatenated).
    pub fn topological_sort(&self) -> Result<Vec<String>, ValidationError> {
        Ok(self.kahn_levels()?.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(entries: &[(&str, &[&str])]) -> DependencyGraph {
        let mut map = BTreeMap::new();
        for (id, deps) in entries {
            map.insert(id.to_string(), deps.iter().map(|d| d.to_string()).collect());
        }
        DependencyGraph(map)
    }

    #[test]
    fn diamond_resolves_to_three_levels() {
        // a -> [b, c] -> d
        let g = graph(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
        ]);

        let levels = g.kahn_levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec!["a"]);
        assert_eq!(levels[1], vec!["b", "c"]);
        assert_eq!(levels[2], vec!["d"]);
    }

    #[test]
    fn levels_are_sorted_lexically() {
        let g = graph(&[("zeta", &[]), ("alpha", &[]), ("mid", &[])]);
        let levels = g.kahn_levels().unwrap();
        assert_eq!(levels, vec![vec!["alpha", "mid", "zeta"]]);
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let g = graph(&[("entry", &[]), ("a", &["entry", "c"]), ("b", &["a"]), ("c", &["b"])]);

        let err = g.kahn_levels().unwrap_err();
        match err {
            ValidationError::CyclicDependency { members } => {
                assert_eq!(members, vec!["a", "b", "c"]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn two_node_cycle_is_detected() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        assert!(g.kahn_levels().is_err());
    }

    #[test]
    fn topological_sort_respects_dependencies() {
        let g = graph(&[
            ("load", &[]),
            ("transform", &["load"]),
            ("merge", &["transform", "load"]),
        ]);

        let order = g.topological_sort().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("load") < pos("transform"));
        assert!(pos("transform") < pos("merge"));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn empty_graph_yields_no_levels() {
        let g = DependencyGraph::new();
        assert!(g.kahn_levels().unwrap().is_empty());
    }

    #[test]
    fn multiple_entrypoints_share_level_zero() {
        let g = graph(&[("in1", &[]), ("in2", &[]), ("merge", &["in1", "in2"])]);
        let levels = g.kahn_levels().unwrap();
        assert_eq!(levels[0], vec!["in1", "in2"]);
        assert_eq!(levels[1], vec!["merge"]);
    }
}
