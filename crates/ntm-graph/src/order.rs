//! Kahn's algorithm: linear topological order plus parallel-execution levels.

use crate::graph::Graph;

/// `order` is a linear topological sort, ties broken by declaration order.
/// `levels[k]` is the set of nodes removed together on pass `k` — the
/// cohort that may run concurrently at that point in the run.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub order: Vec<String>,
    pub levels: Vec<Vec<String>>,
}

pub fn resolve(graph: &Graph) -> Resolved {
    let n = graph.len();
    let mut in_degree = vec![0usize; n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];

    for node in 0..n {
        in_degree[node] = graph.dependencies(node).len();
        for &dep in graph.dependencies(node) {
            successors[dep].push(node);
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut levels = Vec::new();
    let mut frontier: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    frontier.sort_unstable();

    let mut remaining = n;
    while !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        for &node in &frontier {
            order.push(graph.id(node).to_string());
            remaining -= 1;
            for &succ in &successors[node] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    next_frontier.push(succ);
                }
            }
        }
        levels.push(frontier.iter().map(|&i| graph.id(i).to_string()).collect());
        next_frontier.sort_unstable();
        next_frontier.dedup();
        frontier = next_frontier;
    }

    debug_assert!(
        remaining == 0 || remaining == n - order.len(),
        "topological sort left nodes unresolved; caller should have validated for cycles first"
    );

    Resolved { order, levels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{step, workflow};
    use crate::Graph;

    /// Scenario 2 (§8): diamond `{a; b<-a; c<-a; d<-b,c}`.
    #[test]
    fn diamond_graph_ordering_matches_spec() {
        let wf = workflow(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ]);
        let graph = Graph::build(&wf);
        let resolved = resolve(&graph);

        assert_eq!(resolved.order[0], "a");
        assert_eq!(resolved.order[3], "d");
        assert_eq!(
            resolved.levels,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn independent_steps_form_a_single_level() {
        let wf = workflow(vec![step("a", &[]), step("b", &[]), step("c", &[])]);
        let graph = Graph::build(&wf);
        let resolved = resolve(&graph);
        assert_eq!(resolved.levels.len(), 1);
        assert_eq!(resolved.levels[0].len(), 3);
    }

    #[test]
    fn every_edge_points_to_a_higher_level() {
        let wf = workflow(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ]);
        let graph = Graph::build(&wf);
        let resolved = resolve(&graph);

        let level_of: std::collections::HashMap<&str, usize> = resolved
            .levels
            .iter()
            .enumerate()
            .flat_map(|(lvl, ids)| ids.iter().map(move |id| (id.as_str(), lvl)))
            .collect();

        for node in 0..graph.len() {
            for &dep in graph.dependencies(node) {
                assert!(level_of[graph.id(dep)] < level_of[graph.id(node)]);
            }
        }
    }
}
