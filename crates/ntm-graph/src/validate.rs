//! Structural validation (§4.4): missing dependencies and cycles.

use ntm_core::error::{ValidationIssue, ValidationResult};

use crate::graph::Graph;

/// Soft-validate a graph: collects every missing-dependency and cycle error
/// rather than failing fast on the first one.
pub fn validate(graph: &Graph) -> ValidationResult {
    let mut result = ValidationResult::default();

    for i in 0..graph.len() {
        for dep in graph.raw_depends_on(i) {
            if graph.index_of(dep).is_none() {
                result.errors.push(
                    ValidationIssue::new(
                        format!("steps[{}].depends_on", graph.id(i)),
                        format!("unknown dependency {dep:?}"),
                    )
                    .with_hint(format!("step {:?} has no such id in this workflow", graph.id(i))),
                );
            }
        }
    }

    for cycle in find_cycles(graph) {
        let members: Vec<&str> = cycle.iter().map(|&i| graph.id(i)).collect();
        result.errors.push(ValidationIssue::new(
            "steps".to_string(),
            format!("dependency cycle among steps: {}", members.join(", ")),
        ));
    }

    result
}

/// Tarjan's strongly-connected-components algorithm, reporting components of
/// size > 1 and single-node self-loops as cycles. Member ids within a cycle
/// are returned in ascending node-index order for determinism.
fn find_cycles(graph: &Graph) -> Vec<Vec<usize>> {
    struct Tarjan<'g> {
        graph: &'g Graph,
        index_counter: usize,
        stack: Vec<usize>,
        on_stack: Vec<bool>,
        indices: Vec<Option<usize>>,
        low_links: Vec<usize>,
        sccs: Vec<Vec<usize>>,
    }

    impl<'g> Tarjan<'g> {
        fn strongconnect(&mut self, v: usize) {
            self.indices[v] = Some(self.index_counter);
            self.low_links[v] = self.index_counter;
            self.index_counter += 1;
            self.stack.push(v);
            self.on_stack[v] = true;

            for &w in self.graph.edges()[v].iter() {
                if self.indices[w].is_none() {
                    self.strongconnect(w);
                    self.low_links[v] = self.low_links[v].min(self.low_links[w]);
                } else if self.on_stack[w] {
                    self.low_links[v] = self.low_links[v].min(self.indices[w].unwrap());
                }
            }

            if self.low_links[v] == self.indices[v].unwrap() {
                let mut component = Vec::new();
                loop {
                    let w = self.stack.pop().unwrap();
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                self.sccs.push(component);
            }
        }
    }

    let n = graph.len();
    let mut tarjan = Tarjan {
        graph,
        index_counter: 0,
        stack: Vec::new(),
        on_stack: vec![false; n],
        indices: vec![None; n],
        low_links: vec![0; n],
        sccs: Vec::new(),
    };

    for v in 0..n {
        if tarjan.indices[v].is_none() {
            tarjan.strongconnect(v);
        }
    }

    tarjan
        .sccs
        .into_iter()
        .filter(|scc| scc.len() > 1 || (scc.len() == 1 && graph.edges()[scc[0]].contains(&scc[0])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{step, workflow};
    use crate::Graph;

    /// Scenario 3 (§8): `{a<-b, b<-a, c<-a}` -> one cycle `{a,b}`, `c` excluded.
    #[test]
    fn cycle_scenario_matches_spec() {
        let wf = workflow(vec![step("a", &["b"]), step("b", &["a"]), step("c", &["a"])]);
        let graph = Graph::build(&wf);
        let result = validate(&graph);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains('a'));
        assert!(result.errors[0].message.contains('b'));
        assert!(!result.errors[0].message.contains('c'));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let wf = workflow(vec![step("a", &["a"])]);
        let graph = Graph::build(&wf);
        let result = validate(&graph);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn missing_dependency_reported() {
        let wf = workflow(vec![step("a", &["ghost"])]);
        let graph = Graph::build(&wf);
        let result = validate(&graph);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("ghost"));
    }

    #[test]
    fn acyclic_graph_has_no_errors() {
        let wf = workflow(vec![step("a", &[]), step("b", &["a"])]);
        let graph = Graph::build(&wf);
        assert!(validate(&graph).is_valid());
    }
}
