//! Dependency graph: arena + index (§4.4, §9 Design Notes).
//!
//! Nodes live in a contiguous `Vec` addressed by index; edges are integer
//! lists rather than pointers, so the whole structure serializes trivially
//! and has no cyclic ownership.

use std::collections::{HashMap, HashSet};

use ntm_core::workflow::{Step, Workflow};

/// A dependency graph built from a workflow's steps, including every
/// `parallel[]` branch and `loop.steps[]` sub-step.
pub struct Graph {
    ids: Vec<String>,
    index_of: HashMap<String, usize>,
    /// `edges[i]` holds the indices of `i`'s dependencies (its predecessors).
    edges: Vec<Vec<usize>>,
    /// Raw `depends_on` strings as declared, including ids that don't
    /// resolve to a node — kept for validation diagnostics.
    raw_depends_on: Vec<Vec<String>>,
    executed: HashSet<usize>,
    failed: HashSet<usize>,
}

impl Graph {
    pub fn build(workflow: &Workflow) -> Self {
        let mut ids = Vec::new();
        let mut raw_depends_on = Vec::new();
        collect_steps(&workflow.steps, &mut ids, &mut raw_depends_on);

        let index_of: HashMap<String, usize> = ids
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        let edges = raw_depends_on
            .iter()
            .map(|deps| deps.iter().filter_map(|d| index_of.get(d).copied()).collect())
            .collect();

        Self {
            ids,
            index_of,
            edges,
            raw_depends_on,
            executed: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_of.get(id).copied()
    }

    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.edges[index]
    }

    pub fn raw_depends_on(&self, index: usize) -> &[String] {
        &self.raw_depends_on[index]
    }

    pub(crate) fn edges(&self) -> &[Vec<usize>] {
        &self.edges
    }

    pub fn mark_executed(&mut self, id: &str) {
        if let Some(i) = self.index_of(id) {
            self.executed.insert(i);
        }
    }

    pub fn mark_failed(&mut self, id: &str) {
        if let Some(i) = self.index_of(id) {
            self.failed.insert(i);
        }
    }

    pub fn is_executed(&self, id: &str) -> bool {
        self.index_of(id).map(|i| self.executed.contains(&i)).unwrap_or(false)
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.index_of(id).map(|i| self.failed.contains(&i)).unwrap_or(false)
    }

    /// Steps whose dependencies have all settled (executed or failed) and
    /// that have not themselves settled yet.
    pub fn get_ready_steps(&self) -> Vec<&str> {
        (0..self.len())
            .filter(|i| !self.executed.contains(i) && !self.failed.contains(i))
            .filter(|i| {
                self.edges[*i]
                    .iter()
                    .all(|d| self.executed.contains(d) || self.failed.contains(d))
            })
            .map(|i| self.ids[i].as_str())
            .collect()
    }

    /// Direct predecessors only; transitive propagation is the executor's job.
    pub fn has_failed_dependency(&self, id: &str) -> bool {
        match self.index_of(id) {
            Some(i) => self.edges[i].iter().any(|d| self.failed.contains(d)),
            None => false,
        }
    }
}

fn collect_steps(steps: &[Step], ids: &mut Vec<String>, raw_depends_on: &mut Vec<Vec<String>>) {
    for step in steps {
        ids.push(step.id.clone());
        raw_depends_on.push(step.depends_on.clone());
        collect_steps(&step.parallel, ids, raw_depends_on);
        if let Some(loop_config) = &step.loop_config {
            collect_steps(&loop_config.steps, ids, raw_depends_on);
        }
    }
}
