//! Pick the best idle agent for a task (§4.10).

use ntm_core::agent::AgentType;

use crate::classifier::classify;
use crate::error::SchedulerError;
use crate::matrix::CapabilityMatrix;

/// A schedulable agent pane.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub pane_id: String,
    pub agent_type: AgentType,
    pub is_idle: bool,
    /// Number of steps currently assigned to this agent.
    pub current_load: usize,
}

/// Classify `task_description` and return the highest-scoring idle
/// candidate, ties broken by least current load then by declaration order.
pub fn select_agent<'a>(
    matrix: &CapabilityMatrix,
    task_description: &str,
    candidates: &'a [Candidate],
) -> Result<&'a Candidate, SchedulerError> {
    let task_type = classify(task_description);

    candidates
        .iter()
        .filter(|c| c.is_idle)
        .max_by(|a, b| {
            let score_a = matrix.score(a.agent_type, task_type);
            let score_b = matrix.score(b.agent_type, task_type);
            score_a
                .partial_cmp(&score_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.current_load.cmp(&a.current_load))
        })
        .ok_or_else(|| SchedulerError::NoCandidate(task_type.to_string()))
}
