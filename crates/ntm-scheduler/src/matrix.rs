//! Three-layer capability matrix: base < override < learned (§4.10).

use std::collections::HashMap;
use std::sync::RwLock;

use ntm_core::agent::AgentType;
use ntm_core::task::TaskType;

const DEFAULT_SCORE: f64 = 0.5;

fn default_base_scores() -> HashMap<(AgentType, TaskType), f64> {
    use AgentType::*;
    use TaskType::*;
    HashMap::from([
        ((ClaudeCode, Bug), 0.8),
        ((ClaudeCode, Feature), 0.75),
        ((ClaudeCode, Refactor), 0.8),
        ((ClaudeCode, Test), 0.7),
        ((ClaudeCode, Docs), 0.7),
        ((ClaudeCode, Review), 0.75),
        ((Codex, Bug), 0.75),
        ((Codex, Feature), 0.8),
        ((Codex, Refactor), 0.7),
        ((Codex, Test), 0.75),
        ((Codex, Docs), 0.6),
        ((Codex, Review), 0.65),
        ((Gemini, Bug), 0.65),
        ((Gemini, Feature), 0.7),
        ((Gemini, Refactor), 0.65),
        ((Gemini, Test), 0.6),
        ((Gemini, Docs), 0.75),
        ((Gemini, Review), 0.7),
    ])
}

/// Concurrent-read, exclusive-write scores for `(agent_type, task_type)`.
/// Lookup precedence is learned > override > base; an unscored pair
/// defaults to `0.5`. All writes are clamped to `[0,1]`.
pub struct CapabilityMatrix {
    base: HashMap<(AgentType, TaskType), f64>,
    overrides: RwLock<HashMap<(AgentType, TaskType), f64>>,
    learned: RwLock<HashMap<(AgentType, TaskType), f64>>,
}

impl Default for CapabilityMatrix {
    fn default() -> Self {
        Self {
            base: default_base_scores(),
            overrides: RwLock::new(HashMap::new()),
            learned: RwLock::new(HashMap::new()),
        }
    }
}

impl CapabilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self, agent_type: AgentType, task_type: TaskType) -> f64 {
        let key = (agent_type, task_type);
        if let Some(score) = self.learned.read().expect("learned scores lock poisoned").get(&key) {
            return *score;
        }
        if let Some(score) = self.overrides.read().expect("override scores lock poisoned").get(&key) {
            return *score;
        }
        self.base.get(&key).copied().unwrap_or(DEFAULT_SCORE)
    }

    pub fn set_override(&self, agent_type: AgentType, task_type: TaskType, score: f64) {
        self.overrides
            .write()
            .expect("override scores lock poisoned")
            .insert((agent_type, task_type), clamp(score));
    }

    /// Apply an online update (e.g. from run outcomes) to the learned layer.
    pub fn set_learned(&self, agent_type: AgentType, task_type: TaskType, score: f64) {
        self.learned
            .write()
            .expect("learned scores lock poisoned")
            .insert((agent_type, task_type), clamp(score));
    }

    pub fn load_overrides(&self, overrides: HashMap<(AgentType, TaskType), f64>) {
        let mut guard = self.overrides.write().expect("override scores lock poisoned");
        for (key, score) in overrides {
            guard.insert(key, clamp(score));
        }
    }
}

fn clamp(score: f64) -> f64 {
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pair_defaults_to_half() {
        let matrix = CapabilityMatrix::new();
        assert_eq!(matrix.score(AgentType::Aider, TaskType::Docs), DEFAULT_SCORE);
    }

    #[test]
    fn known_base_pair_is_scored() {
        let matrix = CapabilityMatrix::new();
        assert_eq!(matrix.score(AgentType::ClaudeCode, TaskType::Bug), 0.8);
    }

    #[test]
    fn override_beats_base() {
        let matrix = CapabilityMatrix::new();
        matrix.set_override(AgentType::ClaudeCode, TaskType::Bug, 0.3);
        assert_eq!(matrix.score(AgentType::ClaudeCode, TaskType::Bug), 0.3);
    }

    #[test]
    fn learned_beats_override_and_base() {
        let matrix = CapabilityMatrix::new();
        matrix.set_override(AgentType::ClaudeCode, TaskType::Bug, 0.3);
        matrix.set_learned(AgentType::ClaudeCode, TaskType::Bug, 0.95);
        assert_eq!(matrix.score(AgentType::ClaudeCode, TaskType::Bug), 0.95);
    }

    #[test]
    fn writes_are_clamped_to_unit_interval() {
        let matrix = CapabilityMatrix::new();
        matrix.set_override(AgentType::Codex, TaskType::Feature, 5.0);
        assert_eq!(matrix.score(AgentType::Codex, TaskType::Feature), 1.0);
        matrix.set_learned(AgentType::Codex, TaskType::Feature, -3.0);
        assert_eq!(matrix.score(AgentType::Codex, TaskType::Feature), 0.0);
    }
}
