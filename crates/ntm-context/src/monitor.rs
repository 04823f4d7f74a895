//! Context Monitor (C3): tracks per-agent cumulative token usage.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use ntm_core::context::{ContextState, DEFAULT_DISCOUNT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ContextError;
use crate::limits::ModelLimits;

/// Bytes-per-token ratio used to approximate transcript size without a
/// real tokenizer; deliberately conservative (overestimates tokens).
pub const TRANSCRIPT_BYTES_PER_TOKEN: f64 = 3.5;

/// Maximum number of observations retained per agent for burn-rate
/// prediction (§4.2).
pub const OBSERVATION_WINDOW: usize = 50;

/// One (timestamp, cumulative-token) sample used by the predictor.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub at: DateTime<Utc>,
    pub cumulative_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct RobotModeEnvelope {
    context_used: i64,
    context_limit: Option<i64>,
}

struct AgentRecord {
    state: ContextState,
    model_limit: i64,
    observations: VecDeque<Observation>,
}

/// Tracks every registered agent's context consumption.
///
/// All mutators hold a write lock on the relevant agent's record; readers
/// take a read lock and return deep copies (§4.2).
pub struct ContextMonitor {
    discount: f64,
    limits: ModelLimits,
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl ContextMonitor {
    pub fn new(limits: ModelLimits, discount: f64) -> Self {
        Self {
            discount,
            limits,
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        agent_id: &str,
        pane_id: &str,
        model: &str,
        session_name: &str,
        transcript_path: Option<String>,
    ) {
        let mut state = ContextState::new(agent_id, pane_id, model, session_name);
        state.transcript_path = transcript_path;
        let model_limit = self.limits.limit_for(model);

        let mut agents = self.agents.write().expect("context monitor lock poisoned");
        agents.insert(
            agent_id.to_string(),
            AgentRecord {
                state,
                model_limit,
                observations: VecDeque::with_capacity(OBSERVATION_WINDOW),
            },
        );
        debug!(agent_id, model, model_limit, "registered agent for context tracking");
    }

    pub fn record_message(
        &self,
        agent_id: &str,
        in_tokens: i64,
        out_tokens: i64,
    ) -> Result<(), ContextError> {
        let mut agents = self.agents.write().expect("context monitor lock poisoned");
        let record = agents
            .get_mut(agent_id)
            .ok_or_else(|| ContextError::NotRegistered(agent_id.to_string()))?;

        record.state.cumulative_input_tokens += in_tokens;
        record.state.cumulative_output_tokens += out_tokens;
        record.state.message_count += 1;
        record.state.last_updated = Utc::now();

        push_observation(&mut record.observations, record.state.last_updated, total_tokens(&record.state));
        Ok(())
    }

    /// Decode a JSON envelope `{context_used, context_limit}` from robot-mode
    /// output; on success this *replaces* the cumulative estimate rather than
    /// accumulating it.
    pub fn update_from_robot_mode(&self, agent_id: &str, output: &str) -> Result<bool, ContextError> {
        let envelope: RobotModeEnvelope = match find_json_object(output) {
            Some(json) => serde_json::from_str(json)?,
            None => return Ok(false),
        };

        let mut agents = self.agents.write().expect("context monitor lock poisoned");
        let record = agents
            .get_mut(agent_id)
            .ok_or_else(|| ContextError::NotRegistered(agent_id.to_string()))?;

        record.state.cumulative_input_tokens = envelope.context_used;
        record.state.cumulative_output_tokens = 0;
        if let Some(limit) = envelope.context_limit {
            record.model_limit = limit;
        }
        record.state.last_updated = Utc::now();
        push_observation(&mut record.observations, record.state.last_updated, total_tokens(&record.state));
        Ok(true)
    }

    /// Stat the transcript file and convert its byte size into an estimated
    /// token count via a conservative bytes-per-token ratio. A missing file
    /// is not an error.
    pub fn update_from_transcript(&self, agent_id: &str) -> Result<(), ContextError> {
        let mut agents = self.agents.write().expect("context monitor lock poisoned");
        let record = agents
            .get_mut(agent_id)
            .ok_or_else(|| ContextError::NotRegistered(agent_id.to_string()))?;

        let Some(path) = record.state.transcript_path.clone() else {
            return Ok(());
        };

        let metadata = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(ContextError::Transcript { path, source: err }),
        };

        let estimated_tokens = (metadata.len() as f64 / TRANSCRIPT_BYTES_PER_TOKEN).round() as i64;
        record.state.cumulative_input_tokens = estimated_tokens;
        record.state.last_updated = Utc::now();
        push_observation(&mut record.observations, record.state.last_updated, total_tokens(&record.state));
        Ok(())
    }

    pub fn get_state(&self, agent_id: &str) -> Option<ContextState> {
        let agents = self.agents.read().expect("context monitor lock poisoned");
        agents.get(agent_id).map(|r| r.state.clone())
    }

    pub fn get_estimate(&self, agent_id: &str) -> Option<f64> {
        let agents = self.agents.read().expect("context monitor lock poisoned");
        agents
            .get(agent_id)
            .map(|r| r.state.usage_percent(r.model_limit, self.discount))
    }

    pub fn model_limit(&self, agent_id: &str) -> Option<i64> {
        let agents = self.agents.read().expect("context monitor lock poisoned");
        agents.get(agent_id).map(|r| r.model_limit)
    }

    pub(crate) fn observations(&self, agent_id: &str) -> Option<Vec<Observation>> {
        let agents = self.agents.read().expect("context monitor lock poisoned");
        agents.get(agent_id).map(|r| r.observations.iter().copied().collect())
    }

    pub fn registered_agent_ids(&self) -> Vec<String> {
        let agents = self.agents.read().expect("context monitor lock poisoned");
        agents.keys().cloned().collect()
    }
}

impl Default for ContextMonitor {
    fn default() -> Self {
        Self::new(ModelLimits::default(), DEFAULT_DISCOUNT)
    }
}

fn total_tokens(state: &ContextState) -> i64 {
    state.cumulative_input_tokens + state.cumulative_output_tokens
}

fn push_observation(ring: &mut VecDeque<Observation>, at: DateTime<Utc>, cumulative_tokens: i64) {
    if ring.len() == OBSERVATION_WINDOW {
        ring.pop_front();
    }
    ring.push_back(Observation { at, cumulative_tokens });
}

/// Balanced-brace scan for the first `{...}` block, tolerant of surrounding
/// prose (the same discipline as the output-parser's JSON extraction).
fn find_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        let c = b as char;
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return text.get(start..=i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> ContextMonitor {
        ContextMonitor::new(ModelLimits::default(), 0.7)
    }

    #[test]
    fn record_message_accumulates() {
        let m = monitor();
        m.register("a1", "pane-1", "claude-opus-4", "sess", None);
        m.record_message("a1", 100, 50).unwrap();
        m.record_message("a1", 10, 5).unwrap();
        let state = m.get_state("a1").unwrap();
        assert_eq!(state.cumulative_input_tokens, 110);
        assert_eq!(state.cumulative_output_tokens, 55);
        assert_eq!(state.message_count, 2);
    }

    #[test]
    fn unregistered_agent_errors() {
        let m = monitor();
        assert!(m.record_message("ghost", 1, 1).is_err());
    }

    /// Scenario 6 (§8): 200k model, 0.7 discount, 215000 cumulative tokens.
    #[test]
    fn handoff_threshold_scenario() {
        let m = monitor();
        m.register("a1", "pane-1", "claude-opus-4", "sess", None);
        m.record_message("a1", 215_000, 0).unwrap();
        let usage = m.get_estimate("a1").unwrap();
        assert!((usage - 75.25).abs() < 0.01);
    }

    #[test]
    fn robot_mode_envelope_replaces_estimate() {
        let m = monitor();
        m.register("a1", "pane-1", "claude-opus-4", "sess", None);
        m.record_message("a1", 1000, 1000).unwrap();
        let replaced = m
            .update_from_robot_mode("a1", "noise before {\"context_used\": 5000, \"context_limit\": 100000} noise after")
            .unwrap();
        assert!(replaced);
        let state = m.get_state("a1").unwrap();
        assert_eq!(state.cumulative_input_tokens, 5000);
        assert_eq!(state.cumulative_output_tokens, 0);
        assert_eq!(m.model_limit("a1"), Some(100_000));
    }

    #[test]
    fn transcript_missing_file_is_not_an_error() {
        let m = monitor();
        m.register("a1", "pane-1", "claude-opus-4", "sess", Some("/nonexistent/path".into()));
        assert!(m.update_from_transcript("a1").is_ok());
    }
}
