//! Handoff Trigger (C5): warn/trigger thresholds, cooldown, pending-rotation emission.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use ntm_core::context::{DefaultAction, HandoffRecommendation, PendingRotation};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ContextError;
use crate::monitor::ContextMonitor;
use crate::predictor::{predict, Prediction};
use crate::store::PendingRotationStore;

#[derive(Debug, Clone, Copy)]
pub struct HandoffPolicy {
    pub warn_threshold: f64,
    pub trigger_threshold: f64,
    pub cooldown: Duration,
    pub rotation_timeout: Duration,
    /// How far below `warn_threshold` usage must drop before the sticky warn clears.
    pub warn_hysteresis: f64,
}

impl Default for HandoffPolicy {
    fn default() -> Self {
        Self {
            warn_threshold: 70.0,
            trigger_threshold: 75.0,
            cooldown: Duration::seconds(300),
            rotation_timeout: Duration::seconds(600),
            warn_hysteresis: 3.0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct AgentTriggerState {
    sticky_warn: bool,
    last_triggered: Option<DateTime<Utc>>,
}

pub type HandoffCallback = Arc<dyn Fn(&str, &HandoffRecommendation) + Send + Sync>;

/// Evaluates agents against the warn/trigger policy and emits pending
/// rotations, with a per-agent cooldown so a sustained high-usage period
/// doesn't re-fire the same recommendation every tick.
pub struct HandoffTrigger {
    policy: HandoffPolicy,
    monitor: Arc<ContextMonitor>,
    store: Arc<PendingRotationStore>,
    states: Mutex<HashMap<String, AgentTriggerState>>,
    active_agents: Mutex<HashSet<String>>,
    on_warning: Mutex<Option<HandoffCallback>>,
    on_triggered: Mutex<Option<HandoffCallback>>,
}

impl HandoffTrigger {
    pub fn new(policy: HandoffPolicy, monitor: Arc<ContextMonitor>, store: Arc<PendingRotationStore>) -> Self {
        Self {
            policy,
            monitor,
            store,
            states: Mutex::new(HashMap::new()),
            active_agents: Mutex::new(HashSet::new()),
            on_warning: Mutex::new(None),
            on_triggered: Mutex::new(None),
        }
    }

    pub fn set_on_warning(&self, callback: HandoffCallback) {
        *self.on_warning.lock().expect("handoff trigger lock poisoned") = Some(callback);
    }

    pub fn set_on_triggered(&self, callback: HandoffCallback) {
        *self.on_triggered.lock().expect("handoff trigger lock poisoned") = Some(callback);
    }

    pub fn mark_active(&self, agent_id: &str) {
        self.active_agents
            .lock()
            .expect("handoff trigger lock poisoned")
            .insert(agent_id.to_string());
    }

    pub fn mark_inactive(&self, agent_id: &str) {
        self.active_agents
            .lock()
            .expect("handoff trigger lock poisoned")
            .remove(agent_id);
    }

    fn is_active(&self, agent_id: &str) -> bool {
        self.active_agents
            .lock()
            .expect("handoff trigger lock poisoned")
            .contains(agent_id)
    }

    pub fn evaluate(&self, agent_id: &str) -> Result<HandoffRecommendation, ContextError> {
        let usage = self
            .monitor
            .get_estimate(agent_id)
            .ok_or_else(|| ContextError::NotRegistered(agent_id.to_string()))?;
        let model_limit = self.monitor.model_limit(agent_id).unwrap_or(200_000);

        let predicted_exhaustion_at = match predict(&self.monitor, agent_id, model_limit) {
            Prediction::Estimate { exhaustion_at, seconds_to_limit, .. } if seconds_to_limit.is_finite() => {
                Some(exhaustion_at)
            }
            _ => None,
        };

        let now = Utc::now();
        let mut states = self.states.lock().expect("handoff trigger lock poisoned");
        let state = states.entry(agent_id.to_string()).or_default();

        if usage >= self.policy.warn_threshold {
            state.sticky_warn = true;
        } else if state.sticky_warn && usage < self.policy.warn_threshold - self.policy.warn_hysteresis {
            state.sticky_warn = false;
        }
        let should_warn = state.sticky_warn;

        let cooldown_elapsed = state
            .last_triggered
            .map(|last| now - last > self.policy.cooldown)
            .unwrap_or(true);

        let should_trigger = should_warn
            && usage >= self.policy.trigger_threshold
            && cooldown_elapsed
            && self.is_active(agent_id);

        let reason = if should_trigger {
            format!("usage {usage:.1}% exceeds trigger threshold {:.1}%", self.policy.trigger_threshold)
        } else if should_warn {
            format!("usage {usage:.1}% exceeds warn threshold {:.1}%", self.policy.warn_threshold)
        } else {
            format!("usage {usage:.1}% is within budget")
        };

        let recommendation = HandoffRecommendation {
            should_warn,
            should_trigger,
            usage_percent: usage,
            predicted_exhaustion_at,
            reason,
        };

        if should_trigger {
            state.last_triggered = Some(now);
        }
        drop(states);

        if recommendation.should_trigger {
            self.emit_trigger(agent_id, &recommendation)?;
        } else if recommendation.should_warn {
            self.emit_warning(agent_id, &recommendation);
        }

        Ok(recommendation)
    }

    fn emit_warning(&self, agent_id: &str, recommendation: &HandoffRecommendation) {
        if let Some(callback) = self.on_warning.lock().expect("handoff trigger lock poisoned").clone() {
            callback(agent_id, recommendation);
        }
    }

    fn emit_trigger(&self, agent_id: &str, recommendation: &HandoffRecommendation) -> Result<(), ContextError> {
        let Some(state) = self.monitor.get_state(agent_id) else {
            return Ok(());
        };
        let now = Utc::now();
        let rotation = PendingRotation {
            agent_id: agent_id.to_string(),
            session_name: state.session_name,
            pane_id: state.pane_id,
            context_percent: recommendation.usage_percent,
            created_at: now,
            timeout_at: now + self.policy.rotation_timeout,
            default_action: DefaultAction::Rotate,
            work_dir: None,
        };
        self.store.add(rotation)?;
        info!(agent_id, usage = recommendation.usage_percent, "handoff trigger fired");

        if let Some(callback) = self.on_triggered.lock().expect("handoff trigger lock poisoned").clone() {
            callback(agent_id, recommendation);
        }
        Ok(())
    }

    /// One ticker task per process, iterating every registered+active agent (§5).
    pub async fn run(self: Arc<Self>, tick: StdDuration, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    info!("handoff trigger control loop cancelled");
                    return;
                }
                _ = interval.tick() => {
                    for agent_id in self.monitor.registered_agent_ids() {
                        if let Err(err) = self.evaluate(&agent_id) {
                            warn!(agent_id, error = %err, "handoff evaluation failed");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ModelLimits;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup(usage_tokens: i64) -> (Arc<ContextMonitor>, Arc<PendingRotationStore>, HandoffTrigger) {
        let monitor = Arc::new(ContextMonitor::new(ModelLimits::default(), 0.7));
        monitor.register("a1", "pane-1", "claude-opus-4", "sess", None);
        monitor.record_message("a1", usage_tokens, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PendingRotationStore::new(dir.path().join("pending.jsonl")));
        let trigger = HandoffTrigger::new(HandoffPolicy::default(), monitor.clone(), store.clone());
        trigger.mark_active("a1");
        (monitor, store, trigger)
    }

    #[test]
    fn below_warn_threshold_is_quiet() {
        let (_m, _s, trigger) = setup(10_000);
        let rec = trigger.evaluate("a1").unwrap();
        assert!(!rec.should_warn);
        assert!(!rec.should_trigger);
    }

    /// Scenario 6 (§8): 200k model, 215000 tokens at 0.7 discount -> both fire.
    #[test]
    fn trigger_scenario_matches_spec() {
        let (_m, store, trigger) = setup(215_000);
        let rec = trigger.evaluate("a1").unwrap();
        assert!((rec.usage_percent - 75.25).abs() < 0.01);
        assert!(rec.should_warn);
        assert!(rec.should_trigger);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn warn_only_without_trigger() {
        let (_m, _s, trigger) = setup(200_000);
        let rec = trigger.evaluate("a1").unwrap();
        assert!((rec.usage_percent - 70.0).abs() < 0.01);
        assert!(rec.should_warn);
        assert!(!rec.should_trigger);
    }

    #[test]
    fn cooldown_prevents_refire() {
        let (_m, store, trigger) = setup(215_000);
        trigger.evaluate("a1").unwrap();
        let second = trigger.evaluate("a1").unwrap();
        assert!(!second.should_trigger);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn inactive_agent_never_triggers() {
        let (_m, _s, trigger) = setup(215_000);
        trigger.mark_inactive("a1");
        let rec = trigger.evaluate("a1").unwrap();
        assert!(!rec.should_trigger);
    }

    #[test]
    fn callbacks_fire_outside_lock() {
        let (_m, _s, trigger) = setup(215_000);
        let warn_calls = Arc::new(AtomicUsize::new(0));
        let trigger_calls = Arc::new(AtomicUsize::new(0));
        let wc = warn_calls.clone();
        let tc = trigger_calls.clone();
        trigger.set_on_warning(Arc::new(move |_, _| {
            wc.fetch_add(1, Ordering::SeqCst);
        }));
        trigger.set_on_triggered(Arc::new(move |_, _| {
            tc.fetch_add(1, Ordering::SeqCst);
        }));
        trigger.evaluate("a1").unwrap();
        assert_eq!(trigger_calls.load(Ordering::SeqCst), 1);
    }
}
