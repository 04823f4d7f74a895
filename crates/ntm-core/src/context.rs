//! Data shapes shared between the Context Monitor, Predictor, and Handoff Trigger.
//!
//! The logic that mutates these lives in `ntm-context`; `ntm-core` only owns
//! the shapes so other crates (executor, scheduler, CLI) can read them
//! without depending on the monitor's concurrency internals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-agent token/context bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    pub agent_id: String,
    pub pane_id: String,
    pub model: String,
    pub session_name: String,
    pub transcript_path: Option<String>,
    pub cumulative_input_tokens: i64,
    pub cumulative_output_tokens: i64,
    pub message_count: i64,
    pub registered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Default safety discount applied to raw token counts (hidden tool/system tokens).
pub const DEFAULT_DISCOUNT: f64 = 0.7;

impl ContextState {
    pub fn new(agent_id: impl Into<String>, pane_id: impl Into<String>, model: impl Into<String>, session_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            pane_id: pane_id.into(),
            model: model.into(),
            session_name: session_name.into(),
            transcript_path: None,
            cumulative_input_tokens: 0,
            cumulative_output_tokens: 0,
            message_count: 0,
            registered_at: now,
            last_updated: now,
        }
    }

    /// `(input + output) × discount / model_limit × 100`, clamped to `[0, 100]`.
    pub fn usage_percent(&self, model_limit: i64, discount: f64) -> f64 {
        if model_limit <= 0 {
            return 0.0;
        }
        let raw = (self.cumulative_input_tokens + self.cumulative_output_tokens) as f64;
        let pct = raw * discount / model_limit as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }
}

/// Result of evaluating an agent against the warn/trigger policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecommendation {
    pub should_warn: bool,
    pub should_trigger: bool,
    pub usage_percent: f64,
    pub predicted_exhaustion_at: Option<DateTime<Utc>>,
    pub reason: String,
}

/// The action to take when a rotation is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultAction {
    Rotate,
    Compact,
    Ignore,
}

/// A queued handoff decision awaiting user confirmation or timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRotation {
    pub agent_id: String,
    pub session_name: String,
    pub pane_id: String,
    pub context_percent: f64,
    pub created_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    pub default_action: DefaultAction,
    pub work_dir: Option<String>,
}
