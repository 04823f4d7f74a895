//! Run-time execution state: the single source of truth for one workflow run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ExecutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

/// The durable outcome of executing one workflow step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: Option<StepStatus>,
    pub output: Option<String>,
    pub parsed_data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pane_used: Option<String>,
    pub agent_type: Option<String>,
    pub attempts: u32,
    pub skip_reason: Option<String>,
}

impl StepResult {
    /// `finished_at - started_at` rendered like `1m30s`; `"0s"` if unfinished.
    pub fn duration_string(&self) -> String {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => format_duration(end - start),
            _ => "0s".to_string(),
        }
    }
}

/// Render a `chrono::Duration` in its shortest human form (e.g. `1m30s`, `45s`, `2h3m`).
pub fn format_duration(d: chrono::Duration) -> String {
    let total_seconds = d.num_seconds().max(0);
    if total_seconds == 0 {
        return "0s".to_string();
    }
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

/// The single source of truth during a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub run_id: String,
    pub workflow_id: String,
    pub session: String,
    pub workflow_file: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub variables: HashMap<String, serde_json::Value>,
    pub steps: HashMap<String, StepResult>,
    pub errors: Vec<ExecutionError>,
}

impl ExecutionState {
    pub fn new(run_id: impl Into<String>, workflow_id: impl Into<String>, session: impl Into<String>, workflow_file: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            workflow_id: workflow_id.into(),
            session: session.into(),
            workflow_file: workflow_file.into(),
            status: RunStatus::Pending,
            started_at: now,
            updated_at: now,
            finished_at: None,
            variables: HashMap::new(),
            steps: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Flat legacy accessor used by the substitutor for `steps.<id>.output`.
    pub fn flat_step_output_key(step_id: &str) -> String {
        format!("steps.{step_id}.output")
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
