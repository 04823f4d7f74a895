//! Progress events emitted during a run (§4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    WorkflowStart,
    StepStart,
    StepProgress,
    StepComplete,
    StepFailed,
    StepSkipped,
    WorkflowComplete,
    WorkflowCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: ProgressEventType,
    pub step_id: Option<String>,
    pub message: String,
    pub progress: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(event_type: ProgressEventType, step_id: Option<String>, message: impl Into<String>, progress: f64) -> Self {
        Self {
            event_type,
            step_id,
            message: message.into(),
            progress: progress.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        }
    }
}

pub type ProgressSender = mpsc::Sender<ProgressEvent>;

/// Best-effort, non-blocking publish: a full or closed channel silently
/// drops the event rather than backpressuring the run.
pub fn publish(sender: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(sender) = sender {
        if let Err(err) = sender.try_send(event) {
            tracing::debug!(error = %err, "dropped progress event");
        }
    }
}
