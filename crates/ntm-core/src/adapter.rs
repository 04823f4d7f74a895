//! The terminal-multiplexer adapter contract (§6).
//!
//! This is a collaborator interface only — pane enumeration, keystroke
//! injection, and scrollback capture are implemented outside the core (the
//! real adapter shells out to tmux/screen/iTerm automation). Crates in this
//! workspace depend only on the trait so they can be exercised against a
//! fake in tests and in `--dry-run` mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::AgentType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneInfo {
    pub id: String,
    pub title: String,
    pub agent_type: AgentType,
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaneDetectState {
    Idle,
    Working,
    Error,
    Crashed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneDetect {
    pub state: PaneDetectState,
    pub last_active: chrono::DateTime<chrono::Utc>,
}

/// Sentinel pane id used by dry-run mode so the executor never needs a real adapter.
pub const DRY_RUN_PANE: &str = "__dry_run__";

#[async_trait]
pub trait TerminalAdapter: Send + Sync {
    async fn list_panes(&self, session: &str) -> anyhow::Result<Vec<PaneInfo>>;
    async fn capture(&self, pane_id: &str, lines: usize) -> anyhow::Result<String>;
    async fn send(&self, pane_id: &str, text: &str, press_enter: bool) -> anyhow::Result<()>;
    async fn detect(&self, pane_id: &str) -> anyhow::Result<PaneDetect>;
}
