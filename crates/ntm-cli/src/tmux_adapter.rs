//! Thin `tmux` automation adapter: the concrete `TerminalAdapter` the CLI
//! wires up for real (non-dry-run) runs. Pane enumeration, keystroke
//! injection, and scrollback capture are genuinely out of the core's
//! concern (§1); this is a minimal shim shelling out to the `tmux` binary,
//! not a reimplementation of the core's scheduling logic.

use async_trait::async_trait;
use chrono::Utc;
use ntm_core::adapter::{PaneDetect, PaneDetectState, PaneInfo, TerminalAdapter};
use ntm_core::agent::AgentType;
use tokio::process::Command;

pub struct TmuxAdapter;

impl TmuxAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TmuxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TerminalAdapter for TmuxAdapter {
    async fn list_panes(&self, session: &str) -> anyhow::Result<Vec<PaneInfo>> {
        let output = Command::new("tmux")
            .args(["list-panes", "-t", session, "-F", "#{pane_id}\t#{pane_title}"])
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!("tmux list-panes failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(2, '\t');
                let id = parts.next()?.to_string();
                let title = parts.next().unwrap_or_default().to_string();
                let agent_type = AgentType::from_alias(&title);
                Some(PaneInfo { id, title, agent_type, variant: None })
            })
            .collect())
    }

    async fn capture(&self, pane_id: &str, lines: usize) -> anyhow::Result<String> {
        let output = Command::new("tmux")
            .args(["capture-pane", "-t", pane_id, "-p", "-S", &format!("-{lines}")])
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!("tmux capture-pane failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn send(&self, pane_id: &str, text: &str, press_enter: bool) -> anyhow::Result<()> {
        let mut args = vec!["send-keys".to_string(), "-t".to_string(), pane_id.to_string(), "-l".to_string(), text.to_string()];
        let status = Command::new("tmux").args(&args).status().await?;
        if !status.success() {
            anyhow::bail!("tmux send-keys failed for pane {pane_id}");
        }
        if press_enter {
            args = vec!["send-keys".to_string(), "-t".to_string(), pane_id.to_string(), "Enter".to_string()];
            let status = Command::new("tmux").args(&args).status().await?;
            if !status.success() {
                anyhow::bail!("tmux send-keys (Enter) failed for pane {pane_id}");
            }
        }
        Ok(())
    }

    async fn detect(&self, pane_id: &str) -> anyhow::Result<PaneDetect> {
        let output = Command::new("tmux").args(["capture-pane", "-t", pane_id, "-p", "-S", "-200"]).output().await?;
        if !output.status.success() {
            anyhow::bail!("tmux capture-pane failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        let tail = String::from_utf8_lossy(&output.stdout);
        let agent_state = ntm_parser::parse(&tail);
        Ok(PaneDetect { state: pane_detect_state(&agent_state), last_active: Utc::now() })
    }
}

/// Collapse the parser's finer-grained [`ntm_core::AgentState`] flags down
/// to the coarse state the pane-selection and wait-for-idle logic needs.
fn pane_detect_state(state: &ntm_core::AgentState) -> PaneDetectState {
    if state.is_in_error {
        PaneDetectState::Error
    } else if state.is_working {
        PaneDetectState::Working
    } else if state.is_idle {
        PaneDetectState::Idle
    } else {
        PaneDetectState::Working
    }
}
