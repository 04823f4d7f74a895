//! Declarative workflow / step data model (§3).
//!
//! Kept in `ntm-core` because the dependency graph, the substitutor, and the
//! executor all need the same `Step` shape without creating a dependency
//! cycle between those crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A complete workflow definition loaded from a YAML or TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub schema_version: String,
    pub name: String,
    #[serde(default)]
    pub vars: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub settings: WorkflowSettings,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    #[serde(default)]
    pub continue_on_error: bool,
    /// Seconds. Falls back to 5 minutes when unset, per step, then globally.
    #[serde(default)]
    pub default_timeout_seconds: Option<u64>,
    /// Seconds. Default 30 minutes.
    #[serde(default)]
    pub global_timeout_seconds: Option<u64>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            default_timeout_seconds: None,
            global_timeout_seconds: None,
        }
    }
}

/// How a step picks its destination pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaneSelector {
    Agent(String),
    Pane(String),
    Route(RoutePolicy),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutePolicy {
    LeastLoaded,
    FirstAvailable,
    RoundRobin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    Fail,
    Continue,
    Retry,
}

impl Default for OnError {
    fn default() -> Self {
        Self::Fail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    None,
    Linear,
    Exponential,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::None
    }
}

impl RetryBackoff {
    /// Multiplier applied to `retry_delay` for 1-based attempt number `attempt`.
    pub fn factor(&self, attempt: u32) -> u64 {
        match self {
            Self::None => 1,
            Self::Linear => attempt.max(1) as u64,
            Self::Exponential => 1u64 << attempt.saturating_sub(1).min(62),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    Completion,
    Idle,
    Time,
    None,
}

impl Default for WaitMode {
    fn default() -> Self {
        Self::Completion
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputParseType {
    None,
    FirstLine,
    Lines,
    Json,
    Yaml,
    Regex,
}

impl Default for OutputParseType {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputParseSpec {
    #[serde(rename = "type", default)]
    pub parse_type: OutputParseType,
    #[serde(default)]
    pub pattern: Option<String>,
}

/// A single step in a workflow. Identifiers match `[A-Za-z0-9_-]+` and are
/// unique across the whole workflow, including nested `parallel`/`loop` steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub prompt_file: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub pane: Option<String>,
    #[serde(default)]
    pub route: Option<RoutePolicy>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_delay_seconds: u64,
    #[serde(default)]
    pub retry_backoff: RetryBackoff,
    #[serde(default)]
    pub wait: WaitMode,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub output_var: Option<String>,
    #[serde(default)]
    pub output_parse: OutputParseSpec,
    #[serde(default)]
    pub parallel: Vec<Step>,
    #[serde(rename = "loop", default)]
    pub loop_config: Option<LoopConfig>,
}

impl Step {
    /// Resolve the pane selector this step declares, if any.
    pub fn pane_selector(&self) -> Option<PaneSelector> {
        if let Some(agent) = &self.agent {
            return Some(PaneSelector::Agent(agent.clone()));
        }
        if let Some(pane) = &self.pane {
            return Some(PaneSelector::Pane(pane.clone()));
        }
        self.route.map(PaneSelector::Route)
    }

    /// Collect this step's id plus every nested id (parallel branches, loop
    /// sub-steps) so uniqueness can be validated across the whole tree.
    pub fn all_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.id.as_str()];
        for p in &self.parallel {
            ids.extend(p.all_ids());
        }
        if let Some(lc) = &self.loop_config {
            for s in &lc.steps {
                ids.extend(s.all_ids());
            }
        }
        ids
    }
}

/// `for-each` / `while` / `times` loop dispatch, see §4.7.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default)]
    pub items: Option<serde_json::Value>,
    #[serde(default)]
    pub r#while: Option<String>,
    #[serde(default)]
    pub times: Option<u64>,
    #[serde(rename = "as")]
    pub as_name: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    #[serde(default)]
    pub delay_seconds: u64,
    #[serde(default)]
    pub collect: Option<String>,
    pub steps: Vec<Step>,
}

fn default_max_iterations() -> u64 {
    100
}

impl LoopConfig {
    pub fn dispatch_mode(&self) -> LoopMode {
        if self.items.is_some() {
            LoopMode::ForEach
        } else if self.r#while.is_some() {
            LoopMode::While
        } else {
            LoopMode::Times
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    ForEach,
    While,
    Times,
}

/// Validate that a step id is non-empty and uses only
/// alphanumerics, `-`, and `_`.
pub fn is_valid_step_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validate that a workflow name matches `[A-Za-z0-9_.-]+`.
pub fn is_valid_workflow_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}
