//! Layered `OrchestratorConfig` (§3.1): compiled-in defaults, overlaid by
//! `<project>/.ntm/config.toml`, overlaid by `NTM_`-prefixed environment
//! variables, overlaid by explicit CLI flags (the CLI applies its own layer
//! on top of what [`OrchestratorConfig::load`] returns).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ntm_core::agent::AgentType;
use ntm_core::task::TaskType;
use serde::{Deserialize, Serialize};

use crate::env::apply_env_overrides;
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub orchestrator: OrchestratorMeta,
    #[serde(default)]
    pub context: ContextConfig,
    /// Keyed by [`AgentType::as_str`] rather than the enum itself: TOML
    /// tables need string keys.
    #[serde(default)]
    pub agents: HashMap<String, AgentTuning>,
    #[serde(default)]
    pub capability_overrides: Vec<CapabilityOverrideEntry>,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorMeta {
    #[serde(default = "default_orchestrator_name")]
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_model_limit")]
    pub default_model_limit: u64,
    #[serde(default = "default_discount")]
    pub discount: f64,
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: f64,
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: f64,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_observation_window")]
    pub observation_window: usize,
    #[serde(default)]
    pub models: HashMap<String, ModelLimits>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLimits {
    pub token_limit: u64,
    #[serde(default)]
    pub discount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTuning {
    #[serde(default = "default_sample_window")]
    pub working_sample_window: usize,
    #[serde(default = "default_sample_window")]
    pub idle_sample_window: usize,
    #[serde(default = "default_sample_window")]
    pub error_sample_window: usize,
    #[serde(default = "default_context_low_threshold")]
    pub context_low_threshold: f64,
}

impl Default for AgentTuning {
    fn default() -> Self {
        Self {
            working_sample_window: default_sample_window(),
            idle_sample_window: default_sample_window(),
            error_sample_window: default_sample_window(),
            context_low_threshold: default_context_low_threshold(),
        }
    }
}

/// A single `(agent_type, task_type) -> score` override, shaped as a flat
/// list in TOML since composite-key maps don't round-trip cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityOverrideEntry {
    pub agent: String,
    pub task: String,
    pub score: f64,
}

fn default_orchestrator_name() -> String {
    "ntm".to_string()
}
fn default_max_concurrent_runs() -> u32 {
    4
}
fn default_model_limit() -> u64 {
    200_000
}
fn default_discount() -> f64 {
    0.7
}
fn default_warn_threshold() -> f64 {
    70.0
}
fn default_trigger_threshold() -> f64 {
    75.0
}
fn default_cooldown_seconds() -> u64 {
    900
}
fn default_observation_window() -> usize {
    50
}
fn default_sample_window() -> usize {
    20
}
fn default_context_low_threshold() -> f64 {
    20.0
}
fn default_state_dir() -> PathBuf {
    PathBuf::from(".ntm")
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_model_limit: default_model_limit(),
            discount: default_discount(),
            warn_threshold: default_warn_threshold(),
            trigger_threshold: default_trigger_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
            observation_window: default_observation_window(),
            models: HashMap::new(),
        }
    }
}

impl Default for OrchestratorMeta {
    fn default() -> Self {
        Self {
            name: default_orchestrator_name(),
            created_at: Utc::now(),
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorMeta::default(),
            context: ContextConfig::default(),
            agents: HashMap::new(),
            capability_overrides: Vec::new(),
            state_dir: default_state_dir(),
        }
    }
}

impl OrchestratorConfig {
    /// Load and merge every layer below CLI flags: defaults, project TOML
    /// (missing file falls back silently), then `NTM_*` env overrides.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let mut config = match Self::read_project_file(project_root)? {
            Some(config) => config,
            None => Self::default(),
        };
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    fn read_project_file(project_root: &Path) -> Result<Option<Self>, ConfigError> {
        let path = Self::config_path(project_root);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        let config: Self = toml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source: Box::new(source) })?;
        Ok(Some(config))
    }

    pub fn config_path(project_root: &Path) -> PathBuf {
        project_root.join(".ntm").join("config.toml")
    }

    pub fn save(&self, project_root: &Path) -> Result<(), ConfigError> {
        let dir = project_root.join(".ntm");
        let path = Self::config_path(project_root);
        std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Read { path: dir.display().to_string(), source })?;
        let content = toml::to_string_pretty(self).expect("OrchestratorConfig is always serializable");
        std::fs::write(&path, content).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })
    }

    /// Absolute path to the state directory, resolved relative to the
    /// project root when `state_dir` is relative.
    pub fn resolved_state_dir(&self, project_root: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            project_root.join(&self.state_dir)
        }
    }

    pub fn model_limit(&self, model: &str) -> u64 {
        self.context.models.get(model).map(|m| m.token_limit).unwrap_or(self.context.default_model_limit)
    }

    pub fn model_discount(&self, model: &str) -> f64 {
        self.context.models.get(model).and_then(|m| m.discount).unwrap_or(self.context.discount)
    }

    pub fn agent_tuning(&self, agent_type: AgentType) -> AgentTuning {
        self.agents.get(agent_type.as_str()).cloned().unwrap_or_default()
    }

    /// Resolve capability overrides into the keyed form the scheduler
    /// consumes, dropping entries whose agent/task fields don't parse.
    pub fn capability_overrides(&self) -> Result<HashMap<(AgentType, TaskType), f64>, ConfigError> {
        let mut resolved = HashMap::new();
        for entry in &self.capability_overrides {
            let agent = parse_agent_type(&entry.agent).ok_or_else(|| ConfigError::BadCapabilityOverride(entry.agent.clone()))?;
            let task = parse_task_type(&entry.task).ok_or_else(|| ConfigError::BadCapabilityOverride(entry.task.clone()))?;
            resolved.insert((agent, task), entry.score);
        }
        Ok(resolved)
    }
}

fn parse_agent_type(s: &str) -> Option<AgentType> {
    let agent = AgentType::from_alias(s);
    if agent == AgentType::Unknown && !s.eq_ignore_ascii_case("unknown") {
        None
    } else {
        Some(agent)
    }
}

fn parse_task_type(s: &str) -> Option<TaskType> {
    match s.to_ascii_lowercase().as_str() {
        "bug" => Some(TaskType::Bug),
        "feature" => Some(TaskType::Feature),
        "refactor" => Some(TaskType::Refactor),
        "test" => Some(TaskType::Test),
        "docs" => Some(TaskType::Docs),
        "review" => Some(TaskType::Review),
        "general" => Some(TaskType::General),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_falls_back_to_defaults_when_no_file_exists() {
        let dir = tempdir().unwrap();
        let config = OrchestratorConfig::load(dir.path()).unwrap();
        assert_eq!(config.orchestrator.name, "ntm");
        assert_eq!(config.context.warn_threshold, 70.0);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let mut config = OrchestratorConfig::default();
        config.orchestrator.name = "acme".to_string();
        config.capability_overrides.push(CapabilityOverrideEntry { agent: "cc".to_string(), task: "bug".to_string(), score: 0.9 });
        config.save(dir.path()).unwrap();

        let loaded = OrchestratorConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.orchestrator.name, "acme");
        let overrides = loaded.capability_overrides().unwrap();
        assert_eq!(overrides.get(&(AgentType::ClaudeCode, TaskType::Bug)), Some(&0.9));
    }

    #[test]
    fn malformed_toml_is_a_fatal_config_error() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".ntm")).unwrap();
        std::fs::write(dir.path().join(".ntm").join("config.toml"), "not valid = [ toml").unwrap();
        assert!(OrchestratorConfig::load(dir.path()).is_err());
    }

    #[test]
    fn unrecognized_capability_override_agent_is_rejected() {
        let mut config = OrchestratorConfig::default();
        config.capability_overrides.push(CapabilityOverrideEntry { agent: "not-an-agent".to_string(), task: "bug".to_string(), score: 0.5 });
        assert!(config.capability_overrides().is_err());
    }

    #[test]
    fn model_limit_falls_back_to_default_for_unknown_models() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.model_limit("some-unlisted-model"), config.context.default_model_limit);
    }
}
