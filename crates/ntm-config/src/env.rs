//! `NTM_`-prefixed environment variable overlay, applied after the project
//! TOML file and before CLI flags (§3.1 loading precedence).

use crate::config::OrchestratorConfig;
use crate::error::ConfigError;

const PREFIX: &str = "NTM_";

/// Recognized overrides: `NTM_MAX_CONCURRENT_RUNS`, `NTM_WARN_THRESHOLD`,
/// `NTM_TRIGGER_THRESHOLD`, `NTM_DEFAULT_MODEL_LIMIT`, `NTM_STATE_DIR`.
/// Unrecognized `NTM_*` variables are ignored rather than failing a run
/// over an unrelated environment variable.
pub fn apply_env_overrides(config: &mut OrchestratorConfig) -> Result<(), ConfigError> {
    for (key, value) in std::env::vars() {
        if !key.starts_with(PREFIX) {
            continue;
        }
        apply_one(config, &key, &value)?;
    }
    Ok(())
}

fn apply_one(config: &mut OrchestratorConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let bad = |message: &str| ConfigError::BadEnvOverride { key: key.to_string(), message: message.to_string() };

    match key {
        "NTM_MAX_CONCURRENT_RUNS" => {
            config.orchestrator.max_concurrent_runs = value.parse().map_err(|_| bad("expected an integer"))?;
        }
        "NTM_WARN_THRESHOLD" => {
            config.context.warn_threshold = value.parse().map_err(|_| bad("expected a float"))?;
        }
        "NTM_TRIGGER_THRESHOLD" => {
            config.context.trigger_threshold = value.parse().map_err(|_| bad("expected a float"))?;
        }
        "NTM_DEFAULT_MODEL_LIMIT" => {
            config.context.default_model_limit = value.parse().map_err(|_| bad("expected an integer"))?;
        }
        "NTM_STATE_DIR" => {
            config.state_dir = value.into();
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_override_wins_over_file_value() {
        let mut config = OrchestratorConfig::default();
        apply_one(&mut config, "NTM_WARN_THRESHOLD", "55.5").unwrap();
        assert_eq!(config.context.warn_threshold, 55.5);
    }

    #[test]
    fn unrecognized_ntm_variable_is_ignored() {
        let mut config = OrchestratorConfig::default();
        let before = config.orchestrator.max_concurrent_runs;
        apply_one(&mut config, "NTM_SOME_UNKNOWN_FLAG", "1").unwrap();
        assert_eq!(config.orchestrator.max_concurrent_runs, before);
    }

    #[test]
    fn malformed_override_value_is_a_config_error() {
        let mut config = OrchestratorConfig::default();
        assert!(apply_one(&mut config, "NTM_MAX_CONCURRENT_RUNS", "not-a-number").is_err());
    }
}
