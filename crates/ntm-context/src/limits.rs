//! Per-model token limit table (§3.1 `context.models`).

use std::collections::HashMap;

/// Fallback limit used for models absent from the table.
pub const DEFAULT_MODEL_LIMIT: i64 = 200_000;

/// Per-model limit overrides, keyed by the model name the agent reports.
#[derive(Debug, Clone)]
pub struct ModelLimits {
    pub models: HashMap<String, i64>,
    pub default_limit: i64,
}

impl Default for ModelLimits {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert("claude-opus-4".to_string(), 200_000);
        models.insert("claude-sonnet-4".to_string(), 200_000);
        models.insert("claude-haiku".to_string(), 200_000);
        models.insert("gpt-5".to_string(), 400_000);
        models.insert("gpt-4".to_string(), 128_000);
        models.insert("gemini-2.5-pro".to_string(), 1_000_000);
        models.insert("gemini-1.5-pro".to_string(), 1_000_000);
        Self {
            models,
            default_limit: DEFAULT_MODEL_LIMIT,
        }
    }
}

impl ModelLimits {
    pub fn limit_for(&self, model: &str) -> i64 {
        self.models.get(model).copied().unwrap_or(self.default_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back_to_default() {
        let limits = ModelLimits::default();
        assert_eq!(limits.limit_for("some-unlisted-model"), DEFAULT_MODEL_LIMIT);
    }

    #[test]
    fn known_model_uses_table_value() {
        let limits = ModelLimits::default();
        assert_eq!(limits.limit_for("gpt-5"), 400_000);
    }
}
