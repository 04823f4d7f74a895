//! Workflow file loading and schema validation (§6).
//!
//! Reads the file, then deserializes by extension (YAML or TOML) rather
//! than sniffing content.

use std::path::Path;

use ntm_core::error::{ValidationIssue, ValidationResult};
use ntm_core::workflow::{is_valid_workflow_name, Workflow};

use crate::error::WorkflowError;

/// Load and parse a workflow file; format is chosen by extension
/// (`.yaml`/`.yml` → YAML, `.toml` → TOML).
pub fn load_from_path(path: &Path) -> Result<Workflow, WorkflowError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| WorkflowError::Parse(format!("{}: {err}", path.display())))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    load_from_str(&content, &extension)
}

pub fn load_from_str(content: &str, extension: &str) -> Result<Workflow, WorkflowError> {
    match extension {
        "yaml" | "yml" => serde_yaml::from_str(content).map_err(|err| WorkflowError::Parse(err.to_string())),
        "toml" => toml::from_str(content).map_err(|err| WorkflowError::Parse(err.to_string())),
        other => Err(WorkflowError::UnknownExtension(other.to_string())),
    }
}

/// Validate required top-level keys and per-step shape, collecting every
/// issue rather than failing on the first one found (§6).
pub fn validate_schema(workflow: &Workflow) -> ValidationResult {
    let mut result = ValidationResult::default();

    if workflow.schema_version.trim().is_empty() {
        result.errors.push(ValidationIssue::new("schema_version", "schema_version is required"));
    }

    if !is_valid_workflow_name(&workflow.name) {
        result.errors.push(
            ValidationIssue::new("name", format!("{:?} does not match [A-Za-z0-9_.-]+", workflow.name))
                .with_hint("workflow names may only use letters, digits, '_', '.', and '-'"),
        );
    }

    if workflow.steps.is_empty() {
        result.errors.push(ValidationIssue::new("steps", "a workflow must declare at least one step"));
        return result;
    }

    let mut seen_ids = std::collections::HashSet::new();
    for (index, step) in workflow.steps.iter().enumerate() {
        for id in step.all_ids() {
            if !ntm_core::workflow::is_valid_step_id(id) {
                result.errors.push(
                    ValidationIssue::new(format!("steps[{index}].id"), format!("step id {id:?} contains invalid characters")),
                );
            }
            if !seen_ids.insert(id.to_string()) {
                result.errors.push(
                    ValidationIssue::new(format!("steps[{index}].id"), format!("duplicate step id {id:?}")),
                );
            }
        }

        if step.prompt.is_none() && step.prompt_file.is_none() && step.loop_config.is_none() && step.parallel.is_empty() {
            result.warnings.push(ValidationIssue::new(
                format!("steps[{index}].prompt"),
                "step has neither prompt nor prompt_file, loop, or parallel steps",
            ));
        }

        if let Some(pattern) = step.output_parse.pattern.as_deref() {
            if pattern.is_empty() && step.output_parse.parse_type == ntm_core::workflow::OutputParseType::Regex {
                result.errors.push(ValidationIssue::new(
                    format!("steps[{index}].output_parse.pattern"),
                    "regex output_parse requires a non-empty pattern",
                ));
            }
        } else if step.output_parse.parse_type == ntm_core::workflow::OutputParseType::Regex {
            result.errors.push(ValidationIssue::new(
                format!("steps[{index}].output_parse.pattern"),
                "regex output_parse requires a pattern",
            ));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML_WORKFLOW: &str = r#"
schema_version: "1"
name: deploy
steps:
  - id: build
    prompt: "build it"
  - id: test
    prompt: "test it"
    depends_on: [build]
"#;

    const TOML_WORKFLOW: &str = r#"
schema_version = "1"
name = "deploy"

[[steps]]
id = "build"
prompt = "build it"
"#;

    #[test]
    fn loads_yaml_workflow() {
        let wf = load_from_str(YAML_WORKFLOW, "yaml").unwrap();
        assert_eq!(wf.name, "deploy");
        assert_eq!(wf.steps.len(), 2);
    }

    #[test]
    fn loads_toml_workflow() {
        let wf = load_from_str(TOML_WORKFLOW, "toml").unwrap();
        assert_eq!(wf.name, "deploy");
        assert_eq!(wf.steps.len(), 1);
    }

    #[test]
    fn unknown_extension_rejected() {
        assert!(load_from_str("{}", "json").is_err());
    }

    #[test]
    fn valid_workflow_has_no_errors() {
        let wf = load_from_str(YAML_WORKFLOW, "yaml").unwrap();
        assert!(validate_schema(&wf).is_valid());
    }

    #[test]
    fn duplicate_step_ids_are_an_error() {
        let yaml = r#"
schema_version: "1"
name: deploy
steps:
  - id: build
    prompt: "one"
  - id: build
    prompt: "two"
"#;
        let wf = load_from_str(yaml, "yaml").unwrap();
        let result = validate_schema(&wf);
        assert!(result.errors.iter().any(|e| e.message.contains("duplicate")));
    }

    #[test]
    fn empty_steps_rejected() {
        let yaml = "schema_version: \"1\"\nname: deploy\nsteps: []\n";
        let wf = load_from_str(yaml, "yaml").unwrap();
        assert!(!validate_schema(&wf).is_valid());
    }
}
