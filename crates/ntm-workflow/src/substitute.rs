//! Variable substitution (C7, §4.5).
//!
//! A hand-written character scanner, not a regex, so quoted defaults and
//! literal braces inside them are handled without surprises.

use std::collections::HashMap;

use chrono::Utc;
use ntm_core::execution::{format_duration, StepResult};
use serde_json::Value;

use crate::error::WorkflowError;

/// Everything the substitutor needs to resolve a `${...}` expression.
pub struct SubstitutionContext<'a> {
    pub vars: &'a Value,
    pub steps: &'a HashMap<String, StepResult>,
    pub loop_vars: &'a HashMap<String, Value>,
    pub session: &'a str,
    pub run_id: &'a str,
    pub workflow: &'a str,
}

/// Best-effort substitution: unresolved expressions without a default
/// become the empty string.
pub fn substitute(text: &str, ctx: &SubstitutionContext) -> String {
    substitute_impl(text, ctx, false).expect("non-strict substitution never fails")
}

/// Substitution that fails if any `${...}` expression could not be resolved
/// and had no default.
pub fn substitute_strict(text: &str, ctx: &SubstitutionContext) -> Result<String, WorkflowError> {
    substitute_impl(text, ctx, true)
}

fn substitute_impl(text: &str, ctx: &SubstitutionContext, strict: bool) -> Result<String, WorkflowError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    let mut any_unresolved = false;

    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() && chars[i + 1] == '$' {
            out.push('$');
            i += 2;
            continue;
        }

        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '{' {
            match scan_expression(&chars, i + 2) {
                Some((inner, end)) => {
                    let (rendered, resolved) = resolve_expression(&inner, ctx);
                    if !resolved {
                        any_unresolved = true;
                    }
                    out.push_str(&rendered);
                    i = end + 1;
                    continue;
                }
                None => {
                    // Unterminated expression: emit the rest literally.
                    out.extend(&chars[i..]);
                    i = chars.len();
                    continue;
                }
            }
        }

        out.push(chars[i]);
        i += 1;
    }

    if strict && any_unresolved {
        return Err(WorkflowError::Substitution(text.to_string()));
    }

    Ok(out)
}

/// Scan forward from `start` (just past `${`) to the matching unquoted `}`.
/// Returns the inner text and the index of the closing brace.
fn scan_expression(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut j = start;
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;
    let mut depth = 1u32;

    while j < chars.len() {
        let c = chars[j];
        if escape {
            escape = false;
            j += 1;
            continue;
        }
        match c {
            '\\' if in_single || in_double => escape = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '{' if !in_single && !in_double => depth += 1,
            '}' if !in_single && !in_double => {
                depth -= 1;
                if depth == 0 {
                    return Some((chars[start..j].iter().collect(), j));
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// `resolved` is true when no literal `${...}` survives: either the path
/// resolved, or a default (bare/quoted) was applied.
fn resolve_expression(inner: &str, ctx: &SubstitutionContext) -> (String, bool) {
    let (path_part, default_part) = split_default(inner);
    let path = path_part.trim();

    match resolve_path(path, ctx) {
        Some(value) => (format_value(&value), true),
        None => match default_part {
            Some(default) => (unquote(default.trim()), true),
            None => (String::new(), false),
        },
    }
}

/// Split on the first unquoted `|`.
fn split_default(inner: &str) -> (&str, Option<&str>) {
    let chars: Vec<char> = inner.chars().collect();
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;

    for (idx, &c) in chars.iter().enumerate() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_single || in_double => escape = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '|' if !in_single && !in_double => {
                let byte_idx = byte_index(inner, idx);
                let split_at = byte_index(inner, idx + 1);
                return (&inner[..byte_idx], Some(&inner[split_at..]));
            }
            _ => {}
        }
    }
    (inner, None)
}

fn byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices().nth(char_idx).map(|(b, _)| b).unwrap_or(s.len())
}

fn unquote(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn resolve_path(path: &str, ctx: &SubstitutionContext) -> Option<Value> {
    if path.is_empty() {
        return None;
    }
    let mut components = path.split('.');
    let namespace = components.next()?;
    let rest: Vec<&str> = components.collect();

    match namespace {
        "vars" => traverse(ctx.vars, &rest),
        "steps" => resolve_step_path(&rest, ctx.steps),
        "env" => rest.first().and_then(|key| std::env::var(key).ok()).map(Value::String),
        "loop" => {
            let field = rest.first().copied().unwrap_or("item");
            ctx.loop_vars.get(field).cloned()
        }
        "session" => Some(Value::String(ctx.session.to_string())),
        "run_id" => Some(Value::String(ctx.run_id.to_string())),
        "workflow" => Some(Value::String(ctx.workflow.to_string())),
        "timestamp" => Some(Value::String(Utc::now().to_rfc3339())),
        _ => None,
    }
}

fn resolve_step_path(rest: &[&str], steps: &HashMap<String, StepResult>) -> Option<Value> {
    let step_id = rest.first()?;
    let field = rest.get(1)?;
    let nested = if rest.len() > 2 { &rest[2..] } else { &[] };
    let result = steps.get(*step_id)?;

    match *field {
        "output" => {
            if nested.is_empty() {
                result.output.clone().map(Value::String)
            } else {
                traverse(result.parsed_data.as_ref()?, nested)
            }
        }
        "data" => traverse(result.parsed_data.as_ref()?, nested),
        "status" => result.status.and_then(|s| serde_json::to_value(s).ok()),
        "pane" => result.pane_used.clone().map(Value::String),
        "agent" => result.agent_type.clone().map(Value::String),
        "duration" => {
            let duration = match (result.started_at, result.finished_at) {
                (Some(start), Some(finish)) => finish - start,
                _ => chrono::Duration::zero(),
            };
            Some(Value::String(format_duration(duration)))
        }
        _ => None,
    }
}

fn traverse(root: &Value, parts: &[&str]) -> Option<Value> {
    let mut current = root.clone();
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(*part)?.clone(),
            Value::Array(list) => list.get(part.parse::<usize>().ok()?)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_else(|_| value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntm_core::execution::StepStatus;
    use serde_json::json;

    fn ctx<'a>(vars: &'a Value, steps: &'a HashMap<String, StepResult>, loop_vars: &'a HashMap<String, Value>) -> SubstitutionContext<'a> {
        SubstitutionContext {
            vars,
            steps,
            loop_vars,
            session: "sess-1",
            run_id: "run-1",
            workflow: "deploy",
        }
    }

    /// Idempotence invariant (§8): substitute is a no-op without `${`.
    #[test]
    fn idempotent_without_markers() {
        let vars = json!({});
        let steps = HashMap::new();
        let loop_vars = HashMap::new();
        let c = ctx(&vars, &steps, &loop_vars);
        assert_eq!(substitute("plain text, no markers", &c), "plain text, no markers");
    }

    /// Scenario 4 (§8): default fallback and override.
    #[test]
    fn default_fallback_and_override() {
        let vars = json!({});
        let steps = HashMap::new();
        let loop_vars = HashMap::new();
        let c = ctx(&vars, &steps, &loop_vars);
        assert_eq!(
            substitute(r#"User: ${vars.undefined | "guest"}"#, &c),
            "User: guest"
        );

        let vars2 = json!({"undefined": "alice"});
        let c2 = ctx(&vars2, &steps, &loop_vars);
        assert_eq!(
            substitute(r#"User: ${vars.undefined | "guest"}"#, &c2),
            "User: alice"
        );
    }

    #[test]
    fn nested_vars_path_and_list_index() {
        let vars = json!({"config": {"hosts": ["a.example", "b.example"]}});
        let steps = HashMap::new();
        let loop_vars = HashMap::new();
        let c = ctx(&vars, &steps, &loop_vars);
        assert_eq!(substitute("${vars.config.hosts.1}", &c), "b.example");
    }

    #[test]
    fn step_output_and_duration() {
        let vars = json!({});
        let mut steps = HashMap::new();
        let now = Utc::now();
        steps.insert(
            "build".to_string(),
            StepResult {
                status: Some(StepStatus::Completed),
                output: Some("build ok".to_string()),
                started_at: Some(now),
                finished_at: Some(now + chrono::Duration::seconds(90)),
                ..StepResult::default()
            },
        );
        let loop_vars = HashMap::new();
        let c = ctx(&vars, &steps, &loop_vars);
        assert_eq!(substitute("${steps.build.output}", &c), "build ok");
        assert_eq!(substitute("${steps.build.duration}", &c), "1m30s");
        assert_eq!(substitute("${steps.build.status}", &c), "completed");
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let vars = json!({});
        let steps = HashMap::new();
        let loop_vars = HashMap::new();
        let c = ctx(&vars, &steps, &loop_vars);
        assert_eq!(substitute(r"price: \${vars.x}", &c), "price: ${vars.x}");
    }

    #[test]
    fn strict_mode_fails_on_missing_without_default() {
        let vars = json!({});
        let steps = HashMap::new();
        let loop_vars = HashMap::new();
        let c = ctx(&vars, &steps, &loop_vars);
        assert!(substitute_strict("${vars.missing}", &c).is_err());
    }

    #[test]
    fn strict_mode_passes_with_default() {
        let vars = json!({});
        let steps = HashMap::new();
        let loop_vars = HashMap::new();
        let c = ctx(&vars, &steps, &loop_vars);
        assert!(substitute_strict("${vars.missing | fallback}", &c).is_ok());
    }

    #[test]
    fn loop_item_alias() {
        let vars = json!({});
        let steps = HashMap::new();
        let mut loop_vars = HashMap::new();
        loop_vars.insert("item".to_string(), json!("file.txt"));
        let c = ctx(&vars, &steps, &loop_vars);
        assert_eq!(substitute("${loop.item}", &c), "file.txt");
    }
}
