//! Post-processing a step's raw output (C9, §4.6).

use ntm_core::workflow::{OutputParseSpec, OutputParseType};
use regex::Regex;
use serde_json::Value;

use crate::error::WorkflowError;

pub fn parse(raw: &str, spec: &OutputParseSpec) -> Result<Value, WorkflowError> {
    match spec.parse_type {
        OutputParseType::None => Ok(Value::String(raw.trim().to_string())),
        OutputParseType::FirstLine => Ok(first_line(raw)
            .map(Value::String)
            .unwrap_or(Value::Null)),
        OutputParseType::Lines => Ok(Value::Array(
            non_blank_lines(raw).into_iter().map(Value::String).collect(),
        )),
        OutputParseType::Json => parse_json(raw),
        OutputParseType::Yaml => serde_yaml::from_str(raw).map_err(|err| WorkflowError::OutputParse(err.to_string())),
        OutputParseType::Regex => parse_regex(raw, spec.pattern.as_deref()),
    }
}

fn first_line(raw: &str) -> Option<String> {
    raw.lines().map(str::trim).find(|line| !line.is_empty()).map(str::to_string)
}

fn non_blank_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_json(raw: &str) -> Result<Value, WorkflowError> {
    let block = find_json_block(raw).ok_or_else(|| WorkflowError::OutputParse("no JSON object or array found in output".to_string()))?;
    serde_json::from_str(block).map_err(|err| WorkflowError::OutputParse(err.to_string()))
}

/// Balanced-delimiter scan for the first maximal `{...}` or `[...]` block,
/// respecting double-quoted strings and `\`-escapes.
fn find_json_block(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{' || b == b'[')?;
    let opener = bytes[start];
    let closer = if opener == b'{' { b'}' } else { b']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escape {
            escape = false;
            continue;
        }
        match b {
            b'\\' if in_string => escape = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            _ if b == opener => depth += 1,
            _ if b == closer => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return std::str::from_utf8(&bytes[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_regex(raw: &str, pattern: Option<&str>) -> Result<Value, WorkflowError> {
    let pattern = match pattern {
        Some(p) if !p.is_empty() => p,
        _ => return Err(WorkflowError::OutputParse("regex output_parse requires a non-empty pattern".to_string())),
    };
    let re = Regex::new(pattern).map_err(|err| WorkflowError::OutputParse(err.to_string()))?;

    let Some(captures) = re.captures(raw) else {
        return Ok(Value::Null);
    };

    let named: Vec<&str> = re.capture_names().flatten().collect();
    if !named.is_empty() {
        let mut map = serde_json::Map::new();
        for name in named {
            if let Some(m) = captures.name(name) {
                map.insert(name.to_string(), Value::String(m.as_str().to_string()));
            }
        }
        return Ok(Value::Object(map));
    }

    if captures.len() > 1 {
        let list: Vec<Value> = captures
            .iter()
            .skip(1)
            .map(|m| m.map(|m| Value::String(m.as_str().to_string())).unwrap_or(Value::Null))
            .collect();
        return Ok(Value::Array(list));
    }

    Ok(Value::String(captures.get(0).unwrap().as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(parse_type: OutputParseType, pattern: Option<&str>) -> OutputParseSpec {
        OutputParseSpec { parse_type, pattern: pattern.map(str::to_string) }
    }

    #[test]
    fn none_trims_the_whole_buffer() {
        let result = parse("  hello world  \n", &spec(OutputParseType::None, None)).unwrap();
        assert_eq!(result, Value::String("hello world".to_string()));
    }

    #[test]
    fn first_line_skips_leading_blanks() {
        let result = parse("\n\n  first real line  \nsecond", &spec(OutputParseType::FirstLine, None)).unwrap();
        assert_eq!(result, Value::String("first real line".to_string()));
    }

    #[test]
    fn lines_drops_blank_entries() {
        let result = parse("a\n\n  b  \n\nc", &spec(OutputParseType::Lines, None)).unwrap();
        assert_eq!(result, Value::Array(vec![Value::String("a".into()), Value::String("b".into()), Value::String("c".into())]));
    }

    #[test]
    fn json_extracts_first_balanced_object_from_prose() {
        let raw = r#"here is the result: {"status": "ok", "count": 3} -- done"#;
        let result = parse(raw, &spec(OutputParseType::Json, None)).unwrap();
        assert_eq!(result["status"], "ok");
        assert_eq!(result["count"], 3);
    }

    #[test]
    fn json_handles_braces_inside_quoted_strings() {
        let raw = r#"{"note": "use a { in text", "ok": true}"#;
        let result = parse(raw, &spec(OutputParseType::Json, None)).unwrap();
        assert_eq!(result["note"], "use a { in text");
    }

    #[test]
    fn json_errors_when_no_block_present() {
        assert!(parse("no structured data here", &spec(OutputParseType::Json, None)).is_err());
    }

    #[test]
    fn yaml_decodes_the_whole_buffer() {
        let result = parse("status: ok\ncount: 2\n", &spec(OutputParseType::Yaml, None)).unwrap();
        assert_eq!(result["status"], "ok");
        assert_eq!(result["count"], 2);
    }

    #[test]
    fn regex_named_groups_become_a_map() {
        let raw = "deployed version 1.4.2 to prod";
        let result = parse(raw, &spec(OutputParseType::Regex, Some(r"version (?P<version>[\d.]+) to (?P<env>\w+)"))).unwrap();
        assert_eq!(result["version"], "1.4.2");
        assert_eq!(result["env"], "prod");
    }

    #[test]
    fn regex_unnamed_groups_become_a_list() {
        let result = parse("key=value", &spec(OutputParseType::Regex, Some(r"(\w+)=(\w+)"))).unwrap();
        assert_eq!(result, Value::Array(vec![Value::String("key".into()), Value::String("value".into())]));
    }

    #[test]
    fn regex_no_groups_returns_full_match() {
        let result = parse("build succeeded", &spec(OutputParseType::Regex, Some("succeeded"))).unwrap();
        assert_eq!(result, Value::String("succeeded".to_string()));
    }

    #[test]
    fn regex_no_match_is_null() {
        let result = parse("nothing relevant", &spec(OutputParseType::Regex, Some("absent-pattern"))).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn regex_requires_a_nonempty_pattern() {
        assert!(parse("x", &spec(OutputParseType::Regex, Some(""))).is_err());
        assert!(parse("x", &spec(OutputParseType::Regex, None)).is_err());
    }
}
