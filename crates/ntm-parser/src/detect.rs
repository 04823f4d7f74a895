//! Agent-type detection (§4.1 step 2).
//!
//! Priority order: explicit Claude/Codex/Gemini signals first, then the
//! other headers, then a fallback frequency score across each pattern
//! set's working-pattern catalog.

use ntm_core::AgentType;
use regex::Regex;
use std::sync::LazyLock;

use crate::patterns::registry;

static CLAUDE_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(opus|claude|sonnet|haiku)(\s*\d+(\.\d+)?)?\b").unwrap());

static CODEX_CONTEXT_PCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)%\s*context\s*left").unwrap());

static CODEX_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(codex|openai|gpt-\d+)\b").unwrap());

static GEMINI_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(gemini)\b|YOLO mode:").unwrap());

static CURSOR_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bcursor\b").unwrap());
static WINDSURF_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(windsurf|codeium)\b").unwrap());
static AIDER_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\baider\b").unwrap());

/// Detect the agent type from cleaned (ANSI-stripped) output.
///
/// Priority, highest first: (i) Claude header; (ii) Codex explicit context
/// percent display; (iii) Codex header; (iv) Gemini header/YOLO marker;
/// (v) Cursor/Windsurf/Aider headers; (vi) fallback pattern-frequency
/// scoring, ties broken by declaration order; `Unknown` if all scores are
/// zero.
pub fn detect_agent_type(cleaned: &str) -> AgentType {
    if CLAUDE_HEADER_RE.is_match(cleaned) {
        return AgentType::ClaudeCode;
    }
    if CODEX_CONTEXT_PCT_RE.is_match(cleaned) {
        return AgentType::Codex;
    }
    if CODEX_HEADER_RE.is_match(cleaned) {
        return AgentType::Codex;
    }
    if GEMINI_HEADER_RE.is_match(cleaned) {
        return AgentType::Gemini;
    }
    if CURSOR_HEADER_RE.is_match(cleaned) {
        return AgentType::Cursor;
    }
    if WINDSURF_HEADER_RE.is_match(cleaned) {
        return AgentType::Windsurf;
    }
    if AIDER_HEADER_RE.is_match(cleaned) {
        return AgentType::Aider;
    }

    fallback_frequency_score(cleaned)
}

fn fallback_frequency_score(cleaned: &str) -> AgentType {
    let mut best_type = AgentType::Unknown;
    let mut best_score = 0usize;

    for pattern_set in registry() {
        let score = pattern_set
            .working
            .iter()
            .filter(|p| cleaned.contains(*p))
            .count();
        if score > best_score {
            best_score = score;
            best_type = pattern_set.agent_type;
        }
    }

    if best_score == 0 {
        AgentType::Unknown
    } else {
        best_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_claude_header() {
        assert_eq!(detect_agent_type("Claude Opus 4.5\n> "), AgentType::ClaudeCode);
    }

    #[test]
    fn detects_codex_context_percent() {
        assert_eq!(
            detect_agent_type("some output\n10% context left\ncodex> "),
            AgentType::Codex
        );
    }

    #[test]
    fn detects_gemini_yolo_marker() {
        assert_eq!(detect_agent_type("YOLO mode: enabled\n"), AgentType::Gemini);
    }

    #[test]
    fn fallback_scoring_breaks_ties_by_declaration_order() {
        // "Thinking" appears in every pattern set's working list; Claude Code
        // is declared first in registry() so it wins ties.
        assert_eq!(detect_agent_type("Thinking..."), AgentType::ClaudeCode);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        assert_eq!(detect_agent_type("just some random text"), AgentType::Unknown);
    }
}
