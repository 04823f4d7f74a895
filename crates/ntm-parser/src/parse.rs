//! Top-level agent output parser (C1): `parse(raw_output) -> AgentState`.

use chrono::Utc;
use ntm_core::{AgentState, AgentType};

use crate::ansi::strip_ansi;
use crate::confidence::compute_confidence;
use crate::detect::detect_agent_type;
use crate::flags::{context_low_from_phrases, detect_flags};
use crate::metrics::{extract_metrics, DEFAULT_CONTEXT_LOW_THRESHOLD};
use crate::patterns::pattern_set_for;

/// Options controlling the parse: the context-low threshold and how much
/// trailing output to sample.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub context_low_threshold: f64,
    pub sample_length: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            context_low_threshold: DEFAULT_CONTEXT_LOW_THRESHOLD,
            sample_length: 2000,
        }
    }
}

/// Classify a pane's recent output into a typed [`AgentState`].
///
/// Pure function, no I/O; never fails. Malformed input yields
/// `type=unknown, confidence=0` with empty flags.
pub fn parse(raw_output: &str) -> AgentState {
    parse_with_options(raw_output, &ParseOptions::default())
}

pub fn parse_with_options(raw_output: &str, opts: &ParseOptions) -> AgentState {
    let cleaned = strip_ansi(raw_output);
    let agent_type = detect_agent_type(&cleaned);

    let metrics = extract_metrics(agent_type, &cleaned, opts.context_low_threshold);
    let flag_result = detect_flags(agent_type, &cleaned);

    let is_context_low = metrics.is_context_low
        || pattern_set_for(agent_type)
            .map(|p| context_low_from_phrases(p, &cleaned))
            .unwrap_or(false);

    let confidence = compute_confidence(
        agent_type,
        metrics.context_remaining.is_some(),
        metrics.tokens_used.is_some(),
        flag_result.work_indicators.len(),
        flag_result.is_rate_limited || !flag_result.limit_indicators.is_empty(),
        flag_result.is_working,
        flag_result.is_idle,
    );

    let raw_sample = tail(&cleaned, opts.sample_length);

    AgentState {
        agent_type,
        is_working: flag_result.is_working,
        is_idle: flag_result.is_idle,
        is_rate_limited: flag_result.is_rate_limited,
        is_in_error: flag_result.is_in_error,
        is_context_low,
        context_remaining: metrics.context_remaining,
        tokens_used: metrics.tokens_used,
        memory_mb: metrics.memory_mb,
        work_indicators: flag_result.work_indicators,
        limit_indicators: flag_result.limit_indicators,
        confidence,
        parsed_at: Utc::now(),
        raw_sample,
    }
}

fn tail(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(char_count - max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntm_core::Recommendation;

    /// Scenario 1 (§8): Codex low-context recognition.
    #[test]
    fn codex_low_context_recognition() {
        let raw = "Some work done...\n10% context left · ? for shortcuts\ncodex> ";
        let state = parse(raw);
        assert_eq!(state.agent_type, AgentType::Codex);
        assert_eq!(state.context_remaining, Some(10.0));
        assert!(state.is_context_low);
        assert!(state.is_idle);
        assert_eq!(state.recommendation(), Recommendation::ContextLowContinue);
    }

    #[test]
    fn malformed_input_never_fails() {
        let state = parse("");
        assert_eq!(state.agent_type, AgentType::Unknown);
        assert_eq!(state.confidence, 0.0);
    }

    #[test]
    fn confidence_in_bounds_for_any_input() {
        for sample in ["", "garbage \u{1b}[31m bytes", "Claude Opus thinking..."] {
            let state = parse(sample);
            assert!(state.confidence >= 0.0 && state.confidence <= 1.0);
        }
    }

    #[test]
    fn raw_sample_respects_length_cap() {
        let opts = ParseOptions {
            sample_length: 5,
            ..ParseOptions::default()
        };
        let state = parse_with_options("abcdefghij", &opts);
        assert_eq!(state.raw_sample, "fghij");
    }
}
