//! Agent-specific metric extraction (§4.1 step 3).

use ntm_core::AgentType;
use regex::Regex;
use std::sync::LazyLock;

static CODEX_PCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)%\s*context\s*left").unwrap());
static CODEX_TOKENS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Token usage:\s*total=([\d,]+)").unwrap());
static GEMINI_MEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)([\d.]+)\s*MB").unwrap());

pub const DEFAULT_CONTEXT_LOW_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, Default)]
pub struct ExtractedMetrics {
    pub context_remaining: Option<f64>,
    pub tokens_used: Option<i64>,
    pub memory_mb: Option<f64>,
    pub is_context_low: bool,
}

/// Extract whatever metrics the given agent type's output format exposes.
pub fn extract_metrics(agent_type: AgentType, cleaned: &str, context_low_threshold: f64) -> ExtractedMetrics {
    let mut out = ExtractedMetrics::default();

    match agent_type {
        AgentType::Codex => {
            if let Some(caps) = CODEX_PCT_RE.captures(cleaned) {
                if let Ok(pct) = caps[1].parse::<f64>() {
                    out.context_remaining = Some(pct);
                    out.is_context_low = pct < context_low_threshold;
                }
            }
            if let Some(caps) = CODEX_TOKENS_RE.captures(cleaned) {
                let digits: String = caps[1].chars().filter(|c| *c != ',').collect();
                if let Ok(tokens) = digits.parse::<i64>() {
                    out.tokens_used = Some(tokens);
                }
            }
        }
        AgentType::Gemini => {
            if let Some(caps) = GEMINI_MEM_RE.captures(cleaned) {
                if let Ok(mb) = caps[1].parse::<f64>() {
                    out.memory_mb = Some(mb);
                }
            }
        }
        AgentType::ClaudeCode => {
            // No explicit metrics; context-low is inferred from phrasing
            // in `flags.rs` using the pattern set's `context_low_phrases`.
        }
        _ => {}
    }

    out
}
