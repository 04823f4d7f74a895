//! Agent identity and the parsed-state record produced by the output parser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The AI coding-agent CLI running in a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    ClaudeCode,
    Codex,
    Gemini,
    Cursor,
    Windsurf,
    Aider,
    Unknown,
}

impl AgentType {
    /// Normalize a short alias (`cc`, `cod`, `gmi`, ...) to its canonical variant.
    ///
    /// Unrecognized input falls back to `Unknown` rather than failing; the parser
    /// must never error on malformed input.
    pub fn from_alias(alias: &str) -> Self {
        match alias.to_ascii_lowercase().as_str() {
            "claude-code" | "claude" | "cc" => Self::ClaudeCode,
            "codex" | "cod" => Self::Codex,
            "gemini" | "gemini-cli" | "gmi" => Self::Gemini,
            "cursor" => Self::Cursor,
            "windsurf" => Self::Windsurf,
            "aider" => Self::Aider,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::Cursor => "cursor",
            Self::Windsurf => "windsurf",
            Self::Aider => "aider",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed snapshot produced by classifying a pane's recent output.
///
/// Flags are not mutually exclusive by construction: `is_working` and
/// `is_idle` can both be observed true by the pattern scan (a conflict that
/// lowers `confidence`), and the recommendation priority order in
/// [`AgentState::recommendation`] decides which one wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub is_working: bool,
    pub is_idle: bool,
    pub is_rate_limited: bool,
    pub is_in_error: bool,
    pub is_context_low: bool,
    pub context_remaining: Option<f64>,
    pub tokens_used: Option<i64>,
    pub memory_mb: Option<f64>,
    pub work_indicators: Vec<String>,
    pub limit_indicators: Vec<String>,
    pub confidence: f64,
    pub parsed_at: DateTime<Utc>,
    pub raw_sample: String,
}

impl AgentState {
    /// Derive the actionable recommendation from the flags alone.
    ///
    /// Pure projection, no I/O: priority order highest-first is
    /// rate-limited > working > context-low-with-working > error > idle > unknown.
    pub fn recommendation(&self) -> Recommendation {
        if self.is_rate_limited {
            return Recommendation::RateLimitedWait;
        }
        if self.is_working {
            if self.is_context_low {
                return Recommendation::ContextLowContinue;
            }
            return Recommendation::DoNotInterrupt;
        }
        if self.is_context_low {
            return Recommendation::ContextLowContinue;
        }
        if self.is_in_error {
            return Recommendation::ErrorState;
        }
        if self.is_idle {
            if self.agent_type == AgentType::Unknown {
                return Recommendation::Unknown;
            }
            return Recommendation::Idle;
        }
        if self.agent_type == AgentType::Unknown {
            return Recommendation::Unknown;
        }
        Recommendation::SafeToRestart
    }
}

/// Pure projection of [`AgentState`] flags into an actionable recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    DoNotInterrupt,
    RateLimitedWait,
    ContextLowContinue,
    SafeToRestart,
    ErrorState,
    Idle,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_state() -> AgentState {
        AgentState {
            agent_type: AgentType::ClaudeCode,
            is_working: false,
            is_idle: false,
            is_rate_limited: false,
            is_in_error: false,
            is_context_low: false,
            context_remaining: None,
            tokens_used: None,
            memory_mb: None,
            work_indicators: vec![],
            limit_indicators: vec![],
            confidence: 0.5,
            parsed_at: Utc::now(),
            raw_sample: String::new(),
        }
    }

    #[test]
    fn rate_limited_overrides_everything() {
        let mut s = base_state();
        s.is_working = true;
        s.is_rate_limited = true;
        assert_eq!(s.recommendation(), Recommendation::RateLimitedWait);
    }

    #[test]
    fn working_beats_idle_on_conflict() {
        let mut s = base_state();
        s.is_working = true;
        s.is_idle = true;
        assert_eq!(s.recommendation(), Recommendation::DoNotInterrupt);
    }

    #[test]
    fn working_and_context_low_yields_context_low_continue() {
        let mut s = base_state();
        s.is_working = true;
        s.is_context_low = true;
        assert_eq!(s.recommendation(), Recommendation::ContextLowContinue);
    }

    #[test]
    fn error_state_when_not_working_or_idle() {
        let mut s = base_state();
        s.is_in_error = true;
        assert_eq!(s.recommendation(), Recommendation::ErrorState);
    }

    #[test]
    fn idle_for_known_agent() {
        let mut s = base_state();
        s.is_idle = true;
        assert_eq!(s.recommendation(), Recommendation::Idle);
    }

    #[test]
    fn unknown_agent_idle_reports_unknown() {
        let mut s = base_state();
        s.agent_type = AgentType::Unknown;
        s.is_idle = true;
        assert_eq!(s.recommendation(), Recommendation::Unknown);
    }

    #[test]
    fn alias_normalization() {
        assert_eq!(AgentType::from_alias("cc"), AgentType::ClaudeCode);
        assert_eq!(AgentType::from_alias("cod"), AgentType::Codex);
        assert_eq!(AgentType::from_alias("gmi"), AgentType::Gemini);
        assert_eq!(AgentType::from_alias("nonsense"), AgentType::Unknown);
    }
}
