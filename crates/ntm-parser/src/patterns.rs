//! Per-agent-type pattern catalog (C2).
//!
//! Deliberately data, not classes: adding a new agent means adding a
//! [`PatternSet`] record to [`registry`], not subtyping a parser.

use ntm_core::AgentType;

/// Per-agent-type catalog of substrings/regex-ish markers used by the parser.
pub struct PatternSet {
    pub agent_type: AgentType,
    /// Header lines that identify this agent with high confidence.
    pub headers: &'static [&'static str],
    /// Substrings that mean "the agent is actively working".
    pub working: &'static [&'static str],
    /// Regexes matched against the last few lines to detect an idle prompt.
    pub idle_prompts: &'static [&'static str],
    /// Substrings that mean "rate limited".
    pub rate_limited: &'static [&'static str],
    /// Substrings that mean "in an error state".
    pub errors: &'static [&'static str],
    /// Phrases hinting the agent itself believes context is running low.
    pub context_low_phrases: &'static [&'static str],
}

pub const CLAUDE_CODE: PatternSet = PatternSet {
    agent_type: AgentType::ClaudeCode,
    headers: &["claude code", "opus", "sonnet", "haiku"],
    working: &[
        "Thinking...",
        "Running...",
        "Writing",
        "Editing",
        "Analyzing",
        "esc to interrupt",
    ],
    idle_prompts: &[r"^\s*>\s*$", r"Human:\s*$"],
    rate_limited: &["rate limit", "429", "overloaded", "529"],
    errors: &["Error:", "panic:", "Traceback", "fatal:"],
    context_low_phrases: &["conversation getting long", "approaching limit"],
};

pub const CODEX: PatternSet = PatternSet {
    agent_type: AgentType::Codex,
    headers: &["codex", "openai", "gpt-4", "gpt-5"],
    working: &["Thinking", "Generating", "Running command", "esc to interrupt"],
    idle_prompts: &[r"^codex>\s*$", r"^\s*›\s*$"],
    rate_limited: &["rate_limit_exceeded", "429", "RateLimitError"],
    errors: &["Error:", "Traceback", "fatal:"],
    context_low_phrases: &[],
};

pub const GEMINI: PatternSet = PatternSet {
    agent_type: AgentType::Gemini,
    headers: &["gemini", "YOLO mode:"],
    working: &["Thinking", "Generating", "Running"],
    idle_prompts: &[r"^gemini>\s*$", r"^\s*>\s*$"],
    rate_limited: &["Resource exhausted", "429", "quota exceeded", "RESOURCE_EXHAUSTED"],
    errors: &["Error:", "Traceback"],
    context_low_phrases: &[],
};

pub const CURSOR: PatternSet = PatternSet {
    agent_type: AgentType::Cursor,
    headers: &["cursor"],
    working: &["Thinking", "Generating", "Running"],
    idle_prompts: &[r"^\s*>\s*$"],
    rate_limited: &["rate limit", "429"],
    errors: &["Error:"],
    context_low_phrases: &[],
};

pub const WINDSURF: PatternSet = PatternSet {
    agent_type: AgentType::Windsurf,
    headers: &["windsurf", "codeium"],
    working: &["Thinking", "Generating", "Running"],
    idle_prompts: &[r"^\s*>\s*$"],
    rate_limited: &["rate limit", "429"],
    errors: &["Error:"],
    context_low_phrases: &[],
};

pub const AIDER: PatternSet = PatternSet {
    agent_type: AgentType::Aider,
    headers: &["aider"],
    working: &["Thinking", "Applying edit", "Running"],
    idle_prompts: &[r"^>\s*$"],
    rate_limited: &["rate limit", "429"],
    errors: &["Error:"],
    context_low_phrases: &[],
};

/// All known pattern sets in declaration order (used for frequency-scoring
/// tie-breaks in agent-type detection).
pub fn registry() -> &'static [&'static PatternSet] {
    &[&CLAUDE_CODE, &CODEX, &GEMINI, &CURSOR, &WINDSURF, &AIDER]
}

pub fn pattern_set_for(agent_type: AgentType) -> Option<&'static PatternSet> {
    registry()
        .iter()
        .find(|p| p.agent_type == agent_type)
        .copied()
}

/// The triple-backtick code fence is always a working indicator, regardless
/// of agent type (§4.1 step 4).
pub const CODE_FENCE: &str = "```";
