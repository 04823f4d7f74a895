//! Agent output parser: turns raw terminal bytes into a typed [`ntm_core::AgentState`].

pub mod ansi;
pub mod confidence;
pub mod detect;
pub mod flags;
pub mod metrics;
pub mod parse;
pub mod patterns;

pub use ansi::strip_ansi;
pub use detect::detect_agent_type;
pub use parse::{parse, parse_with_options, ParseOptions};
pub use patterns::{pattern_set_for, registry, PatternSet};
