//! Confidence scoring (§4.1 step 5).

use ntm_core::AgentType;

/// Compute the [0,1] confidence score for a parsed state.
///
/// Starts at 0.5; +0.25 for an explicit percentage, +0.05 for a token
/// count, +0.10 per work indicator (capped at 3), +0.20 for any limit
/// indicator; -0.30 for an unknown agent type, -0.20 when working and idle
/// both hold (a conflicting read).
pub fn compute_confidence(
    agent_type: AgentType,
    has_percentage: bool,
    has_token_count: bool,
    work_indicator_count: usize,
    has_limit_indicator: bool,
    is_working: bool,
    is_idle: bool,
) -> f64 {
    let mut score = 0.5;

    if has_percentage {
        score += 0.25;
    }
    if has_token_count {
        score += 0.05;
    }
    score += 0.10 * work_indicator_count.min(3) as f64;
    if has_limit_indicator {
        score += 0.20;
    }
    if agent_type == AgentType::Unknown {
        score -= 0.30;
    }
    if is_working && is_idle {
        score -= 0.20;
    }

    score.clamp(0.0, 1.0)
}
