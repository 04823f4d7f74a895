//! Context Predictor (C4): linear burn-rate extrapolation over a sliding window.

use chrono::{DateTime, Utc};

use crate::monitor::{ContextMonitor, Observation};

/// Minimum number of samples required before a prediction is trusted.
pub const MIN_SAMPLES: usize = 3;

/// Minimum elapsed wall-clock duration (seconds) spanned by the window
/// before a burn-rate estimate is trusted.
pub const MIN_WINDOW_SECONDS: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// `seconds_to_limit` may be negative or infinite-ish if burn rate is
    /// flat or negative; callers should treat non-positive as "not approaching".
    Estimate {
        burn_rate_tokens_per_second: f64,
        seconds_to_limit: f64,
        exhaustion_at: DateTime<Utc>,
    },
    InsufficientData,
}

/// Extrapolate time-to-limit from the monitor's observation ring for `agent_id`.
pub fn predict(monitor: &ContextMonitor, agent_id: &str, model_limit: i64) -> Prediction {
    let Some(observations) = monitor.observations(agent_id) else {
        return Prediction::InsufficientData;
    };
    predict_from_observations(&observations, model_limit)
}

fn predict_from_observations(observations: &[Observation], model_limit: i64) -> Prediction {
    if observations.len() < MIN_SAMPLES {
        return Prediction::InsufficientData;
    }

    let first = observations.first().unwrap();
    let last = observations.last().unwrap();
    let elapsed_seconds = (last.at - first.at).num_seconds();
    if elapsed_seconds < MIN_WINDOW_SECONDS {
        return Prediction::InsufficientData;
    }

    // Ordinary least squares over (elapsed_seconds_since_first, cumulative_tokens).
    let n = observations.len() as f64;
    let xs: Vec<f64> = observations
        .iter()
        .map(|o| (o.at - first.at).num_seconds() as f64)
        .collect();
    let ys: Vec<f64> = observations.iter().map(|o| o.cumulative_tokens as f64).collect();

    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
    }

    if var_x == 0.0 {
        return Prediction::InsufficientData;
    }

    let burn_rate = cov / var_x;
    if burn_rate <= 0.0 {
        return Prediction::Estimate {
            burn_rate_tokens_per_second: burn_rate,
            seconds_to_limit: f64::INFINITY,
            exhaustion_at: last.at + chrono::Duration::days(3650),
        };
    }

    let remaining = (model_limit as f64 - last.cumulative_tokens as f64).max(0.0);
    let seconds_to_limit = remaining / burn_rate;
    let exhaustion_at = last.at + chrono::Duration::seconds(seconds_to_limit.round() as i64);

    Prediction::Estimate {
        burn_rate_tokens_per_second: burn_rate,
        seconds_to_limit,
        exhaustion_at,
    }
}
