//! For-each / while / times loop dispatch (C10, §4.7).

use std::future::Future;

use ntm_core::workflow::{LoopConfig, LoopMode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{ControlSignal, ExecutorError};

/// Per-iteration bookkeeping exposed to the substitution context as
/// `loop.item`, `loop.index`, `loop.count`, `loop.first`, `loop.last`, and
/// `loop.<as_name>` (an alias for `item`).
#[derive(Debug, Clone)]
pub struct LoopIterationContext {
    pub as_name: String,
    pub item: Option<Value>,
    pub index: u64,
    pub count: u64,
    pub first: bool,
    pub last: bool,
}

/// What a single iteration's step(s) produced.
pub enum IterationOutcome {
    Completed(Option<Value>),
    Break,
    Continue,
}

pub struct LoopResult {
    pub iterations: u64,
    pub collected: Vec<Value>,
}

/// Run `config` to completion, invoking `run_iteration` once per iteration.
/// The condition for `while` mode is evaluated against `while_text`, the
/// pre-substituted expression text re-rendered by the caller each pass
/// (substitution must happen fresh every iteration, so the caller owns it).
pub async fn run_loop<F, Fut>(
    config: &LoopConfig,
    mut while_eval: impl FnMut() -> Result<bool, ExecutorError>,
    mut run_iteration: F,
    cancellation: &CancellationToken,
) -> Result<LoopResult, ExecutorError>
where
    F: FnMut(LoopIterationContext) -> Fut,
    Fut: Future<Output = Result<IterationOutcome, ExecutorError>>,
{
    let cap = config.max_iterations;
    let mode = config.dispatch_mode();
    let items = resolve_items(config, mode)?;

    let planned_total = match mode {
        LoopMode::ForEach => items.as_ref().map(|v| v.len() as u64),
        LoopMode::Times => config.times,
        LoopMode::While => None,
    };

    if let Some(total) = planned_total {
        if total > cap {
            return Err(ExecutorError::Loop(format!(
                "iteration count {total} exceeds max_iterations {cap}"
            )));
        }
    }

    let mut collected = Vec::new();
    let mut index: u64 = 0;

    loop {
        if cancellation.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }

        if index >= cap {
            return Err(ExecutorError::Loop(format!("iteration cap {cap} exceeded")));
        }

        let (should_run, item, last) = match mode {
            LoopMode::ForEach => {
                let items = items.as_ref().expect("for-each always resolves an item list");
                match items.get(index as usize) {
                    Some(value) => (true, Some(value.clone()), index as usize + 1 == items.len()),
                    None => (false, None, true),
                }
            }
            LoopMode::Times => {
                let total = config.times.unwrap_or(0);
                (index < total, None, index + 1 == total)
            }
            LoopMode::While => (while_eval()?, None, false),
        };

        if !should_run {
            break;
        }

        let count = planned_total.unwrap_or(index + 1);
        let ctx = LoopIterationContext {
            as_name: config.as_name.clone(),
            item,
            index,
            count,
            first: index == 0,
            last,
        };

        match run_iteration(ctx).await? {
            IterationOutcome::Completed(value) => {
                if let Some(value) = value {
                    collected.push(value);
                }
            }
            IterationOutcome::Break => break,
            IterationOutcome::Continue => {}
        }

        index += 1;

        if config.delay_seconds > 0 {
            tokio::select! {
                _ = cancellation.cancelled() => return Err(ExecutorError::Cancelled),
                _ = tokio::time::sleep(std::time::Duration::from_secs(config.delay_seconds)) => {}
            }
        }
    }

    Ok(LoopResult { iterations: index, collected })
}

/// Resolve `items` for for-each mode: a JSON list as-is, or a scalar
/// coerced to a list via comma-split.
fn resolve_items(config: &LoopConfig, mode: LoopMode) -> Result<Option<Vec<Value>>, ExecutorError> {
    if mode != LoopMode::ForEach {
        return Ok(None);
    }
    let Some(raw) = &config.items else {
        return Err(ExecutorError::Loop("for-each loop requires items".to_string()));
    };
    match raw {
        Value::Array(list) => Ok(Some(list.clone())),
        Value::String(s) => Ok(Some(s.split(',').map(|part| Value::String(part.trim().to_string())).collect())),
        other => Ok(Some(vec![other.clone()])),
    }
}

/// Convert a leaked `break`/`continue` signal (one that escaped the loop
/// body it was meant for) into a `loop` error.
pub fn control_signal_escaped(signal: ControlSignal) -> ExecutorError {
    ExecutorError::Loop(format!("{signal} signal used outside of a loop"))
}
