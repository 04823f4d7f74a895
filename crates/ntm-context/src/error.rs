//! Per-crate leaf error enum, aggregated by the executor into `ExecutionError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("agent {0} is not registered")]
    NotRegistered(String),

    #[error("failed to read transcript at {path}: {source}")]
    Transcript {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pending-rotation store I/O error: {0}")]
    Store(#[source] std::io::Error),
}
