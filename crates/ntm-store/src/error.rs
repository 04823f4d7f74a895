use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file not found for run {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed state file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid cleanup threshold: {0}")]
    InvalidThreshold(String),
}
