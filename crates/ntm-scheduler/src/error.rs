use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no idle candidate available for task type {0}")]
    NoCandidate(String),
}
