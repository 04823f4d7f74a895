use ntm_core::error::{ErrorKind, ExecutionError};
use ntm_workflow::WorkflowError;
use thiserror::Error;

/// Per-crate error enum; collapses into [`ExecutionError`] at the step
/// boundary so `state.errors` has one stable shape regardless of which
/// component raised the failure (§7).
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("loop error: {0}")]
    Loop(String),

    /// `break`/`continue` confined to a loop body; leaking past the loop
    /// boundary is converted to `ExecutorError::Loop` by the caller.
    #[error("control signal outside a loop: {0}")]
    Control(ControlSignal),

    #[error("pane selection failed: {0}")]
    PaneSelection(String),

    #[error("step timed out: {0}")]
    Timeout(String),

    #[error("agent adapter error: {0}")]
    Agent(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("substitution error: {0}")]
    Substitution(String),

    #[error("condition error: {0}")]
    Condition(String),

    #[error("output parse error: {0}")]
    OutputParse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Break,
    Continue,
}

impl std::fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Break => write!(f, "break"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

impl From<WorkflowError> for ExecutorError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Substitution(msg) => Self::Substitution(msg),
            WorkflowError::Condition(msg) => Self::Condition(msg),
            WorkflowError::OutputParse(msg) => Self::OutputParse(msg),
            other => Self::OutputParse(other.to_string()),
        }
    }
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Loop(_) => ErrorKind::Loop,
            Self::Control(_) => ErrorKind::Control,
            Self::PaneSelection(_) => ErrorKind::PaneSelection,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Agent(_) => ErrorKind::Agent,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Substitution(_) => ErrorKind::Substitution,
            Self::Condition(_) => ErrorKind::Condition,
            Self::OutputParse(_) => ErrorKind::Parse,
        }
    }

    pub fn into_execution_error(self, step_id: impl Into<String>, fatal: bool) -> ExecutionError {
        let error = ExecutionError::new(self.kind(), self.to_string()).with_step(step_id);
        if fatal {
            error.fatal()
        } else {
            error
        }
    }
}
