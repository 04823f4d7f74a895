//! Shared error currency passed between core crates.
//!
//! Each subsystem may define its own `thiserror` enum for the errors it can
//! raise internally; at the boundary with the executor those collapse into
//! an [`ErrorKind`] + message pair so `state.errors` has one stable shape
//! regardless of which component produced the failure.

use serde::{Deserialize, Serialize};

/// One of the error kinds enumerated by the error-handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Parse,
    Validation,
    Substitution,
    Condition,
    PaneSelection,
    Timeout,
    Loop,
    Agent,
    Cancelled,
    Control,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::Validation => "validation",
            Self::Substitution => "substitution",
            Self::Condition => "condition",
            Self::PaneSelection => "pane-selection",
            Self::Timeout => "timeout",
            Self::Loop => "loop",
            Self::Agent => "agent",
            Self::Cancelled => "cancelled",
            Self::Control => "control",
        };
        write!(f, "{s}")
    }
}

/// A single recorded failure, attached to `state.errors` and optionally to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub step_id: Option<String>,
    pub fatal: bool,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            step_id: None,
            fatal: false,
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.step_id {
            Some(id) => write!(f, "[{}] {}: {}", id, self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// A `{field, message, hint}` entry produced by validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub hint: Option<String>,
    pub line: Option<u32>,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            hint: None,
            line: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// Errors and warnings collected by a validator before returning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
