use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("unrecognized workflow file extension: {0}")]
    UnknownExtension(String),

    #[error("failed to parse workflow file: {0}")]
    Parse(String),

    #[error("unresolved substitution expression(s) in: {0}")]
    Substitution(String),

    #[error("condition evaluation error: {0}")]
    Condition(String),

    #[error("output parse error: {0}")]
    OutputParse(String),
}
