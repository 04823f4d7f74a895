use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("step id {0:?} is not present in the graph")]
    UnknownStep(String),
}
