//! Capability matrix, task classifier, and agent scorer (C12).

pub mod classifier;
pub mod error;
pub mod matrix;
pub mod scorer;

pub use classifier::classify;
pub use error::SchedulerError;
pub use matrix::CapabilityMatrix;
pub use scorer::{select_agent, Candidate};
