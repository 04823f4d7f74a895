//! Durable persistence for `ExecutionState` (C13).

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::PipelineStore;
