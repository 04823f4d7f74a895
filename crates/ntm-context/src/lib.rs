//! Context Monitor, Predictor, and Handoff Trigger (C3/C4/C5).

pub mod error;
pub mod limits;
pub mod monitor;
pub mod predictor;
pub mod store;
pub mod trigger;

pub use error::ContextError;
pub use limits::ModelLimits;
pub use monitor::{ContextMonitor, Observation, OBSERVATION_WINDOW, TRANSCRIPT_BYTES_PER_TOKEN};
pub use predictor::{predict, Prediction, MIN_SAMPLES, MIN_WINDOW_SECONDS};
pub use store::PendingRotationStore;
pub use trigger::{HandoffCallback, HandoffPolicy, HandoffTrigger};
