//! Shared types for the agent-orchestration runtime: agent state, the
//! declarative workflow model, execution state, and the error currency that
//! flows between every other crate in this workspace.

pub mod adapter;
pub mod agent;
pub mod context;
pub mod error;
pub mod execution;
pub mod task;
pub mod workflow;

pub use adapter::{PaneDetect, PaneDetectState, PaneInfo, TerminalAdapter, DRY_RUN_PANE};
pub use agent::{AgentState, AgentType, Recommendation};
pub use context::{ContextState, DefaultAction, HandoffRecommendation, PendingRotation, DEFAULT_DISCOUNT};
pub use error::{ErrorKind, ExecutionError, ValidationIssue, ValidationResult};
pub use execution::{ExecutionState, RunStatus, StepResult, StepStatus};
pub use task::TaskType;
pub use workflow::{
    LoopConfig, LoopMode, OnError, OutputParseSpec, OutputParseType, PaneSelector, RetryBackoff,
    RoutePolicy, Step, WaitMode, Workflow, WorkflowSettings,
};
