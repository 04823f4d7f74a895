//! Dependency graph (C6): construction, cycle/missing-dep validation,
//! topological ordering, and runtime executed/failed bookkeeping.

pub mod error;
pub mod graph;
pub mod order;
pub mod validate;

pub use error::GraphError;
pub use graph::Graph;
pub use order::{resolve, Resolved};
pub use validate::validate;

#[cfg(test)]
pub(crate) mod test_support {
    use ntm_core::workflow::{
        OnError, OutputParseSpec, RetryBackoff, WaitMode, Workflow, WorkflowSettings,
    };
    use ntm_core::workflow::Step;
    use std::collections::HashMap;

    pub fn step(id: &str, depends_on: &[&str]) -> Step {
        Step {
            id: id.to_string(),
            prompt: None,
            prompt_file: None,
            agent: None,
            pane: None,
            route: None,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            when: None,
            on_error: OnError::Fail,
            retry_count: 0,
            retry_delay_seconds: 0,
            retry_backoff: RetryBackoff::None,
            wait: WaitMode::Completion,
            timeout_seconds: None,
            output_var: None,
            output_parse: OutputParseSpec::default(),
            parallel: vec![],
            loop_config: None,
        }
    }

    pub fn workflow(steps: Vec<Step>) -> Workflow {
        Workflow {
            schema_version: "1".to_string(),
            name: "test".to_string(),
            vars: HashMap::new(),
            settings: WorkflowSettings::default(),
            steps,
        }
    }
}
