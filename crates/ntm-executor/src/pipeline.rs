//! Pipeline Executor (C11, §4.8): runs a workflow to completion against a
//! [`TerminalAdapter`], level by level, honoring dependencies, retries,
//! parallel branches, and loop bodies.
//!
//! Reuses `ntm-graph`'s arena + Kahn ordering at every nesting depth: the
//! top-level step list, a step's `parallel[]` branches, and a loop
//! iteration's `steps[]` are each wrapped in a throwaway single-level
//! `Workflow` and run through the same [`PipelineExecutor::run_step_group`]
//! helper, the same way the graph crate already flattens all three into one
//! arena for validation (`Graph::build`'s `collect_steps`).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ntm_core::adapter::{PaneDetectState, TerminalAdapter, DRY_RUN_PANE};
use ntm_core::agent::AgentType;
use ntm_core::error::{ErrorKind, ExecutionError, ValidationResult};
use ntm_core::execution::{ExecutionState, RunStatus, StepResult, StepStatus};
use ntm_core::workflow::{
    LoopConfig, OnError, PaneSelector, RoutePolicy, Step, WaitMode, Workflow, WorkflowSettings,
};
use ntm_graph::{resolve, validate as validate_graph, Graph};
use ntm_scheduler::CapabilityMatrix;
use ntm_store::PipelineStore;
use ntm_workflow::{evaluate_condition, parse_output, substitute, validate_schema, SubstitutionContext};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::loop_executor::{run_loop, IterationOutcome, LoopIterationContext};
use crate::progress::{publish, ProgressEvent, ProgressEventType, ProgressSender};

const DEFAULT_WAIT_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_GLOBAL_TIMEOUT_SECONDS: u64 = 1800;
const IDLE_STABILITY_POLLS: u32 = 2;
const POLL_INTERVAL_MS: u64 = 250;

/// Runs a single workflow invocation. One executor per `run`/`resume` call.
pub struct PipelineExecutor {
    adapter: Arc<dyn TerminalAdapter>,
    capability_matrix: Arc<CapabilityMatrix>,
    store: Arc<PipelineStore>,
    dry_run: bool,
    cancellation: CancellationToken,
    progress: Option<ProgressSender>,
    pane_load: std::sync::Mutex<HashMap<String, usize>>,
    round_robin_counter: AtomicUsize,
}

impl PipelineExecutor {
    pub fn new(adapter: Arc<dyn TerminalAdapter>, capability_matrix: Arc<CapabilityMatrix>, store: Arc<PipelineStore>, dry_run: bool) -> Self {
        Self {
            adapter,
            capability_matrix,
            store,
            dry_run,
            cancellation: CancellationToken::new(),
            progress: None,
            pane_load: std::sync::Mutex::new(HashMap::new()),
            round_robin_counter: AtomicUsize::new(0),
        }
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// A token the caller can hand out to whoever wants to `cancel()` this run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Combine schema validation with structural graph validation (missing
    /// dependencies, cycles), across every nested step id.
    pub fn validate(workflow: &Workflow) -> ValidationResult {
        let mut result = validate_schema(workflow);
        let graph = Graph::build(workflow);
        let graph_result = validate_graph(&graph);
        result.errors.extend(graph_result.errors);
        result.warnings.extend(graph_result.warnings);
        result
    }

    /// Run a fresh workflow invocation from scratch.
    pub async fn run(
        &self,
        workflow: &Workflow,
        run_id: impl Into<String>,
        session: impl Into<String>,
        workflow_file: impl Into<String>,
        user_vars: HashMap<String, Value>,
    ) -> ExecutionState {
        let mut state = ExecutionState::new(run_id.into(), workflow.name.clone(), session.into(), workflow_file.into());
        for (key, value) in &workflow.vars {
            state.variables.insert(key.clone(), value.clone());
        }
        for (key, value) in user_vars {
            state.variables.insert(key, value);
        }
        self.drive(workflow, state, HashSet::new()).await
    }

    /// Resume a previously persisted run: steps already `Completed` are kept
    /// as-is and not re-executed; everything else is cleared and re-run.
    pub async fn resume(&self, workflow: &Workflow, mut state: ExecutionState) -> ExecutionState {
        let mut already_done = HashSet::new();
        let mut to_clear = Vec::new();
        for (id, result) in state.steps.iter() {
            if result.status == Some(StepStatus::Completed) {
                already_done.insert(id.clone());
            } else {
                to_clear.push(id.clone());
            }
        }
        for id in to_clear {
            state.steps.remove(&id);
            if let Some(name) = step_output_var_by_id(workflow, &id) {
                state.variables.remove(&name);
                state.variables.remove(&format!("{name}_parsed"));
            }
        }
        self.drive(workflow, state, already_done).await
    }

    async fn drive(&self, workflow: &Workflow, mut state: ExecutionState, already_done: HashSet<String>) -> ExecutionState {
        let validation = Self::validate(workflow);
        if !validation.is_valid() {
            state.status = RunStatus::Failed;
            for issue in validation.errors {
                state.errors.push(ExecutionError::new(ErrorKind::Validation, issue.message).fatal());
            }
            state.finished_at = Some(Utc::now());
            self.persist(&state);
            return state;
        }

        state.status = RunStatus::Running;
        self.persist(&state);
        publish(
            self.progress.as_ref(),
            ProgressEvent::new(ProgressEventType::WorkflowStart, None, format!("starting {}", workflow.name), 0.0),
        );

        let state = Mutex::new(state);
        let fatal = AtomicBool::new(false);
        let global_timeout = Duration::from_secs(workflow.settings.global_timeout_seconds.unwrap_or(DEFAULT_GLOBAL_TIMEOUT_SECONDS));

        let outcome = match tokio::time::timeout(
            global_timeout,
            self.run_step_group(&workflow.steps, &workflow.settings, &state, &already_done, &fatal, &HashMap::new()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.cancellation.cancel();
                Err(ExecutorError::Timeout(format!("workflow exceeded global timeout of {}s", global_timeout.as_secs())))
            }
        };

        let mut state = state.into_inner();
        state.finished_at = Some(Utc::now());
        state.status = match &outcome {
            Ok(()) if fatal.load(Ordering::SeqCst) => RunStatus::Failed,
            Ok(()) if self.cancellation.is_cancelled() => RunStatus::Cancelled,
            Ok(()) => RunStatus::Completed,
            Err(ExecutorError::Cancelled) => RunStatus::Cancelled,
            Err(err) => {
                state.errors.push(ExecutionError::new(err.kind(), err.to_string()).fatal());
                RunStatus::Failed
            }
        };

        let event_type = match state.status {
            RunStatus::Cancelled => ProgressEventType::WorkflowCancelled,
            _ => ProgressEventType::WorkflowComplete,
        };
        publish(
            self.progress.as_ref(),
            ProgressEvent::new(event_type, None, format!("run {}", status_label(state.status)), 1.0),
        );
        self.persist(&state);
        state
    }

    /// Run one set of sibling steps (top-level, a `parallel[]` branch, or a
    /// loop's `steps[]`) to completion: build a dependency graph over just
    /// this slice, resolve it into levels, and dispatch each level
    /// concurrently.
    async fn run_step_group(
        &self,
        steps: &[Step],
        settings: &WorkflowSettings,
        state: &Mutex<ExecutionState>,
        already_done: &HashSet<String>,
        fatal: &AtomicBool,
        loop_vars: &HashMap<String, Value>,
    ) -> Result<(), ExecutorError> {
        if steps.is_empty() {
            return Ok(());
        }

        let shallow = Workflow {
            schema_version: "1".to_string(),
            name: "group".to_string(),
            vars: HashMap::new(),
            settings: settings.clone(),
            steps: steps.iter().map(shallow_clone).collect(),
        };
        let graph = Graph::build(&shallow);
        let levels = resolve(&graph).levels;

        let by_id: HashMap<&str, &Step> = steps.iter().map(|s| (s.id.as_str(), s)).collect();

        for level in levels {
            if self.cancellation.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }

            let mut handles = Vec::new();
            for id in &level {
                if let Some(step) = by_id.get(id.as_str()).copied() {
                    handles.push(self.execute_step(step, settings, state, already_done, fatal, loop_vars));
                }
            }
            for result in futures::future::join_all(handles).await {
                if let Err(ExecutorError::Cancelled) = result {
                    return Err(ExecutorError::Cancelled);
                }
            }
        }

        Ok(())
    }

    async fn execute_step(
        &self,
        step: &Step,
        settings: &WorkflowSettings,
        state: &Mutex<ExecutionState>,
        already_done: &HashSet<String>,
        fatal: &AtomicBool,
        loop_vars: &HashMap<String, Value>,
    ) -> Result<(), ExecutorError> {
        if already_done.contains(&step.id) {
            return Ok(());
        }

        if self.cancellation.is_cancelled() {
            let mut state = state.lock().await;
            state.steps.insert(step.id.clone(), StepResult { status: Some(StepStatus::Cancelled), ..Default::default() });
            return Err(ExecutorError::Cancelled);
        }

        let (when_ok, dependency_failed) = {
            let guard = state.lock().await;
            let when_ok = match &step.when {
                Some(expr) => {
                    let rendered = render(&guard, loop_vars, expr);
                    evaluate_condition(&rendered).map_err(ExecutorError::from)?
                }
                None => true,
            };
            let dependency_failed = step.depends_on.iter().any(|dep| {
                matches!(guard.steps.get(dep).and_then(|r| r.status), Some(StepStatus::Failed) | Some(StepStatus::Cancelled))
            });
            (when_ok, dependency_failed)
        };

        if !when_ok {
            self.record_skip(state, &step.id, "when condition evaluated to false").await;
            return Ok(());
        }
        if dependency_failed && step.on_error != OnError::Continue {
            self.record_skip(state, &step.id, "a dependency failed").await;
            return Ok(());
        }

        if !step.parallel.is_empty() {
            self.run_step_group(&step.parallel, settings, state, already_done, fatal, loop_vars).await?;
            let branch_failed = {
                let guard = state.lock().await;
                step.parallel
                    .iter()
                    .any(|child| matches!(guard.steps.get(&child.id).and_then(|r| r.status), Some(StepStatus::Failed)))
            };
            if branch_failed {
                fatal.store(true, Ordering::SeqCst);
            }
            let status = if branch_failed { StepStatus::Failed } else { StepStatus::Completed };
            let mut guard = state.lock().await;
            guard.steps.insert(step.id.clone(), StepResult { status: Some(status), ..Default::default() });
            return Ok(());
        }

        if let Some(loop_config) = &step.loop_config {
            return self.execute_loop_step(step, loop_config, settings, state, already_done, fatal, loop_vars).await;
        }

        self.execute_leaf_step(step, settings, state, fatal, loop_vars).await
    }

    async fn execute_loop_step(
        &self,
        step: &Step,
        loop_config: &LoopConfig,
        settings: &WorkflowSettings,
        state: &Mutex<ExecutionState>,
        already_done: &HashSet<String>,
        fatal: &AtomicBool,
        outer_loop_vars: &HashMap<String, Value>,
    ) -> Result<(), ExecutorError> {
        let started_at = Utc::now();
        let while_text = &loop_config.r#while;

        let while_eval = || -> Result<bool, ExecutorError> {
            let Some(expr) = while_text else { return Ok(false) };
            let guard = state
                .try_lock()
                .map_err(|_| ExecutorError::Loop("execution state contended while evaluating loop condition".to_string()))?;
            Ok(evaluate_condition(&render(&guard, outer_loop_vars, expr)).map_err(ExecutorError::from)?)
        };

        let run_iteration = |iter_ctx: LoopIterationContext| {
            let mut vars = outer_loop_vars.clone();
            vars.insert("item".to_string(), iter_ctx.item.clone().unwrap_or(Value::Null));
            if iter_ctx.as_name != "item" {
                vars.insert(iter_ctx.as_name.clone(), iter_ctx.item.clone().unwrap_or(Value::Null));
            }
            vars.insert("index".to_string(), Value::from(iter_ctx.index));
            vars.insert("count".to_string(), Value::from(iter_ctx.count));
            vars.insert("first".to_string(), Value::from(iter_ctx.first));
            vars.insert("last".to_string(), Value::from(iter_ctx.last));

            async move {
                self.run_step_group(&loop_config.steps, settings, state, already_done, fatal, &vars).await?;
                let collected = match &loop_config.collect {
                    Some(var_name) => state.lock().await.variables.get(var_name).cloned(),
                    None => None,
                };
                Ok(IterationOutcome::Completed(collected))
            }
        };

        let result = run_loop(loop_config, while_eval, run_iteration, &self.cancellation).await;

        let (status, error, collected) = match &result {
            Ok(loop_result) => (StepStatus::Completed, None, loop_result.collected.clone()),
            Err(ExecutorError::Cancelled) => (StepStatus::Cancelled, None, Vec::new()),
            Err(err) => (StepStatus::Failed, Some(err.to_string()), Vec::new()),
        };

        if status == StepStatus::Failed {
            fatal.store(true, Ordering::SeqCst);
        }

        let mut guard = state.lock().await;
        if let Some(var_name) = &loop_config.collect {
            guard.variables.insert(var_name.clone(), Value::Array(collected));
        }
        guard.steps.insert(
            step.id.clone(),
            StepResult { status: Some(status), error, started_at: Some(started_at), finished_at: Some(Utc::now()), ..Default::default() },
        );
        drop(guard);

        if let Err(ExecutorError::Cancelled) = result {
            return Err(ExecutorError::Cancelled);
        }
        Ok(())
    }

    async fn execute_leaf_step(
        &self,
        step: &Step,
        settings: &WorkflowSettings,
        state: &Mutex<ExecutionState>,
        fatal: &AtomicBool,
        loop_vars: &HashMap<String, Value>,
    ) -> Result<(), ExecutorError> {
        let started_at = Utc::now();
        publish(
            self.progress.as_ref(),
            ProgressEvent::new(ProgressEventType::StepStart, Some(step.id.clone()), format!("starting {}", step.id), 0.0),
        );

        let mut attempt: u32 = 0;
        loop {
            if self.cancellation.is_cancelled() {
                let mut guard = state.lock().await;
                guard.steps.insert(
                    step.id.clone(),
                    StepResult { status: Some(StepStatus::Cancelled), started_at: Some(started_at), ..Default::default() },
                );
                return Err(ExecutorError::Cancelled);
            }

            match self.attempt_step(step, settings, state, loop_vars).await {
                Ok((output, parsed, pane_used, agent_type)) => {
                    let mut guard = state.lock().await;
                    if let Some(var_name) = &step.output_var {
                        guard.variables.insert(var_name.clone(), Value::String(output.clone()));
                        guard.variables.insert(format!("{var_name}_parsed"), parsed.clone());
                    }
                    guard.steps.insert(
                        step.id.clone(),
                        StepResult {
                            status: Some(StepStatus::Completed),
                            output: Some(output),
                            parsed_data: Some(parsed),
                            error: None,
                            started_at: Some(started_at),
                            finished_at: Some(Utc::now()),
                            pane_used: Some(pane_used),
                            agent_type: Some(agent_type),
                            attempts: attempt + 1,
                            skip_reason: None,
                        },
                    );
                    self.persist(&guard);
                    drop(guard);
                    publish(
                        self.progress.as_ref(),
                        ProgressEvent::new(ProgressEventType::StepComplete, Some(step.id.clone()), format!("{} completed", step.id), 1.0),
                    );
                    return Ok(());
                }
                Err(err) => {
                    let can_retry = step.on_error == OnError::Retry && attempt < step.retry_count;
                    if can_retry {
                        attempt += 1;
                        let delay = step.retry_delay_seconds * step.retry_backoff.factor(attempt);
                        if delay > 0 {
                            tokio::select! {
                                _ = self.cancellation.cancelled() => return Err(ExecutorError::Cancelled),
                                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                            }
                        }
                        continue;
                    }

                    let is_fatal = step.on_error == OnError::Fail && !settings.continue_on_error;
                    if is_fatal {
                        fatal.store(true, Ordering::SeqCst);
                    }
                    let mut guard = state.lock().await;
                    guard.errors.push(err.clone().into_execution_error(step.id.clone(), is_fatal));
                    guard.steps.insert(
                        step.id.clone(),
                        StepResult {
                            status: Some(StepStatus::Failed),
                            error: Some(err.to_string()),
                            started_at: Some(started_at),
                            finished_at: Some(Utc::now()),
                            attempts: attempt + 1,
                            ..Default::default()
                        },
                    );
                    self.persist(&guard);
                    drop(guard);
                    publish(
                        self.progress.as_ref(),
                        ProgressEvent::new(ProgressEventType::StepFailed, Some(step.id.clone()), err.to_string(), 1.0),
                    );
                    return Ok(());
                }
            }
        }
    }

    async fn attempt_step(
        &self,
        step: &Step,
        settings: &WorkflowSettings,
        state: &Mutex<ExecutionState>,
        loop_vars: &HashMap<String, Value>,
    ) -> Result<(String, Value, String, String), ExecutorError> {
        let prompt_template = match (&step.prompt, &step.prompt_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|err| ExecutorError::Agent(format!("reading {path}: {err}")))?,
            (None, None) => String::new(),
        };

        let prompt = render(&*state.lock().await, loop_vars, &prompt_template);
        let session = state.lock().await.session.clone();
        let (pane_id, agent_label) = self.select_pane(step, &session).await?;

        if self.dry_run {
            let output = format!("[dry-run] {prompt}");
            let parsed = parse_output(&output, &step.output_parse).map_err(ExecutorError::from)?;
            return Ok((output, parsed, pane_id, agent_label));
        }

        self.bump_load(&pane_id, 1);
        let result = self.run_against_adapter(step, settings, &pane_id, &prompt).await;
        self.bump_load(&pane_id, -1);
        let output = result?;
        let parsed = parse_output(&output, &step.output_parse).map_err(ExecutorError::from)?;
        Ok((output, parsed, pane_id, agent_label))
    }

    async fn run_against_adapter(&self, step: &Step, settings: &WorkflowSettings, pane_id: &str, prompt: &str) -> Result<String, ExecutorError> {
        self.adapter.send(pane_id, prompt, true).await.map_err(|err| ExecutorError::Agent(err.to_string()))?;

        let timeout_seconds = step.timeout_seconds.or(settings.default_timeout_seconds).unwrap_or(DEFAULT_WAIT_TIMEOUT_SECONDS);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_seconds);

        match step.wait {
            WaitMode::None => {}
            WaitMode::Time => {
                tokio::select! {
                    _ = self.cancellation.cancelled() => return Err(ExecutorError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_secs(timeout_seconds)) => {}
                }
            }
            WaitMode::Completion | WaitMode::Idle => {
                let mut consecutive_idle = 0u32;
                loop {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(ExecutorError::Timeout(format!("{pane_id} did not finish within {timeout_seconds}s")));
                    }
                    tokio::select! {
                        _ = self.cancellation.cancelled() => return Err(ExecutorError::Cancelled),
                        _ = tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)) => {}
                    }
                    let detect = self.adapter.detect(pane_id).await.map_err(|err| ExecutorError::Agent(err.to_string()))?;
                    match detect.state {
                        PaneDetectState::Idle => {
                            consecutive_idle += 1;
                            let needed = if step.wait == WaitMode::Idle { IDLE_STABILITY_POLLS } else { 1 };
                            if consecutive_idle >= needed {
                                break;
                            }
                        }
                        PaneDetectState::Crashed | PaneDetectState::Error => {
                            return Err(ExecutorError::Agent(format!("{pane_id} entered an error state while waiting")));
                        }
                        PaneDetectState::Working => consecutive_idle = 0,
                    }
                }
            }
        }

        self.adapter.capture(pane_id, 4000).await.map_err(|err| ExecutorError::Agent(err.to_string()))
    }

    /// Resolve a step's destination pane: explicit `agent`/`pane`, or a
    /// `route` policy scored against the capability matrix and live pane
    /// states.
    async fn select_pane(&self, step: &Step, session: &str) -> Result<(String, String), ExecutorError> {
        if self.dry_run {
            return Ok((DRY_RUN_PANE.to_string(), "dry-run".to_string()));
        }

        match step.pane_selector() {
            Some(PaneSelector::Pane(id)) => Ok((id, "explicit".to_string())),
            Some(PaneSelector::Agent(alias)) => {
                let wanted = AgentType::from_alias(&alias);
                let panes = self.adapter.list_panes(session).await.map_err(|err| ExecutorError::PaneSelection(err.to_string()))?;
                panes
                    .into_iter()
                    .find(|p| p.agent_type == wanted)
                    .map(|p| (p.id, wanted.as_str().to_string()))
                    .ok_or_else(|| ExecutorError::PaneSelection(format!("no pane running {alias}")))
            }
            Some(PaneSelector::Route(policy)) => self.select_routed_pane(step, session, policy).await,
            None => {
                let panes = self.adapter.list_panes(session).await.map_err(|err| ExecutorError::PaneSelection(err.to_string()))?;
                panes
                    .into_iter()
                    .next()
                    .map(|p| (p.id.clone(), p.agent_type.as_str().to_string()))
                    .ok_or_else(|| ExecutorError::PaneSelection("no panes available".to_string()))
            }
        }
    }

    async fn select_routed_pane(&self, step: &Step, session: &str, policy: RoutePolicy) -> Result<(String, String), ExecutorError> {
        let panes = self.adapter.list_panes(session).await.map_err(|err| ExecutorError::PaneSelection(err.to_string()))?;
        let mut idle = Vec::new();
        for pane in panes {
            let detect = self.adapter.detect(&pane.id).await.map_err(|err| ExecutorError::PaneSelection(err.to_string()))?;
            if detect.state == PaneDetectState::Idle {
                idle.push(pane);
            }
        }
        if idle.is_empty() {
            return Err(ExecutorError::PaneSelection("no idle pane available".to_string()));
        }

        let task_type = ntm_scheduler::classify(step.prompt.as_deref().unwrap_or_default());
        let best_agent_type = idle
            .iter()
            .map(|p| p.agent_type)
            .max_by(|a, b| {
                self.capability_matrix
                    .score(*a, task_type)
                    .partial_cmp(&self.capability_matrix.score(*b, task_type))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("idle is non-empty");

        let candidates: Vec<_> = idle.into_iter().filter(|p| p.agent_type == best_agent_type).collect();

        let chosen = match policy {
            RoutePolicy::FirstAvailable => candidates.into_iter().next(),
            RoutePolicy::LeastLoaded => {
                let load = self.pane_load.lock().expect("pane load lock poisoned").clone();
                candidates.into_iter().min_by_key(|p| load.get(&p.id).copied().unwrap_or(0))
            }
            RoutePolicy::RoundRobin => {
                let n = candidates.len().max(1);
                let idx = self.round_robin_counter.fetch_add(1, Ordering::SeqCst) % n;
                candidates.into_iter().nth(idx)
            }
        };

        chosen.map(|p| (p.id, p.agent_type.as_str().to_string())).ok_or_else(|| ExecutorError::PaneSelection("no candidate pane resolved".to_string()))
    }

    fn bump_load(&self, pane_id: &str, delta: i64) {
        let mut load = self.pane_load.lock().expect("pane load lock poisoned");
        let entry = load.entry(pane_id.to_string()).or_insert(0);
        *entry = (*entry as i64 + delta).max(0) as usize;
    }

    async fn record_skip(&self, state: &Mutex<ExecutionState>, step_id: &str, reason: &str) {
        let mut guard = state.lock().await;
        guard.steps.insert(
            step_id.to_string(),
            StepResult { status: Some(StepStatus::Skipped), skip_reason: Some(reason.to_string()), ..Default::default() },
        );
        drop(guard);
        publish(
            self.progress.as_ref(),
            ProgressEvent::new(ProgressEventType::StepSkipped, Some(step_id.to_string()), reason.to_string(), 1.0),
        );
    }

    fn persist(&self, state: &ExecutionState) {
        if let Err(err) = self.store.save(state) {
            tracing::warn!(run_id = %state.run_id, error = %err, "failed to persist execution state");
        }
    }
}

/// Render `text` against the run's variables, step results, and the current
/// loop scope. Builds the `vars.*` object fresh each call since
/// `ExecutionState` stores a flat map rather than keeping a `Value` in sync.
fn render(state: &ExecutionState, loop_vars: &HashMap<String, Value>, text: &str) -> String {
    let vars = Value::Object(state.variables.clone().into_iter().collect());
    let ctx = SubstitutionContext {
        vars: &vars,
        steps: &state.steps,
        loop_vars,
        session: &state.session,
        run_id: &state.run_id,
        workflow: &state.workflow_id,
    };
    substitute(text, &ctx)
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn step_output_var_by_id(workflow: &Workflow, id: &str) -> Option<String> {
    fn search(steps: &[Step], id: &str) -> Option<String> {
        for step in steps {
            if step.id == id {
                return step.output_var.clone();
            }
            if let Some(found) = search(&step.parallel, id) {
                return Some(found);
            }
            if let Some(lc) = &step.loop_config {
                if let Some(found) = search(&lc.steps, id) {
                    return Some(found);
                }
            }
        }
        None
    }
    search(&workflow.steps, id)
}

/// Clone a step for graph-building purposes only, stripping nested
/// `parallel`/`loop` content so a group's graph reflects just this level's
/// own dependency edges. The nested content is still executed by
/// `execute_step`, just not folded into this level's topological order.
fn shallow_clone(step: &Step) -> Step {
    let mut clone = step.clone();
    clone.parallel.clear();
    clone.loop_config = None;
    clone
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ntm_core::adapter::{PaneDetect, PaneInfo};
    use ntm_core::workflow::{OutputParseSpec, OutputParseType, RetryBackoff};
    use tempfile::tempdir;

    struct FakeAdapter {
        panes: Vec<PaneInfo>,
    }

    #[async_trait]
    impl TerminalAdapter for FakeAdapter {
        async fn list_panes(&self, _session: &str) -> anyhow::Result<Vec<PaneInfo>> {
            Ok(self.panes.clone())
        }
        async fn capture(&self, _pane_id: &str, _lines: usize) -> anyhow::Result<String> {
            Ok("done".to_string())
        }
        async fn send(&self, _pane_id: &str, _text: &str, _press_enter: bool) -> anyhow::Result<()> {
            Ok(())
        }
        async fn detect(&self, _pane_id: &str) -> anyhow::Result<PaneDetect> {
            Ok(PaneDetect { state: PaneDetectState::Idle, last_active: Utc::now() })
        }
    }

    fn minimal_step(id: &str, depends_on: &[&str]) -> Step {
        Step {
            id: id.to_string(),
            prompt: Some(format!("do {id}")),
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
            wait: WaitMode::None,
            timeout_seconds: Some(5),
            output_var: None,
            output_parse: OutputParseSpec::default(),
            parallel: vec![],
            loop_config: None,
        }
    }

    fn workflow(steps: Vec<Step>) -> Workflow {
        Workflow { schema_version: "1".to_string(), name: "wf".to_string(), vars: HashMap::new(), settings: WorkflowSettings::default(), steps }
    }

    fn dry_run_executor() -> (PipelineExecutor, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let adapter: Arc<dyn TerminalAdapter> = Arc::new(FakeAdapter { panes: vec![] });
        let matrix = Arc::new(CapabilityMatrix::new());
        let store = Arc::new(PipelineStore::new(dir.path()));
        (PipelineExecutor::new(adapter, matrix, store, true), dir)
    }

    #[tokio::test]
    async fn dry_run_completes_a_two_step_dependency_chain() {
        let (executor, _dir) = dry_run_executor();
        let wf = workflow(vec![minimal_step("a", &[]), minimal_step("b", &["a"])]);
        let state = executor.run(&wf, "run-1", "sess", "wf.yaml", HashMap::new()).await;
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.steps["a"].status, Some(StepStatus::Completed));
        assert_eq!(state.steps["b"].status, Some(StepStatus::Completed));
    }

    #[tokio::test]
    async fn when_false_skips_the_step() {
        let (executor, _dir) = dry_run_executor();
        let mut step = minimal_step("a", &[]);
        step.when = Some("false".to_string());
        let wf = workflow(vec![step]);
        let state = executor.run(&wf, "run-2", "sess", "wf.yaml", HashMap::new()).await;
        assert_eq!(state.steps["a"].status, Some(StepStatus::Skipped));
    }

    #[tokio::test]
    async fn dependency_failure_skips_the_dependent_step() {
        let (executor, _dir) = dry_run_executor();
        let mut failing = minimal_step("a", &[]);
        failing.output_parse = OutputParseSpec { parse_type: OutputParseType::Regex, pattern: Some("nomatch_xyz".to_string()) };
        let dependent = minimal_step("b", &["a"]);
        let wf = workflow(vec![failing, dependent]);
        let state = executor.run(&wf, "run-3", "sess", "wf.yaml", HashMap::new()).await;
        assert_eq!(state.steps["a"].status, Some(StepStatus::Failed));
        assert_eq!(state.steps["b"].status, Some(StepStatus::Skipped));
        assert_eq!(state.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn retry_exhausts_then_fails() {
        let (executor, _dir) = dry_run_executor();
        let mut step = minimal_step("a", &[]);
        step.on_error = OnError::Retry;
        step.retry_count = 2;
        step.retry_delay_seconds = 0;
        step.output_parse = OutputParseSpec { parse_type: OutputParseType::Regex, pattern: Some("nomatch_xyz".to_string()) };
        let wf = workflow(vec![step]);
        let state = executor.run(&wf, "run-4", "sess", "wf.yaml", HashMap::new()).await;
        assert_eq!(state.steps["a"].status, Some(StepStatus::Failed));
        assert_eq!(state.steps["a"].attempts, 3);
    }

    #[tokio::test]
    async fn continue_on_error_step_lets_downstream_run() {
        let (executor, _dir) = dry_run_executor();
        let mut failing = minimal_step("a", &[]);
        failing.on_error = OnError::Continue;
        failing.output_parse = OutputParseSpec { parse_type: OutputParseType::Regex, pattern: Some("nomatch_xyz".to_string()) };
        let dependent = minimal_step("b", &["a"]);
        let wf = workflow(vec![failing, dependent]);
        let state = executor.run(&wf, "run-5", "sess", "wf.yaml", HashMap::new()).await;
        assert_eq!(state.steps["a"].status, Some(StepStatus::Failed));
        assert_eq!(state.steps["b"].status, Some(StepStatus::Completed));
    }

    #[tokio::test]
    async fn output_var_is_populated_from_step_output() {
        let (executor, _dir) = dry_run_executor();
        let mut step = minimal_step("a", &[]);
        step.output_var = Some("result".to_string());
        let wf = workflow(vec![step]);
        let state = executor.run(&wf, "run-6", "sess", "wf.yaml", HashMap::new()).await;
        assert!(state.variables.contains_key("result"));
        assert!(state.variables.contains_key("result_parsed"));
    }

    #[tokio::test]
    async fn resume_preserves_completed_steps_and_reruns_the_rest() {
        let (executor, _dir) = dry_run_executor();
        let wf = workflow(vec![minimal_step("a", &[]), minimal_step("b", &["a"])]);
        let mut state = ExecutionState::new("run-7", "wf", "sess", "wf.yaml");
        state.steps.insert(
            "a".to_string(),
            StepResult { status: Some(StepStatus::Completed), output: Some("cached".to_string()), ..Default::default() },
        );
        let resumed = executor.resume(&wf, state).await;
        assert_eq!(resumed.steps["a"].output.as_deref(), Some("cached"));
        assert_eq!(resumed.steps["b"].status, Some(StepStatus::Completed));
    }

    #[tokio::test]
    async fn loop_step_runs_each_iteration() {
        let (executor, _dir) = dry_run_executor();
        let mut inner = minimal_step("process", &[]);
        inner.output_var = Some("item_out".to_string());
        let mut loop_step = minimal_step("loop-items", &[]);
        loop_step.prompt = None;
        loop_step.loop_config = Some(LoopConfig {
            items: Some(Value::Array(vec![Value::from(1), Value::from(2)])),
            r#while: None,
            times: None,
            as_name: "item".to_string(),
            max_iterations: 100,
            delay_seconds: 0,
            collect: None,
            steps: vec![inner],
        });
        let wf = workflow(vec![loop_step]);
        let state = executor.run(&wf, "run-8", "sess", "wf.yaml", HashMap::new()).await;
        assert_eq!(state.steps["loop-items"].status, Some(StepStatus::Completed));
        assert_eq!(state.steps["process"].status, Some(StepStatus::Completed));
    }

    #[tokio::test]
    async fn cancelled_run_reports_cancelled_status() {
        let (executor, _dir) = dry_run_executor();
        executor.cancel();
        let wf = workflow(vec![minimal_step("a", &[])]);
        let state = executor.run(&wf, "run-9", "sess", "wf.yaml", HashMap::new()).await;
        assert_eq!(state.status, RunStatus::Cancelled);
    }

    #[test]
    fn validate_reports_cycles_alongside_schema_errors() {
        let wf = workflow(vec![minimal_step("a", &["b"]), minimal_step("b", &["a"])]);
        let result = PipelineExecutor::validate(&wf);
        assert!(!result.is_valid());
    }

    #[tokio::test]
    async fn select_pane_honors_explicit_agent() {
        let dir = tempdir().unwrap();
        let adapter: Arc<dyn TerminalAdapter> = Arc::new(FakeAdapter {
            panes: vec![PaneInfo { id: "pane-1".to_string(), title: "claude".to_string(), agent_type: AgentType::ClaudeCode, variant: None }],
        });
        let matrix = Arc::new(CapabilityMatrix::new());
        let store = Arc::new(PipelineStore::new(dir.path()));
        let executor = PipelineExecutor::new(adapter, matrix, store, false);
        let mut step = minimal_step("a", &[]);
        step.agent = Some("cc".to_string());
        let (pane_id, _) = executor.select_pane(&step, "sess").await.unwrap();
        assert_eq!(pane_id, "pane-1");
    }
}
