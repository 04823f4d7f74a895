use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ntm_config::OrchestratorConfig;
use ntm_executor::PipelineExecutor;
use ntm_scheduler::CapabilityMatrix;
use ntm_store::PipelineStore;
use serde_json::Value;
use ulid::Ulid;

use crate::tmux_adapter::TmuxAdapter;

fn project_root(project: &Option<String>) -> Result<PathBuf> {
    match project {
        Some(p) => Ok(PathBuf::from(p)),
        None => std::env::current_dir().context("resolving current directory"),
    }
}

fn load_capability_matrix(config: &OrchestratorConfig) -> Result<CapabilityMatrix> {
    let matrix = CapabilityMatrix::new();
    let overrides = config.capability_overrides().context("resolving capability_overrides")?;
    matrix.load_overrides(overrides);
    Ok(matrix)
}

pub fn validate(workflow_path: &str) -> Result<()> {
    let workflow = ntm_workflow::load_from_path(Path::new(workflow_path)).with_context(|| format!("loading {workflow_path}"))?;
    let result = PipelineExecutor::validate(&workflow);
    if result.is_valid() {
        println!("{workflow_path}: valid ({} steps)", workflow.steps.len());
        for warning in &result.warnings {
            println!("  warning: {} ({})", warning.message, warning.field);
        }
        Ok(())
    } else {
        for error in &result.errors {
            eprintln!("error: {} ({})", error.message, error.field);
        }
        anyhow::bail!("{workflow_path} failed validation with {} error(s)", result.errors.len());
    }
}

pub async fn run(
    workflow_path: &str,
    session: &str,
    project: &Option<String>,
    dry_run: bool,
    vars: &[(String, String)],
    timeout: Option<u64>,
) -> Result<()> {
    let root = project_root(project)?;
    let mut workflow = ntm_workflow::load_from_path(Path::new(workflow_path)).with_context(|| format!("loading {workflow_path}"))?;
    if let Some(timeout) = timeout {
        workflow.settings.global_timeout_seconds = Some(timeout);
    }

    let config = OrchestratorConfig::load(&root).context("loading orchestrator config")?;
    let matrix = Arc::new(load_capability_matrix(&config)?);
    let store = Arc::new(PipelineStore::new(config.resolved_state_dir(&root)));
    let adapter: Arc<dyn ntm_core::TerminalAdapter> = Arc::new(TmuxAdapter::new());

    let executor = PipelineExecutor::new(adapter, matrix, store, dry_run);
    let run_id = Ulid::new().to_string();
    let user_vars: HashMap<String, Value> = vars.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();

    tracing::info!(run_id = %run_id, workflow = %workflow.name, "starting run");
    let state = executor.run(&workflow, run_id, session, workflow_path, user_vars).await;
    report(&state)
}

pub async fn resume(workflow_path: &str, run_id: &str, session: &str, project: &Option<String>, dry_run: bool) -> Result<()> {
    let root = project_root(project)?;
    let workflow = ntm_workflow::load_from_path(Path::new(workflow_path)).with_context(|| format!("loading {workflow_path}"))?;

    let config = OrchestratorConfig::load(&root).context("loading orchestrator config")?;
    let matrix = Arc::new(load_capability_matrix(&config)?);
    let store = Arc::new(PipelineStore::new(config.resolved_state_dir(&root)));
    let adapter: Arc<dyn ntm_core::TerminalAdapter> = Arc::new(TmuxAdapter::new());

    let state = store.load(run_id).with_context(|| format!("loading persisted run {run_id}"))?;
    let mut state = state;
    state.session = session.to_string();

    let executor = PipelineExecutor::new(adapter, matrix, store, dry_run);
    tracing::info!(run_id = %run_id, workflow = %workflow.name, "resuming run");
    let state = executor.resume(&workflow, state).await;
    report(&state)
}

pub fn cleanup(project: &Option<String>, older_than_hours: i64) -> Result<()> {
    let root = project_root(project)?;
    let config = OrchestratorConfig::load(&root).context("loading orchestrator config")?;
    let store = PipelineStore::new(config.resolved_state_dir(&root));
    let removed = store.cleanup(chrono::Duration::hours(older_than_hours)).context("cleaning up persisted runs")?;
    println!("removed {removed} run(s) older than {older_than_hours}h");
    Ok(())
}

fn report(state: &ntm_core::ExecutionState) -> Result<()> {
    println!("run {} [{}]: {:?}", state.run_id, state.workflow_id, state.status);
    for (id, result) in &state.steps {
        println!("  {id}: {:?} ({})", result.status, result.duration_string());
        if let Some(error) = &result.error {
            println!("    error: {error}");
        }
    }
    if state.status == ntm_core::RunStatus::Failed {
        anyhow::bail!("run {} failed", state.run_id);
    }
    Ok(())
}
