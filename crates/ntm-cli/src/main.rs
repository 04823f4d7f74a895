use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod tmux_adapter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let file_appender = tracing_appender::rolling::daily(".ntm/logs", "ntm.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_env("NTM_LOG").unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .try_init()
        .ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { workflow } => commands::validate(&workflow),
        Commands::Run { workflow, session, dry_run, vars, timeout } => {
            commands::run(&workflow, &session, &cli.project, dry_run, &vars, timeout).await
        }
        Commands::Resume { workflow, run_id, session, dry_run } => {
            commands::resume(&workflow, &run_id, &session, &cli.project, dry_run).await
        }
        Commands::Cleanup { older_than_hours } => commands::cleanup(&cli.project, older_than_hours),
    }
}
