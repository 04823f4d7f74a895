use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ntm", version, about = "Orchestrate multi-agent terminal workflows")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (defaults to the current directory).
    #[arg(long, global = true)]
    pub project: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a workflow file without running it.
    Validate {
        /// Path to the workflow file (.yaml/.yml/.toml).
        workflow: String,
    },

    /// Run a workflow from scratch.
    Run {
        /// Path to the workflow file (.yaml/.yml/.toml).
        workflow: String,

        /// tmux session the workflow's panes live in.
        #[arg(short, long, default_value = "ntm")]
        session: String,

        /// Synthesize step output instead of driving real panes.
        #[arg(long)]
        dry_run: bool,

        /// Variable override `key=value`, repeatable.
        #[arg(long = "var", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,

        /// Per-run global timeout override, in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Resume a previously persisted run.
    Resume {
        /// Path to the workflow file (.yaml/.yml/.toml).
        workflow: String,

        /// Run id to resume.
        #[arg(short, long)]
        run_id: String,

        /// tmux session the workflow's panes live in.
        #[arg(short, long, default_value = "ntm")]
        session: String,

        /// Synthesize step output instead of driving real panes.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete persisted run state older than the given age.
    Cleanup {
        /// Minimum age, in hours, before a persisted run is deleted.
        #[arg(long, default_value_t = 24)]
        older_than_hours: i64,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=value, got {raw:?}")),
    }
}
