pub mod configure;
pub mod run;
pub mod schema;
pub mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "council")]
#[command(
    author,
    version,
    about = "Planning council: parallel planner agents, an anonymized judge, and a live review UI"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan a task with every configured planner, then judge the plans
    Run(RunArgs),

    /// Serve the review UI for a finished run directory
    Ui(UiArgs),

    /// Interactively write the per-user agents file
    Configure(ConfigureArgs),

    /// Print JSON Schema for the task specification
    Schema,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// Task specification (YAML or JSON)
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Agents file to use when the spec has no inline agents
    #[arg(long, env = "COUNCIL_AGENTS")]
    pub agents: Option<PathBuf>,

    /// Also write the final plan to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Parent directory for run directories
    #[arg(long)]
    pub runs_dir: Option<PathBuf>,

    /// Per-attempt agent timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Retries after a planner's or judge's first attempt
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seed for the order in which plans are shown to the judge
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run headless, without the live UI
    #[arg(long)]
    pub no_ui: bool,

    /// UI port (0 picks a free port)
    #[arg(long)]
    pub port: Option<u16>,

    /// UI bind address
    #[arg(long)]
    pub bind: Option<String>,

    /// Seconds the UI stays up after the run completes
    #[arg(long)]
    pub keep_alive: Option<u64>,

    /// Override the plan contract template
    #[arg(long)]
    pub plan_template: Option<PathBuf>,

    /// Override the judge contract template
    #[arg(long)]
    pub judge_template: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct UiArgs {
    /// Run directory produced by `council run`
    #[arg(value_name = "RUN_DIR")]
    pub run_dir: PathBuf,

    /// UI port (0 picks a free port)
    #[arg(long)]
    pub port: Option<u16>,

    /// UI bind address
    #[arg(long)]
    pub bind: Option<String>,

    /// Session lifetime in seconds
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Task specification whose inline judge handles refine requests
    #[arg(long, value_name = "SPEC")]
    pub spec: Option<PathBuf>,

    /// Agents file whose judge handles refine requests when the spec has no inline agents
    #[arg(long, env = "COUNCIL_AGENTS")]
    pub agents: Option<PathBuf>,

    /// Plan contract template that refined plans must satisfy
    #[arg(long)]
    pub plan_template: Option<PathBuf>,

    /// Per-attempt judge timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Parser, Clone)]
pub struct ConfigureArgs {
    /// Where to write the agents file (default: the per-user config directory)
    #[arg(long)]
    pub path: Option<PathBuf>,
}
