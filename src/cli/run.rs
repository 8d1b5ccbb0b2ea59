use crate::cli::RunArgs;
use anyhow::Context;
use council::config::default_agents_path;
use council::provider::ProcessInvoker;
use council::{CouncilSession, Roster, RunOptions, TaskSpec, Templates, UiOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    info!("Loading task spec from {:?}", args.spec);
    let task = TaskSpec::load(&args.spec)
        .with_context(|| format!("Failed to load task spec {}", args.spec.display()))?;

    let agents_path = args.agents.clone().unwrap_or_else(default_agents_path);
    let roster = Roster::load(&task, &agents_path)?;
    let templates =
        Templates::load(args.plan_template.as_deref(), args.judge_template.as_deref())?;

    let options = run_options(&args);
    info!(
        "Planners: {} | judge: {} | retries: {}",
        roster.planner_names().join(", "),
        roster.judge.name(),
        options.retry_limit
    );

    let mut session = CouncilSession::new(
        task,
        roster,
        templates,
        options,
        Arc::new(ProcessInvoker::new()),
    )?;
    eprintln!("Run directory: {}", session.store().dir().display());
    if let Some(url) = session.start_ui().await? {
        eprintln!("Council UI: {}", url);
    }

    let outcome = session.run().await?;

    if outcome.interrupted {
        warn!("Run interrupted; partial artifacts kept in {:?}", outcome.run_dir);
    } else if !outcome.judge_valid {
        warn!("Judge produced no valid report; final-plan.md holds a placeholder");
    }

    if let Some(output) = &args.output {
        std::fs::write(output, &outcome.final_plan)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        info!("Final plan copied to {:?}", output);
    }

    println!(
        "{}: {}/{} plans, judge {}{}",
        outcome.run_id,
        outcome.plans_received,
        outcome.planners,
        if outcome.judge_valid { "ok" } else { "failed" },
        if outcome.accepted { ", accepted" } else { "" }
    );
    println!("{}", outcome.run_dir.join("final-plan.md").display());

    Ok(())
}

fn run_options(args: &RunArgs) -> RunOptions {
    let mut options = RunOptions::default();
    if let Some(runs_dir) = &args.runs_dir {
        options.runs_dir = runs_dir.clone();
    }
    if let Some(timeout) = args.timeout {
        options.timeout = Duration::from_secs(timeout);
    }
    if let Some(retries) = args.retries {
        options.retry_limit = retries;
    }
    options.seed = args.seed;

    if !args.no_ui {
        let mut ui = UiOptions::default();
        if let Some(port) = args.port {
            ui.port = port;
        }
        if let Some(bind) = &args.bind {
            ui.bind = bind.clone();
        }
        if let Some(keep_alive) = args.keep_alive {
            ui.keep_alive = Duration::from_secs(keep_alive);
        }
        options.ui = Some(ui);
    }
    options
}
