use crate::cli::UiArgs;
use anyhow::Context;
use council::config::default_agents_path;
use council::provider::ProcessInvoker;
use council::{
    resume_ui, AgentsConfig, RefineSettings, Roster, RunOptions, TaskSpec, Templates, UiOptions,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn execute(args: UiArgs) -> anyhow::Result<()> {
    let mut options = UiOptions::default();
    if let Some(port) = args.port {
        options.port = port;
    }
    if let Some(bind) = &args.bind {
        options.bind = bind.clone();
    }
    if let Some(ttl) = args.ttl {
        options.session_ttl = Duration::from_secs(ttl);
    }

    let refine = refine_settings(&args)?;
    if refine.is_none() {
        warn!("No judge configured (agents file or --spec); refine requests will be rejected");
    }

    let resumed = resume_ui(&args.run_dir, options, refine)
        .await
        .with_context(|| format!("Failed to open run {}", args.run_dir.display()))?;
    eprintln!("Council UI: {}", resumed.url);
    resumed.wait().await;
    info!("UI session closed");
    Ok(())
}

/// The judge that drives refinement: inline agents from `--spec` first, then the agents file.
/// Without either the UI is read-and-accept only.
fn refine_settings(args: &UiArgs) -> anyhow::Result<Option<RefineSettings>> {
    let inline = match &args.spec {
        Some(spec) => TaskSpec::load(spec)
            .with_context(|| format!("Failed to load task spec {}", spec.display()))?
            .agents
            .filter(|agents| !agents.planners.is_empty()),
        None => None,
    };

    let roster = match inline {
        Some(agents) => Roster::from_config(agents, Path::new("<task spec>"))?,
        None => {
            let agents_path = args.agents.clone().unwrap_or_else(default_agents_path);
            if !agents_path.exists() {
                return Ok(None);
            }
            Roster::from_config(AgentsConfig::load(&agents_path)?, &agents_path)?
        }
    };
    let templates = Templates::load(args.plan_template.as_deref(), None)?;
    let defaults = RunOptions::default();

    Ok(Some(RefineSettings {
        judge: roster.judge,
        invoker: Arc::new(ProcessInvoker::new()),
        templates,
        timeout: args
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
        retry_limit: defaults.retry_limit,
    }))
}
