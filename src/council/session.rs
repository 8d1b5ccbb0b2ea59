//! One council run end to end, and re-opening the UI on a finished run.

use super::anonymize::{anonymize_and_shuffle, shuffle_rng, Anonymizer};
use super::judge::JudgeOrchestrator;
use super::planning::PlanningOrchestrator;
use super::prompt::{planner_prompt, task_brief};
use crate::config::{Roster, TaskSpec};
use crate::contract::Templates;
use crate::error::CouncilError;
use crate::provider::{Agent, AgentInvoker, ProcessInvoker};
use crate::store::{LabelRecord, RunStore, FINAL_PLAN_PLACEHOLDER};
use crate::ui::{spawn_snapshot_writer, Phase, UiHandle, UiOptions, UiService, UiState};
use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Parent directory of run directories
    pub runs_dir: PathBuf,
    /// Per-attempt timeout for agents without their own
    pub timeout: Duration,
    /// Extra attempts after the first
    pub retry_limit: u32,
    /// Fixes the plan shuffle when set
    pub seed: Option<u64>,
    /// Live UI; `None` runs headless
    pub ui: Option<UiOptions>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            runs_dir: crate::config::default_runs_dir(),
            timeout: Duration::from_secs(crate::config::default_timeout_sec()),
            retry_limit: crate::config::default_retry_limit(),
            seed: None,
            ui: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CouncilOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    /// Best-effort final plan: accepted or refined text, the judge's plan, or the placeholder
    pub final_plan: String,
    pub judge_valid: bool,
    pub plans_received: usize,
    pub planners: usize,
    pub accepted: bool,
    pub interrupted: bool,
}

struct PipelineReport {
    plans_received: usize,
    judge_valid: bool,
}

/// A prepared run: run directory created, UI state seeded, nothing invoked yet.
pub struct CouncilSession {
    roster: Roster,
    templates: Arc<Templates>,
    options: RunOptions,
    invoker: Arc<dyn AgentInvoker>,
    store: Arc<RunStore>,
    ui: UiHandle,
    shutdown: CancellationToken,
    brief: String,
    judge: Arc<JudgeOrchestrator>,
    service: Option<UiService>,
}

impl CouncilSession {
    pub fn new(
        task: TaskSpec,
        roster: Roster,
        templates: Templates,
        options: RunOptions,
        invoker: Arc<dyn AgentInvoker>,
    ) -> Result<Self, CouncilError> {
        task.validate()?;
        let label = task.run_label.clone().unwrap_or_else(|| task.task.clone());
        let store = Arc::new(RunStore::create(
            &options.runs_dir,
            task.run_id.as_deref(),
            &label,
            Local::now().date_naive(),
        )?);

        let brief = task_brief(&task);
        let ui = UiHandle::new(UiState::new(
            store.run_id(),
            &brief,
            &roster.planner_names(),
            roster.judge.name(),
        ));
        let templates = Arc::new(templates);
        let judge = Arc::new(JudgeOrchestrator::new(
            roster.judge.clone(),
            invoker.clone(),
            store.clone(),
            ui.clone(),
            templates.clone(),
            options.timeout,
            options.retry_limit,
        ));

        Ok(Self {
            roster,
            templates,
            options,
            invoker,
            store,
            ui,
            shutdown: CancellationToken::new(),
            brief,
            judge,
            service: None,
        })
    }

    pub fn ui(&self) -> &UiHandle {
        &self.ui
    }

    pub fn store(&self) -> &Arc<RunStore> {
        &self.store
    }

    /// Cancelling ends the run early; artifacts written so far stay on disk
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start the live UI if configured, returning its URL
    pub async fn start_ui(&mut self) -> Result<Option<String>, CouncilError> {
        if let Some(service) = &self.service {
            return Ok(Some(service.url()));
        }
        let Some(options) = self.options.ui.clone() else {
            return Ok(None);
        };
        let service = UiService::start(
            self.ui.clone(),
            self.store.clone(),
            Some(self.judge.clone()),
            self.shutdown.clone(),
            &options,
        )
        .await?;
        let url = service.url();
        self.service = Some(service);
        Ok(Some(url))
    }

    /// Plan, judge, finalize; then keep the UI up until accepted, expired or interrupted.
    pub async fn run(mut self) -> Result<CouncilOutcome, CouncilError> {
        self.start_ui().await?;
        let writer =
            spawn_snapshot_writer(self.ui.clone(), self.store.clone(), self.shutdown.clone());
        let interrupt = watch_interrupt(self.shutdown.clone());

        let report = tokio::select! {
            report = self.pipeline() => Some(report),
            _ = self.shutdown.cancelled() => None,
        };

        if report.is_some() && !self.shutdown.is_cancelled() {
            if let (Some(service), Some(options)) = (&self.service, &self.options.ui) {
                let keep_alive = chrono::Duration::from_std(options.keep_alive)
                    .unwrap_or(chrono::Duration::zero());
                self.ui.set_deadline(Some(Utc::now() + keep_alive));
                info!(
                    "Run complete; review at {} (closes in {}s unless kept open)",
                    service.url(),
                    options.keep_alive.as_secs()
                );
                self.shutdown.cancelled().await;
            }
        }

        self.shutdown.cancel();
        if let Some(service) = self.service.take() {
            service.join().await;
        }
        for handle in [writer, interrupt] {
            if let Err(e) = handle.await {
                warn!("Background task failed: {}", e);
            }
        }

        let state = self.ui.snapshot();
        if let Err(e) = self.store.write_ui_state(&state) {
            warn!("Failed to persist UI state: {}", e);
        }
        if report.is_some() {
            self.store.remove_if_empty();
        }

        let final_plan = if state.final_plan.trim().is_empty() {
            self.store.read_final_plan().unwrap_or_default()
        } else {
            state.final_plan
        };
        let (plans_received, judge_valid) = report
            .as_ref()
            .map(|r| (r.plans_received, r.judge_valid))
            .unwrap_or((0, false));

        Ok(CouncilOutcome {
            run_id: self.store.run_id().to_string(),
            run_dir: self.store.dir().to_path_buf(),
            final_plan,
            judge_valid,
            plans_received,
            planners: self.roster.planners.len(),
            accepted: self.store.accepted_path().exists(),
            interrupted: report.is_none(),
        })
    }

    async fn pipeline(&self) -> PipelineReport {
        self.ui.set_phase(Phase::Starting);
        let prompt = planner_prompt(&self.brief, &self.templates.plan);

        self.ui.set_phase(Phase::Planning);
        let planning = PlanningOrchestrator::new(
            self.roster.planners.clone(),
            self.invoker.clone(),
            self.store.clone(),
            self.ui.clone(),
            self.templates.plan_headers().to_vec(),
            self.options.timeout,
            self.options.retry_limit,
        )
        .run(&prompt)
        .await;

        let failed = planning.failed_planners();
        if !failed.is_empty() {
            self.ui
                .push_error(format!("No valid plan from: {}", failed.join(", ")));
        }

        let mut names = self.roster.planner_names();
        names.push(self.roster.judge.name().to_string());
        let anonymizer = Anonymizer::new(&names);
        let plans = anonymize_and_shuffle(
            &planning.plans,
            &anonymizer,
            &mut shuffle_rng(self.options.seed),
        );
        let labels = plans
            .mapping
            .iter()
            .map(|(label, agent)| LabelRecord {
                label: label.clone(),
                agent: agent.clone(),
            })
            .collect();
        if let Err(e) = self.store.record_labels(labels) {
            warn!("Failed to record plan labels: {}", e);
        }

        self.ui.set_phase(Phase::Judging);
        let judged = self.judge.run(&self.brief, &plans).await;

        self.ui.set_phase(Phase::Finalizing);
        if let Err(e) = self.store.write_final_plan(&judged.final_plan) {
            self.ui.push_error(e.to_string());
        }
        if judged.is_valid() {
            self.ui.set_final_plan(&judged.final_plan);
        } else {
            self.ui
                .push_error("Judge produced no valid report; final-plan.md holds a placeholder");
        }

        self.ui.set_phase(Phase::Complete);
        PipelineReport {
            plans_received: planning.plans.len(),
            judge_valid: judged.is_valid(),
        }
    }
}

/// Run a council with real agent processes
pub async fn run_council(
    task: TaskSpec,
    roster: Roster,
    templates: Templates,
    options: RunOptions,
) -> Result<CouncilOutcome, CouncilError> {
    CouncilSession::new(task, roster, templates, options, Arc::new(ProcessInvoker::new()))?
        .run()
        .await
}

/// What a resumed UI needs to serve `refine`.
#[derive(Clone)]
pub struct RefineSettings {
    pub judge: Agent,
    pub invoker: Arc<dyn AgentInvoker>,
    pub templates: Templates,
    pub timeout: Duration,
    pub retry_limit: u32,
}

/// A UI serving a finished run directory.
pub struct ResumedUi {
    pub url: String,
    ui: UiHandle,
    store: Arc<RunStore>,
    shutdown: CancellationToken,
    service: UiService,
    tasks: Vec<JoinHandle<()>>,
}

impl ResumedUi {
    pub fn ui(&self) -> &UiHandle {
        &self.ui
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until accepted, expired or interrupted, then persist the final UI state
    pub async fn wait(self) {
        self.shutdown.cancelled().await;
        self.service.join().await;
        for handle in self.tasks {
            if let Err(e) = handle.await {
                warn!("Background task failed: {}", e);
            }
        }
        if let Err(e) = self.store.write_ui_state(&self.ui.snapshot()) {
            warn!("Failed to persist UI state: {}", e);
        }
    }
}

/// Re-open the UI on an existing run directory with a fresh session deadline.
///
/// `refine` is only available when judge settings are supplied.
pub async fn resume_ui(
    run_dir: &Path,
    options: UiOptions,
    refine: Option<RefineSettings>,
) -> Result<ResumedUi, CouncilError> {
    let store = Arc::new(RunStore::open(run_dir)?);

    let mut state = match store.load_ui_state() {
        Some(state) => state,
        None => {
            debug!("No UI snapshot in {}, starting fresh", run_dir.display());
            let judge = refine
                .as_ref()
                .map(|r| r.judge.name().to_string())
                .unwrap_or_else(|| "judge".to_string());
            UiState::new(store.run_id(), "", &[], &judge)
        }
    };
    // Nothing runs in a resumed session, even if the snapshot was taken mid-run
    state.phase = Phase::Complete;
    if state.final_plan.trim().is_empty() {
        if let Some(text) = store
            .read_final_plan()
            .filter(|text| !text.trim().is_empty() && text != FINAL_PLAN_PLACEHOLDER)
        {
            state.final_plan = text;
        }
    }
    let ttl = chrono::Duration::from_std(options.session_ttl).unwrap_or(chrono::Duration::zero());
    state.keep_open = false;
    state.ui_deadline = Some(Utc::now() + ttl);

    let ui = UiHandle::new(state);
    let shutdown = CancellationToken::new();
    let judge = refine.map(|r| {
        Arc::new(JudgeOrchestrator::new(
            r.judge,
            r.invoker,
            store.clone(),
            ui.clone(),
            Arc::new(r.templates),
            r.timeout,
            r.retry_limit,
        ))
    });

    let tasks = vec![
        spawn_snapshot_writer(ui.clone(), store.clone(), shutdown.clone()),
        watch_interrupt(shutdown.clone()),
    ];
    let started = UiService::start(ui.clone(), store.clone(), judge, shutdown.clone(), &options);
    let service = match started.await {
        Ok(service) => service,
        Err(e) => {
            shutdown.cancel();
            return Err(e.into());
        }
    };
    info!("Resumed UI for {} at {}", store.run_id(), service.url());

    Ok(ResumedUi {
        url: service.url(),
        ui,
        store,
        shutdown,
        service,
        tasks,
    })
}

/// Ctrl-C cancels the session
fn watch_interrupt(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("Interrupted, shutting down");
                    shutdown.cancel();
                }
            }
        }
    })
}
