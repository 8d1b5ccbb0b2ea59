//! Planning rounds: every planner in parallel, invalid ones retried in later rounds.

use super::{run_attempt, summarize, AgentResult};
use crate::provider::{Agent, AgentInvoker};
use crate::store::{AttemptRecord, AttemptRole, RunStore};
use crate::ui::{AgentStatus, UiHandle};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A plan that passed the contract, with the planner that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPlan {
    pub agent: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlanningOutcome {
    /// In completion order
    pub plans: Vec<ValidPlan>,
    /// Every attempt of every planner
    pub results: Vec<AgentResult>,
}

impl PlanningOutcome {
    pub fn failed_planners(&self) -> Vec<String> {
        let mut failed: Vec<String> = self
            .results
            .iter()
            .map(|r| r.name.clone())
            .filter(|name| !self.plans.iter().any(|p| &p.agent == name))
            .collect();
        failed.sort();
        failed.dedup();
        failed
    }
}

/// Aborts the attempt task when the round is abandoned, killing its child process
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct PlanningOrchestrator {
    planners: Vec<Agent>,
    invoker: Arc<dyn AgentInvoker>,
    store: Arc<RunStore>,
    ui: UiHandle,
    headers: Arc<Vec<String>>,
    timeout: Duration,
    retry_limit: u32,
}

impl PlanningOrchestrator {
    pub fn new(
        planners: Vec<Agent>,
        invoker: Arc<dyn AgentInvoker>,
        store: Arc<RunStore>,
        ui: UiHandle,
        headers: Vec<String>,
        timeout: Duration,
        retry_limit: u32,
    ) -> Self {
        Self {
            planners,
            invoker,
            store,
            ui,
            headers: Arc::new(headers),
            timeout,
            retry_limit,
        }
    }

    /// Run rounds until every planner has a valid plan or its retry budget is spent.
    ///
    /// Failures stay local to their planner; the outcome holds whichever plans succeeded.
    pub async fn run(&self, prompt: &str) -> PlanningOutcome {
        let prompt = Arc::new(prompt.to_string());
        let mut outcome = PlanningOutcome::default();
        let mut pending: Vec<Agent> = self.planners.clone();

        for round in 0..=self.retry_limit {
            if pending.is_empty() {
                break;
            }
            let attempt = round + 1;
            let last_round = round == self.retry_limit;
            info!(
                "Planning round {} with {} planner(s)",
                attempt,
                pending.len()
            );

            let mut futures = FuturesUnordered::new();
            for agent in pending.drain(..) {
                self.ui.update_planner(agent.name(), |entry| {
                    entry.status = AgentStatus::Running;
                    entry.attempts = attempt;
                });

                let invoker = self.invoker.clone();
                let prompt = prompt.clone();
                let headers = self.headers.clone();
                let timeout = self.timeout;
                let task_agent = agent.clone();
                let handle = tokio::spawn(async move {
                    run_attempt(
                        invoker.as_ref(),
                        &task_agent,
                        &prompt,
                        timeout,
                        &headers,
                        attempt,
                    )
                    .await
                });
                futures.push(async move {
                    let mut task = AbortOnDrop(handle);
                    let joined = (&mut task.0).await;
                    (agent, joined)
                });
            }

            let mut retry = Vec::new();
            while let Some((agent, joined)) = futures.next().await {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Planner {} task panicked: {}", agent.name(), e);
                        AgentResult {
                            name: agent.name().to_string(),
                            attempt,
                            raw_output: String::new(),
                            normalized_text: String::new(),
                            valid: false,
                            timed_out: false,
                            error: Some(format!("planner task failed: {}", e)),
                        }
                    }
                };

                self.record(&result, last_round);
                if result.valid {
                    outcome.plans.push(ValidPlan {
                        agent: result.name.clone(),
                        text: result.normalized_text.clone(),
                    });
                } else if !last_round {
                    retry.push(agent);
                }
                outcome.results.push(result);
            }
            pending = retry;
        }

        info!(
            "Planning finished: {}/{} planner(s) produced a valid plan",
            outcome.plans.len(),
            self.planners.len()
        );
        outcome
    }

    /// Persist the attempt, append it to the run metadata, and reflect it in the UI
    fn record(&self, result: &AgentResult, last_round: bool) {
        let mut artifact = None;

        if !result.valid || result.attempt > 1 {
            let path = self.store.plan_attempt_path(&result.name, result.attempt);
            let content = if result.is_empty() {
                format!(
                    "<!-- attempt {} produced no output: {} -->\n",
                    result.attempt,
                    result.error.as_deref().unwrap_or("unknown error")
                )
            } else {
                result.normalized_text.clone()
            };
            match self.store.write(&path, &content) {
                Ok(()) => artifact = Some(path),
                Err(e) => self.ui.push_error(e.to_string()),
            }
        }
        if result.valid {
            let path = self.store.plan_path(&result.name);
            match self.store.write(&path, &result.normalized_text) {
                Ok(()) => artifact = Some(path),
                Err(e) => self.ui.push_error(e.to_string()),
            }
        }

        let record = AttemptRecord {
            agent: result.name.clone(),
            role: AttemptRole::Planner,
            attempt: result.attempt,
            valid: result.valid,
            timed_out: result.timed_out,
            error: result.error.clone(),
            artifact: artifact.and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string())),
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.store.record_attempt(record) {
            warn!("Failed to record attempt: {}", e);
        }

        if result.valid {
            info!("{} produced a valid plan on attempt {}", result.name, result.attempt);
            let summary = summarize(&result.normalized_text);
            self.ui.update_planner(&result.name, |entry| {
                entry.status = AgentStatus::Complete;
                entry.summary = summary;
            });
            return;
        }

        let error = format!(
            "attempt {}: {}",
            result.attempt,
            result.error.as_deref().unwrap_or("invalid output")
        );
        warn!("{} {}", result.name, error);
        let status = if result.is_empty() {
            AgentStatus::Failed
        } else {
            AgentStatus::NeedsFix
        };
        self.ui.update_planner(&result.name, |entry| {
            entry.status = status;
            entry.summary = error.clone();
            entry.errors.push(error);
        });
        self.ui.update_planner(&result.name, |entry| {
            entry.status = if last_round {
                AgentStatus::Failed
            } else {
                AgentStatus::Retrying
            };
        });
    }
}
