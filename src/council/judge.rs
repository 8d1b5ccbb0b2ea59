//! The judge: compares anonymized plans and synthesizes the final plan.

use super::anonymize::AnonymizedSet;
use super::prompt::{judge_prompt, refine_prompt};
use super::{run_attempt, summarize, AgentResult};
use crate::contract::Templates;
use crate::error::RefineError;
use crate::provider::{Agent, AgentInvoker};
use crate::store::{AttemptRecord, AttemptRole, RunStore, FINAL_PLAN_PLACEHOLDER};
use crate::ui::{AgentStatus, UiHandle};
use chrono::Utc;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The level-2 heading line that opens the final plan section
const FINAL_PLAN_HEADING: &str = r"(?m)^[ \t]*##[ \t]+Final Plan\b.*$";

#[derive(Debug, Clone)]
pub struct JudgeOutcome {
    /// The valid judge report, if any attempt produced one
    pub report: Option<String>,
    /// Extracted plan, or the placeholder when the judge failed
    pub final_plan: String,
    pub attempts: u32,
}

impl JudgeOutcome {
    pub fn is_valid(&self) -> bool {
        self.report.is_some()
    }
}

pub struct JudgeOrchestrator {
    judge: Agent,
    invoker: Arc<dyn AgentInvoker>,
    store: Arc<RunStore>,
    ui: UiHandle,
    templates: Arc<Templates>,
    timeout: Duration,
    retry_limit: u32,
}

impl JudgeOrchestrator {
    pub fn new(
        judge: Agent,
        invoker: Arc<dyn AgentInvoker>,
        store: Arc<RunStore>,
        ui: UiHandle,
        templates: Arc<Templates>,
        timeout: Duration,
        retry_limit: u32,
    ) -> Self {
        Self {
            judge,
            invoker,
            store,
            ui,
            templates,
            timeout,
            retry_limit,
        }
    }

    pub fn name(&self) -> &str {
        self.judge.name()
    }

    /// Judge the plan set with the same retry budget planners get.
    ///
    /// An empty set fails the judge without invoking it.
    pub async fn run(&self, brief: &str, plans: &AnonymizedSet) -> JudgeOutcome {
        if plans.is_empty() {
            warn!("No valid plans to judge");
            self.ui.update_judge(|entry| {
                entry.status = AgentStatus::Failed;
                entry.summary = "No valid plans to judge".to_string();
                entry.errors.push("No valid plans to judge".to_string());
            });
            return JudgeOutcome {
                report: None,
                final_plan: FINAL_PLAN_PLACEHOLDER.to_string(),
                attempts: 0,
            };
        }

        let prompt = judge_prompt(brief, plans, &self.templates.judge, &self.templates.plan);
        let max_attempts = self.retry_limit + 1;

        for attempt in 1..=max_attempts {
            self.ui.update_judge(|entry| {
                entry.status = AgentStatus::Running;
                entry.attempts = attempt;
            });
            info!("Judge {} attempt {}/{}", self.judge.name(), attempt, max_attempts);

            let result = run_attempt(
                self.invoker.as_ref(),
                &self.judge,
                &prompt,
                self.timeout,
                self.templates.judge_headers(),
                attempt,
            )
            .await;
            self.persist(&result);

            if result.valid {
                let final_plan = extract_final_plan(&result.normalized_text);
                let summary = summarize(&final_plan);
                self.ui.update_judge(|entry| {
                    entry.status = AgentStatus::Complete;
                    entry.summary = summary;
                });
                return JudgeOutcome {
                    report: Some(result.normalized_text),
                    final_plan,
                    attempts: attempt,
                };
            }

            let error = format!(
                "attempt {}: {}",
                attempt,
                result.error.as_deref().unwrap_or("invalid output")
            );
            warn!("Judge {}", error);
            let status = if result.is_empty() {
                AgentStatus::Failed
            } else {
                AgentStatus::NeedsFix
            };
            self.ui.update_judge(|entry| {
                entry.status = status;
                entry.summary = error.clone();
                entry.errors.push(error);
            });
            if attempt < max_attempts {
                self.ui
                    .update_judge(|entry| entry.status = AgentStatus::Retrying);
            }
        }

        self.ui.update_judge(|entry| entry.status = AgentStatus::Failed);
        JudgeOutcome {
            report: None,
            final_plan: FINAL_PLAN_PLACEHOLDER.to_string(),
            attempts: max_attempts,
        }
    }

    /// Ask the judge to revise `current` per `note`; the answer must satisfy the plan contract.
    ///
    /// Leaves the run phase and the judge's UI entry untouched.
    pub async fn refine(
        &self,
        brief: &str,
        current: &str,
        note: &str,
    ) -> Result<String, RefineError> {
        if current.trim().is_empty() {
            return Err(RefineError::EmptyPlan);
        }

        let prompt = refine_prompt(brief, current, note, &self.templates.plan);
        let max_attempts = self.retry_limit + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            info!("Refining final plan, attempt {}/{}", attempt, max_attempts);
            let result = run_attempt(
                self.invoker.as_ref(),
                &self.judge,
                &prompt,
                self.timeout,
                self.templates.plan_headers(),
                attempt,
            )
            .await;
            self.record(&result, AttemptRole::Refine, None);

            if result.valid {
                return Ok(embedded_plan(&result.normalized_text)
                    .unwrap_or_else(|| result.normalized_text.trim().to_string()));
            }
            last_error = result
                .error
                .unwrap_or_else(|| "invalid output".to_string());
            warn!("Refinement attempt {} failed: {}", attempt, last_error);
        }

        Err(RefineError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    fn persist(&self, result: &AgentResult) {
        let path = if result.valid && result.attempt == 1 {
            self.store.judge_path()
        } else {
            self.store.judge_attempt_path(result.attempt)
        };
        let content = if result.is_empty() {
            format!(
                "<!-- attempt {} produced no output: {} -->\n",
                result.attempt,
                result.error.as_deref().unwrap_or("unknown error")
            )
        } else {
            result.normalized_text.clone()
        };

        let mut artifact = match self.store.write(&path, &content) {
            Ok(()) => Some(path),
            Err(e) => {
                self.ui.push_error(e.to_string());
                None
            }
        };
        if result.valid && result.attempt > 1 {
            let path = self.store.judge_path();
            match self.store.write(&path, &result.normalized_text) {
                Ok(()) => artifact = Some(path),
                Err(e) => self.ui.push_error(e.to_string()),
            }
        }
        self.record(result, AttemptRole::Judge, artifact);
    }

    fn record(&self, result: &AgentResult, role: AttemptRole, artifact: Option<PathBuf>) {
        let record = AttemptRecord {
            agent: result.name.clone(),
            role,
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
    }
}

/// Final plan from a judge report.
///
/// Takes the first `# Plan` document inside the `## Final Plan` section; without one,
/// the section body verbatim; without the section, the whole report.
pub fn extract_final_plan(report: &str) -> String {
    let heading = Regex::new(FINAL_PLAN_HEADING)
        .ok()
        .and_then(|re| re.find(report));
    let Some(heading) = heading else {
        return report.trim().to_string();
    };
    let section = &report[heading.end()..];

    match embedded_plan(section) {
        Some(plan) => plan,
        None => strip_fence(section).trim().to_string(),
    }
}

/// From the first `# Plan` heading to the end, minus a closing code fence
fn embedded_plan(text: &str) -> Option<String> {
    let re = Regex::new(r"(?m)^[ \t]*# Plan\b").ok()?;
    let found = re.find(text)?;
    let plan = strip_fence(&text[found.start()..]).trim();
    Some(plan.to_string())
}

/// Drop an opening fence line and a trailing fence
fn strip_fence(text: &str) -> &str {
    let mut text = text.trim();
    if text.starts_with("```") {
        text = text.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    }
    let trimmed = text.trim_end();
    match trimmed.strip_suffix("```") {
        Some(rest) => rest,
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::anonymize::LabeledPlan;
    use crate::council::testing::*;
    use crate::ui::UiState;
    use chrono::NaiveDate;

    #[test]
    fn test_extract_embedded_plan() {
        let report = valid_judge_report("merged");
        let plan = extract_final_plan(&report);
        assert!(plan.starts_with("# Plan"));
        assert!(plan.contains("merged"));
        assert!(!plan.contains("# Judge Report"));
    }

    #[test]
    fn test_extract_plan_in_code_fence() {
        let report = "# Judge Report\n## Final Plan\n```markdown\n# Plan\n## Overview\nx\n```\n";
        assert_eq!(extract_final_plan(report), "# Plan\n## Overview\nx");
    }

    #[test]
    fn test_extract_without_embedded_plan_keeps_section() {
        let report = "# Judge Report\n## Scores\n\n## Final Plan\n\nJust do plan 2 as written.\n";
        assert_eq!(extract_final_plan(report), "Just do plan 2 as written.");
    }

    #[test]
    fn test_extract_without_section_keeps_report() {
        assert_eq!(extract_final_plan("  # Judge Report\nbody\n"), "# Judge Report\nbody");
    }

    #[test]
    fn test_plan_heading_is_not_a_prefix_match() {
        let report = "## Final Plan\n# Planning notes\nsee below\n# Plan\nreal";
        assert_eq!(extract_final_plan(report), "# Plan\nreal");
    }

    #[test]
    fn test_final_plan_heading_must_be_its_own_line() {
        let report = "# Judge Report\n## Improvements\nMerged into the ## Final Plan below.\n\
                      ### Final Plan notes\nignore me\n## Final Plan\n# Plan\nreal";
        assert_eq!(extract_final_plan(report), "# Plan\nreal");
    }

    fn judge_fixture(
        invoker: ScriptedInvoker,
    ) -> (tempfile::TempDir, JudgeOrchestrator, Arc<RunStore>, UiHandle) {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(
            RunStore::create(
                root.path(),
                Some("judge"),
                "",
                NaiveDate::from_ymd_opt(2026, 7, 8).unwrap(),
            )
            .unwrap(),
        );
        let ui = UiHandle::new(UiState::new("judge", "brief", &[], "arbiter"));
        let judge = JudgeOrchestrator::new(
            command_agent("arbiter"),
            Arc::new(invoker),
            store.clone(),
            ui.clone(),
            Arc::new(Templates::default()),
            Duration::from_secs(5),
            2,
        );
        (root, judge, store, ui)
    }

    fn one_plan() -> AnonymizedSet {
        AnonymizedSet {
            plans: vec![LabeledPlan {
                label: "Plan 1".to_string(),
                text: valid_plan("candidate"),
            }],
            mapping: vec![("Plan 1".to_string(), "a".to_string())],
        }
    }

    #[tokio::test]
    async fn test_judge_success_writes_report() {
        let invoker = ScriptedInvoker::new()
            .reply("arbiter", vec![Reply::Text(valid_judge_report("final"))]);
        let (_root, judge, store, ui) = judge_fixture(invoker);

        let outcome = judge.run("brief", &one_plan()).await;

        assert!(outcome.is_valid());
        assert!(outcome.final_plan.contains("final"));
        assert!(store.judge_path().exists());
        assert_eq!(ui.snapshot().judge.status, AgentStatus::Complete);
    }

    #[tokio::test]
    async fn test_judge_invalid_every_attempt() {
        let invoker = ScriptedInvoker::new()
            .reply("arbiter", vec![Reply::Text("# Judge Report\nno sections".to_string())]);
        let (_root, judge, store, ui) = judge_fixture(invoker);

        let outcome = judge.run("brief", &one_plan()).await;

        assert!(!outcome.is_valid());
        assert_eq!(outcome.final_plan, FINAL_PLAN_PLACEHOLDER);
        assert_eq!(outcome.attempts, 3);
        assert!(!store.judge_path().exists());
        for attempt in 1..=3 {
            assert!(store.judge_attempt_path(attempt).exists());
        }
        let entry = ui.snapshot().judge;
        assert_eq!(entry.status, AgentStatus::Failed);
        assert_eq!(entry.errors.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_plan_set_fails_without_invoking() {
        let invoker = ScriptedInvoker::new();
        let (_root, judge, _store, ui) = judge_fixture(invoker);
        let outcome = judge.run("brief", &AnonymizedSet::default()).await;
        assert!(!outcome.is_valid());
        assert_eq!(outcome.attempts, 0);
        assert_eq!(ui.snapshot().judge.status, AgentStatus::Failed);
    }

    #[tokio::test]
    async fn test_refine_validates_against_plan_contract() {
        let invoker = ScriptedInvoker::new().reply(
            "arbiter",
            vec![
                Reply::Text("sure, here you go".to_string()),
                Reply::Text(format!("Revised:\n\n{}", valid_plan("refined"))),
            ],
        );
        let (_root, judge, store, ui) = judge_fixture(invoker);

        let refined = judge.refine("brief", "# Plan\nold", "more tests").await.unwrap();
        assert!(refined.starts_with("# Plan"));
        assert!(refined.contains("refined"));
        assert_eq!(ui.snapshot().judge.status, AgentStatus::Pending);

        let roles: Vec<_> = store.metadata().attempts.iter().map(|a| a.role).collect();
        assert_eq!(roles, vec![AttemptRole::Refine, AttemptRole::Refine]);
    }

    #[tokio::test]
    async fn test_refine_rejects_empty_plan_and_exhausts() {
        let invoker =
            ScriptedInvoker::new().reply("arbiter", vec![Reply::Text("nope".to_string())]);
        let (_root, judge, _store, _ui) = judge_fixture(invoker);

        assert!(matches!(
            judge.refine("brief", "   ", "x").await,
            Err(RefineError::EmptyPlan)
        ));
        assert!(matches!(
            judge.refine("brief", "# Plan", "x").await,
            Err(RefineError::Exhausted { attempts: 3, .. })
        ));
    }
}
