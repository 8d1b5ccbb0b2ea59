//! The planning council: parallel planners, an anonymized judge, and the session tying them
//! to the run directory and the live UI.

pub mod anonymize;
pub mod judge;
pub mod planning;
pub mod prompt;
mod session;

pub use anonymize::{anonymize_and_shuffle, Anonymizer, AnonymizedSet, LabeledPlan};
pub use judge::{extract_final_plan, JudgeOrchestrator, JudgeOutcome};
pub use planning::{PlanningOrchestrator, PlanningOutcome, ValidPlan};
pub use session::{
    resume_ui, run_council, CouncilOutcome, CouncilSession, RefineSettings, ResumedUi,
    RunOptions,
};

use crate::contract::validate;
use crate::error::ProviderError;
use crate::provider::{Agent, AgentInvoker};
use std::time::Duration;
use tracing::debug;

/// One invocation of one agent, normalized and checked against a contract.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub name: String,
    pub attempt: u32,
    pub raw_output: String,
    pub normalized_text: String,
    pub valid: bool,
    pub timed_out: bool,
    pub error: Option<String>,
}

impl AgentResult {
    /// No usable output at all, as opposed to output that breaks the contract
    pub fn is_empty(&self) -> bool {
        self.normalized_text.trim().is_empty()
    }
}

/// Invoke, normalize and validate one attempt. Never fails: errors land in the result.
pub(crate) async fn run_attempt(
    invoker: &dyn AgentInvoker,
    agent: &Agent,
    prompt: &str,
    default_timeout: Duration,
    headers: &[String],
    attempt: u32,
) -> AgentResult {
    let timeout = agent.timeout(default_timeout);
    match invoker.invoke(agent, prompt, timeout).await {
        Ok(output) => {
            let normalized = agent.normalize(&output.raw);
            let validation = validate(&normalized, headers);
            let error = if normalized.trim().is_empty() {
                Some(match output.exit_code {
                    Some(code) if code != 0 => format!("No output (exit code {})", code),
                    _ => "No output".to_string(),
                })
            } else {
                validation.error
            };
            debug!(
                "{} attempt {}: {} bytes raw, valid={}",
                agent.name(),
                attempt,
                output.raw.len(),
                validation.ok
            );
            AgentResult {
                name: agent.name().to_string(),
                attempt,
                raw_output: output.raw,
                normalized_text: normalized,
                valid: validation.ok,
                timed_out: false,
                error,
            }
        }
        Err(e) => AgentResult {
            name: agent.name().to_string(),
            attempt,
            raw_output: String::new(),
            normalized_text: String::new(),
            valid: false,
            timed_out: matches!(e, ProviderError::Timeout(_)),
            error: Some(e.to_string()),
        },
    }
}

/// First meaningful line of a document, shortened for status cards
pub(crate) fn summarize(text: &str) -> String {
    const MAX: usize = 160;
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .unwrap_or("");
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory invoker for orchestration tests.

    use super::*;
    use crate::error::ProviderError;
    use crate::provider::AgentOutput;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum Reply {
        Text(String),
        Timeout,
        /// Never answers, like an agent stuck until its process is killed
        Hang,
    }

    /// Replies per agent name, consumed in order; the last reply repeats.
    #[derive(Default)]
    pub struct ScriptedInvoker {
        replies: Mutex<HashMap<String, Vec<Reply>>>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedInvoker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, agent: &str, replies: Vec<Reply>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .insert(agent.to_string(), replies);
            self
        }

        pub fn calls_for(&self, agent: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| name == agent)
                .count()
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            agent: &Agent,
            prompt: &str,
            timeout: Duration,
        ) -> Result<AgentOutput, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((agent.name().to_string(), prompt.to_string()));
            let reply = {
                let mut replies = self.replies.lock().unwrap();
                let queue = replies.entry(agent.name().to_string()).or_default();
                match queue.len() {
                    0 => Reply::Text(String::new()),
                    1 => queue[0].clone(),
                    _ => queue.remove(0),
                }
            };
            match reply {
                Reply::Text(raw) => Ok(AgentOutput {
                    raw,
                    exit_code: Some(0),
                    duration: Duration::from_millis(1),
                }),
                Reply::Timeout => Err(ProviderError::Timeout(timeout)),
                Reply::Hang => std::future::pending().await,
            }
        }
    }

    pub fn valid_plan(marker: &str) -> String {
        format!(
            "# Plan\n\n## Overview\n{}\n\n## Scope\ns\n\n## Phases\n1. p\n\n## Testing Strategy\nt\n\n\
             ## Risks\nr\n\n## Rollback Plan\nb\n\n## Edge Cases\ne\n",
            marker
        )
    }

    pub fn valid_judge_report(final_marker: &str) -> String {
        format!(
            "# Judge Report\n\n## Scores\nPlan 1: 8\n\n## Comparative Analysis\na\n\n\
             ## Missing Steps\nm\n\n## Contradictions\nc\n\n## Improvements\ni\n\n\
             ## Final Plan\n\n{}",
            valid_plan(final_marker)
        )
    }

    pub fn command_agent(name: &str) -> Agent {
        let mut descriptor =
            crate::config::AgentDescriptor::new(name, crate::config::AgentKind::Command);
        descriptor.binary = Some("true".into());
        Agent::new(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::contract::Templates;

    #[tokio::test]
    async fn test_run_attempt_classifies_outcomes() {
        let templates = Templates::default();
        let invoker = ScriptedInvoker::new()
            .reply("good", vec![Reply::Text(valid_plan("x"))])
            .reply("bad", vec![Reply::Text("# Plan\nonly a title".to_string())])
            .reply("slow", vec![Reply::Timeout]);

        let timeout = Duration::from_secs(1);
        let headers = templates.plan_headers();
        let good = run_attempt(&invoker, &command_agent("good"), "p", timeout, headers, 1).await;
        let bad = run_attempt(&invoker, &command_agent("bad"), "p", timeout, headers, 1).await;
        let slow = run_attempt(&invoker, &command_agent("slow"), "p", timeout, headers, 2).await;

        assert!(good.valid && good.error.is_none());
        assert!(!bad.valid && !bad.is_empty());
        assert!(bad.error.unwrap().contains("## Overview"));
        assert!(slow.timed_out && slow.is_empty());
        assert_eq!(slow.attempt, 2);
    }

    #[test]
    fn test_summarize_skips_headers() {
        assert_eq!(summarize("# Plan\n\n## Overview\nShip it.\n"), "Ship it.");
        assert_eq!(summarize(""), "");
        let long = "x".repeat(400);
        assert_eq!(summarize(&long).chars().count(), 161);
    }
}
