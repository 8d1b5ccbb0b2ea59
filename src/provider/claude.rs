use super::{assemble, AgentProvider, Invocation};
use crate::config::{AgentDescriptor, AgentKind, PromptMode};
use crate::parser::{claude_last_result, envelope_field, first_found, Extraction};

/// Claude Code CLI in print mode with a JSON event array on stdout.
pub struct ClaudeProvider;

impl AgentProvider for ClaudeProvider {
    fn kind(&self) -> AgentKind {
        AgentKind::Claude
    }

    fn default_prompt_mode(&self) -> PromptMode {
        PromptMode::Arg
    }

    fn build_invocation(&self, descriptor: &AgentDescriptor, prompt: &str) -> Invocation {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--verbose".to_string(),
        ];
        if let Some(model) = &descriptor.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(effort) = &descriptor.reasoning_effort {
            tracing::debug!(
                "Agent {}: claude has no reasoning flag, ignoring effort '{}'",
                descriptor.name,
                effort
            );
        }

        assemble(descriptor, "claude", args, None, prompt)
    }

    fn normalize_output(&self, raw: &str) -> Extraction {
        first_found(raw, &[claude_last_result, envelope_field])
    }
}
