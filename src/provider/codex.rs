use super::{assemble, AgentProvider, Invocation};
use crate::config::{AgentDescriptor, AgentKind, PromptMode};
use crate::parser::{codex_completion, codex_last_agent_message, first_found, Extraction};

/// Codex CLI: `codex exec --json`, answer carried by the JSONL event stream.
pub struct CodexProvider;

impl AgentProvider for CodexProvider {
    fn kind(&self) -> AgentKind {
        AgentKind::Codex
    }

    fn default_prompt_mode(&self) -> PromptMode {
        PromptMode::Stdin
    }

    fn build_invocation(&self, descriptor: &AgentDescriptor, prompt: &str) -> Invocation {
        let mut args = vec!["exec".to_string(), "--json".to_string()];
        if let Some(model) = &descriptor.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(effort) = &descriptor.reasoning_effort {
            args.push("-c".to_string());
            args.push(format!("model_reasoning_effort={}", effort));
        }

        let mut invocation = assemble(descriptor, "codex", args, None, prompt);
        // `-` tells codex exec to read the prompt from stdin
        if invocation.stdin.is_some() {
            invocation.args.push("-".to_string());
        }
        invocation
    }

    fn normalize_output(&self, raw: &str) -> Extraction {
        first_found(raw, &[codex_completion, codex_last_agent_message])
    }
}
