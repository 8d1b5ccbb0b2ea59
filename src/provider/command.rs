use super::{assemble, AgentProvider, Invocation};
use crate::config::{AgentDescriptor, AgentKind, PromptMode};
use crate::parser::Extraction;

/// Arbitrary command (`binary` + `extra_args`); stdout is the answer.
pub struct CommandProvider;

impl AgentProvider for CommandProvider {
    fn kind(&self) -> AgentKind {
        AgentKind::Command
    }

    fn default_prompt_mode(&self) -> PromptMode {
        PromptMode::Stdin
    }

    fn build_invocation(&self, descriptor: &AgentDescriptor, prompt: &str) -> Invocation {
        assemble(descriptor, "sh", Vec::new(), None, prompt)
    }

    fn normalize_output(&self, _raw: &str) -> Extraction {
        Extraction::Missing
    }
}
