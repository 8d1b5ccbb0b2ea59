use super::{assemble, AgentProvider, Invocation};
use crate::config::{AgentDescriptor, AgentKind, PromptMode};
use crate::parser::{envelope_field, first_found, Extraction};

/// Gemini CLI with `--output-format json`: one envelope object.
pub struct GeminiProvider;

impl AgentProvider for GeminiProvider {
    fn kind(&self) -> AgentKind {
        AgentKind::Gemini
    }

    fn default_prompt_mode(&self) -> PromptMode {
        PromptMode::Arg
    }

    fn build_invocation(&self, descriptor: &AgentDescriptor, prompt: &str) -> Invocation {
        let mut args = vec!["--output-format".to_string(), "json".to_string()];
        if let Some(model) = &descriptor.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        assemble(descriptor, "gemini", args, Some("--prompt"), prompt)
    }

    fn normalize_output(&self, raw: &str) -> Extraction {
        first_found(raw, &[envelope_field])
    }
}
