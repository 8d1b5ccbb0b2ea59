mod claude;
mod codex;
mod command;
mod gemini;
pub mod process;

pub use claude::ClaudeProvider;
pub use codex::CodexProvider;
pub use command::CommandProvider;
pub use gemini::GeminiProvider;
pub use process::{AgentOutput, ProcessInvoker, RunningAgent};

use crate::config::{AgentDescriptor, AgentKind, PromptMode};
use crate::error::ProviderError;
use crate::parser::Extraction;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A fully resolved command line for one agent attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Bytes to write to stdin before closing it
    pub stdin: Option<String>,
}

/// Per-kind strategy: how to call the CLI and how to read its answer back.
pub trait AgentProvider: Send + Sync {
    fn kind(&self) -> AgentKind;

    fn default_prompt_mode(&self) -> PromptMode;

    fn build_invocation(&self, descriptor: &AgentDescriptor, prompt: &str) -> Invocation;

    fn normalize_output(&self, raw: &str) -> Extraction;
}

/// Create the strategy for an agent kind
pub fn create_provider(kind: AgentKind) -> Arc<dyn AgentProvider> {
    match kind {
        AgentKind::Codex => Arc::new(CodexProvider),
        AgentKind::Claude => Arc::new(ClaudeProvider),
        AgentKind::Gemini => Arc::new(GeminiProvider),
        AgentKind::Command => Arc::new(CommandProvider),
    }
}

/// A descriptor bound to its kind strategy at load time.
#[derive(Clone)]
pub struct Agent {
    pub descriptor: AgentDescriptor,
    provider: Arc<dyn AgentProvider>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl Agent {
    pub fn new(mut descriptor: AgentDescriptor) -> Self {
        let provider = create_provider(descriptor.kind);
        if descriptor.prompt_mode.is_none() {
            descriptor.prompt_mode = Some(provider.default_prompt_mode());
        }
        Self {
            descriptor,
            provider,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn kind(&self) -> AgentKind {
        self.provider.kind()
    }

    pub fn build_invocation(&self, prompt: &str) -> Invocation {
        self.provider.build_invocation(&self.descriptor, prompt)
    }

    /// Extract the final answer, degrading to the raw text when no structure is found
    pub fn normalize(&self, raw: &str) -> String {
        match self.provider.normalize_output(raw) {
            Extraction::Found(text) => text,
            Extraction::Missing => {
                tracing::debug!(
                    "No structured answer in output from {} ({}), using raw text",
                    self.name(),
                    self.kind()
                );
                raw.to_string()
            }
        }
    }

    pub fn timeout(&self, default: Duration) -> Duration {
        self.descriptor
            .timeout_sec
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

/// Runs one agent attempt to completion.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        agent: &Agent,
        prompt: &str,
        timeout: Duration,
    ) -> Result<AgentOutput, ProviderError>;
}

/// Shared argument assembly: kind flags, then extra args, then the prompt.
pub(crate) fn assemble(
    descriptor: &AgentDescriptor,
    default_binary: &str,
    mut args: Vec<String>,
    prompt_flag: Option<&str>,
    prompt: &str,
) -> Invocation {
    let program = descriptor
        .binary
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_binary));

    args.extend(descriptor.extra_args.iter().cloned());

    let stdin = match descriptor.prompt_mode.unwrap_or(PromptMode::Stdin) {
        PromptMode::Arg => {
            if let Some(flag) = prompt_flag {
                args.push(flag.to_string());
            }
            args.push(prompt.to_string());
            None
        }
        PromptMode::Stdin => Some(prompt.to_string()),
    };

    Invocation {
        program,
        args,
        stdin,
    }
}
