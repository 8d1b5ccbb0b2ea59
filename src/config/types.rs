use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The planning task handed to every planner.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct TaskSpec {
    /// Free-text description of what needs planning
    pub task: String,

    /// Ordered constraints the plan must respect
    #[serde(default)]
    pub constraints: Vec<String>,

    #[serde(default, alias = "repoContext")]
    pub repo_context: Option<RepoContext>,

    /// Inline agent roster; when absent the per-user agents file is used
    #[serde(default)]
    pub agents: Option<AgentsConfig>,

    /// Explicit run directory name (used verbatim, still disambiguated on collision)
    #[serde(default, alias = "runId")]
    pub run_id: Option<String>,

    /// Label slugified into the run directory name instead of the task text
    #[serde(default, alias = "runLabel")]
    pub run_label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct RepoContext {
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub paths: Vec<PathBuf>,

    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct AgentsConfig {
    #[serde(default)]
    pub planners: Vec<AgentDescriptor>,

    #[serde(default)]
    pub judge: Option<AgentDescriptor>,
}

/// How to invoke one agent CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct AgentDescriptor {
    /// Unique within a run; used in artifact names
    pub name: String,

    pub kind: AgentKind,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default, alias = "reasoningEffort")]
    pub reasoning_effort: Option<String>,

    /// Defaults per kind when omitted
    #[serde(default, alias = "promptMode")]
    pub prompt_mode: Option<PromptMode>,

    #[serde(default, alias = "extraArgs")]
    pub extra_args: Vec<String>,

    /// Executable to run instead of the kind's default binary
    #[serde(default)]
    pub binary: Option<PathBuf>,

    /// Per-agent override of the run timeout
    #[serde(default)]
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Codex CLI, newline-delimited JSON events
    Codex,
    /// Claude Code CLI, JSON array of events
    Claude,
    /// Gemini CLI, single JSON envelope
    Gemini,
    /// Any other command; output is taken as plain text
    Command,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Codex => write!(f, "codex"),
            AgentKind::Claude => write!(f, "claude"),
            AgentKind::Gemini => write!(f, "gemini"),
            AgentKind::Command => write!(f, "command"),
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "codex" | "codex_cli" => Ok(AgentKind::Codex),
            "claude" | "claude_cli" | "claude-code" => Ok(AgentKind::Claude),
            "gemini" | "gemini_cli" => Ok(AgentKind::Gemini),
            "command" | "cmd" | "custom" => Ok(AgentKind::Command),
            _ => Err(format!("Unknown agent kind: {}", s)),
        }
    }
}

/// Where the prompt goes: appended as the final argument, or written to stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    #[serde(alias = "argument")]
    Arg,
    Stdin,
}

impl std::fmt::Display for PromptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptMode::Arg => write!(f, "arg"),
            PromptMode::Stdin => write!(f, "stdin"),
        }
    }
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            model: None,
            reasoning_effort: None,
            prompt_mode: None,
            extra_args: Vec::new(),
            binary: None,
            timeout_sec: None,
        }
    }
}
