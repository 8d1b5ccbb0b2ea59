use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CouncilError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("UI error: {0}")]
    Ui(#[from] UiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Task specification has an empty `task` field")]
    EmptyTask,

    #[error(
        "No planner agents configured. Add `agents.planners` to the task spec, \
         or run `council configure` to create {0}"
    )]
    NoPlanners(PathBuf),

    #[error("Agent name '{0}' is used more than once; agent names must be unique")]
    DuplicateAgent(String),

    #[error("Agent at position {0} has an empty name")]
    EmptyAgentName(usize),

    #[error("Agent '{0}' has kind `command` but no `binary`")]
    MissingBinary(String),

    #[error("Agent name '{0}' clashes with the redaction marker; choose another name")]
    ReservedAgentName(String),
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Agent timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent '{0}' already has a live process")]
    AlreadyRunning(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create run directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum UiError {
    #[error("Failed to bind UI server on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("UI server failed: {0}")]
    Serve(std::io::Error),

    #[error("Action queue is closed")]
    QueueClosed,
}

#[derive(Error, Debug)]
pub enum RefineError {
    #[error("No final plan to refine")]
    EmptyPlan,

    #[error("Refinement produced no valid plan after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}
