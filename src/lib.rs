//! Planning council: several agent CLIs draft plans for the same task in parallel,
//! an anonymized judge merges them into one final plan, and a small live UI lets a
//! reviewer save, accept or refine the result.

pub mod config;
pub mod contract;
pub mod council;
pub mod error;
pub mod parser;
pub mod provider;
pub mod store;
pub mod ui;

pub use config::{AgentDescriptor, AgentKind, AgentsConfig, Roster, TaskSpec};
pub use contract::Templates;
pub use council::{
    resume_ui, run_council, CouncilOutcome, CouncilSession, RefineSettings, ResumedUi,
    RunOptions,
};
pub use error::CouncilError;
pub use ui::UiOptions;
