//! Shared UI state and its single mutate-and-broadcast entry point.

use super::events::{SessionInfo, UiEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Events buffered per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Starting,
    Planning,
    Judging,
    Finalizing,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Starting => write!(f, "starting"),
            Phase::Planning => write!(f, "planning"),
            Phase::Judging => write!(f, "judging"),
            Phase::Finalizing => write!(f, "finalizing"),
            Phase::Complete => write!(f, "complete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentStatus {
    Pending,
    Running,
    Retrying,
    Complete,
    NeedsFix,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEntry {
    pub id: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub attempts: u32,
}

impl AgentEntry {
    pub fn pending(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: AgentStatus::Pending,
            summary: String::new(),
            errors: Vec::new(),
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub run_id: String,
    pub task_brief: String,
    pub phase: Phase,
    pub planners: Vec<AgentEntry>,
    pub judge: AgentEntry,
    #[serde(default)]
    pub final_plan: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub keep_open: bool,
    /// `None` means the session never expires on its own
    #[serde(default)]
    pub ui_deadline: Option<DateTime<Utc>>,
    pub timestamps: Timestamps,
}

impl UiState {
    pub fn new(run_id: &str, task_brief: &str, planners: &[String], judge: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            task_brief: task_brief.to_string(),
            phase: Phase::Starting,
            planners: planners.iter().map(|p| AgentEntry::pending(p)).collect(),
            judge: AgentEntry::pending(judge),
            final_plan: String::new(),
            errors: Vec::new(),
            keep_open: false,
            ui_deadline: None,
            timestamps: Timestamps {
                started_at: now,
                updated_at: now,
            },
        }
    }

    pub fn planner_mut(&mut self, id: &str) -> Option<&mut AgentEntry> {
        self.planners.iter_mut().find(|p| p.id == id)
    }

    pub fn session_info(&self, expired: bool) -> SessionInfo {
        SessionInfo {
            keep_open: self.keep_open,
            ui_deadline: self.ui_deadline,
            expired,
            errors: self.errors.clone(),
        }
    }
}

/// Cloneable handle to the session's UI state.
#[derive(Clone)]
pub struct UiHandle {
    state: Arc<Mutex<UiState>>,
    events: broadcast::Sender<UiEvent>,
}

impl UiHandle {
    pub fn new(state: UiState) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(state)),
            events,
        }
    }

    /// Apply `f` under the lock and broadcast the event it returns.
    ///
    /// The send happens while the lock is held, so subscribers see events in mutation order.
    /// Sending never blocks; with no subscribers the event is dropped.
    pub fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut UiState) -> UiEvent,
    {
        self.try_mutate(|state| Some(f(state)));
    }

    /// Like `mutate`, but `f` may decline by returning `None`, leaving nothing broadcast.
    ///
    /// The check and the change share one lock acquisition. Returns whether an event was sent.
    pub fn try_mutate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut UiState) -> Option<UiEvent>,
    {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(event) = f(&mut state) else {
            return false;
        };
        state.timestamps.updated_at = Utc::now();
        let _ = self.events.send(event);
        true
    }

    pub fn snapshot(&self) -> UiState {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    pub fn set_phase(&self, phase: Phase) {
        self.mutate(|state| {
            state.phase = phase;
            UiEvent::PhaseChange { phase }
        });
    }

    pub fn update_planner<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut AgentEntry),
    {
        self.mutate(|state| {
            let idx = match state.planners.iter().position(|p| p.id == id) {
                Some(idx) => idx,
                None => {
                    state.planners.push(AgentEntry::pending(id));
                    state.planners.len() - 1
                }
            };
            let entry = &mut state.planners[idx];
            f(entry);
            UiEvent::PlannerUpdate(entry.clone())
        });
    }

    pub fn update_judge<F>(&self, f: F)
    where
        F: FnOnce(&mut AgentEntry),
    {
        self.mutate(|state| {
            f(&mut state.judge);
            UiEvent::JudgeUpdate(state.judge.clone())
        });
    }

    pub fn set_final_plan(&self, text: &str) {
        self.mutate(|state| {
            state.final_plan = text.to_string();
            UiEvent::FinalPlan {
                text: text.to_string(),
            }
        });
    }

    /// Record a run-level error, surfaced through a session update
    pub fn push_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.mutate(|state| {
            state.errors.push(message);
            UiEvent::SessionUpdate(state.session_info(false))
        });
    }

    pub fn set_deadline(&self, deadline: Option<DateTime<Utc>>) {
        self.mutate(|state| {
            state.ui_deadline = deadline;
            UiEvent::SessionUpdate(state.session_info(false))
        });
    }
}
