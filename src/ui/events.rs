//! Events pushed to UI subscribers.

use super::actions::ActionOutcome;
use super::state::{AgentEntry, Phase, UiState};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One state change, serialized as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UiEvent {
    /// Full state, sent first on every new subscription
    Snapshot(Box<UiState>),
    PhaseChange {
        phase: Phase,
    },
    PlannerUpdate(AgentEntry),
    JudgeUpdate(AgentEntry),
    FinalPlan {
        text: String,
    },
    SessionUpdate(SessionInfo),
    ActionResult(ActionOutcome),
}

impl UiEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::Snapshot(_) => "snapshot",
            UiEvent::PhaseChange { .. } => "phase_change",
            UiEvent::PlannerUpdate(_) => "planner_update",
            UiEvent::JudgeUpdate(_) => "judge_update",
            UiEvent::FinalPlan { .. } => "final_plan",
            UiEvent::SessionUpdate(_) => "session_update",
            UiEvent::ActionResult(_) => "action_result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub keep_open: bool,
    pub ui_deadline: Option<DateTime<Utc>>,
    pub expired: bool,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_wire_format() {
        let event = UiEvent::PhaseChange {
            phase: Phase::Judging,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "phase_change");
        assert_eq!(value["payload"]["phase"], "judging");
        assert_eq!(event.name(), "phase_change");

        let event = UiEvent::PlannerUpdate(AgentEntry::pending("cx"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "planner_update");
        assert_eq!(value["payload"]["id"], "cx");
    }

    #[test]
    fn test_snapshot_event_carries_state() {
        let state = UiState::new("r", "brief", &[], "judge");
        let value = serde_json::to_value(UiEvent::Snapshot(Box::new(state))).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["payload"]["runId"], "r");
    }
}
