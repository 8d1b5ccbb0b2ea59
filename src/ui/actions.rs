//! Inbound UI actions, drained in arrival order by a single worker.

use super::events::UiEvent;
use super::state::{Phase, UiHandle};
use crate::council::judge::JudgeOrchestrator;
use crate::error::UiError;
use crate::store::RunStore;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Save,
    Accept,
    Refine,
    Keepalive,
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('/').to_lowercase().as_str() {
            "save" => Ok(ActionKind::Save),
            "accept" => Ok(ActionKind::Accept),
            "refine" => Ok(ActionKind::Refine),
            "keepalive" | "keep-alive" | "keep_alive" => Ok(ActionKind::Keepalive),
            other => Err(format!("Unknown action: {}", other)),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Save => write!(f, "save"),
            ActionKind::Accept => write!(f, "accept"),
            ActionKind::Refine => write!(f, "refine"),
            ActionKind::Keepalive => write!(f, "keepalive"),
        }
    }
}

#[derive(Debug)]
pub struct Action {
    pub id: Uuid,
    pub kind: ActionKind,
    pub payload: Value,
    reply: Option<oneshot::Sender<ActionOutcome>>,
}

impl Action {
    pub fn new(kind: ActionKind, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            reply: None,
        }
    }

    fn text_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// What an action did, sent back to the caller and broadcast as `action_result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub id: String,
    pub action: ActionKind,
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ActionOutcome {
    fn ok(action: &Action, message: impl Into<String>) -> Self {
        Self {
            id: action.id.to_string(),
            action: action.kind,
            ok: true,
            message: message.into(),
            path: None,
        }
    }

    fn failed(action: &Action, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            ..Self::ok(action, message)
        }
    }

    fn with_path(mut self, path: &std::path::Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }
}

/// Producer side of the action queue.
#[derive(Clone)]
pub struct ActionQueue {
    tx: mpsc::UnboundedSender<Action>,
}

impl ActionQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue an action; the receiver resolves once the worker has handled it
    pub fn submit(
        &self,
        kind: ActionKind,
        payload: Value,
    ) -> Result<oneshot::Receiver<ActionOutcome>, UiError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut action = Action::new(kind, payload);
        action.reply = Some(reply_tx);
        debug!("Queued {} action {}", kind, action.id);
        self.tx.send(action).map_err(|_| UiError::QueueClosed)?;
        Ok(reply_rx)
    }
}

/// The single consumer of the action queue.
pub struct ActionWorker {
    ui: UiHandle,
    store: Arc<RunStore>,
    judge: Option<Arc<JudgeOrchestrator>>,
    shutdown: CancellationToken,
    session_ttl: Duration,
}

impl ActionWorker {
    pub fn new(
        ui: UiHandle,
        store: Arc<RunStore>,
        judge: Option<Arc<JudgeOrchestrator>>,
        shutdown: CancellationToken,
        session_ttl: Duration,
    ) -> Self {
        Self {
            ui,
            store,
            judge,
            shutdown,
            session_ttl,
        }
    }

    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<Action>) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(action) => {
                        self.handle(action).await;
                    }
                    None => break,
                },
            }
        }
        debug!("Action worker stopped");
    }

    /// Process one action, broadcast its result and answer the caller.
    pub async fn handle(&self, mut action: Action) -> ActionOutcome {
        info!("Handling {} action {}", action.kind, action.id);
        // A long refine must not hold up shutdown; dropping it kills the judge process
        let outcome = tokio::select! {
            biased;
            outcome = self.dispatch(&action) => outcome,
            _ = self.shutdown.cancelled() => {
                ActionOutcome::failed(&action, "Session closed before the action finished")
            }
        };

        if !outcome.ok {
            warn!("{} action failed: {}", action.kind, outcome.message);
        }

        let event = outcome.clone();
        self.ui.mutate(move |_| UiEvent::ActionResult(event));
        if let Some(reply) = action.reply.take() {
            let _ = reply.send(outcome.clone());
        }

        if outcome.ok && action.kind == ActionKind::Accept {
            info!("Plan accepted, shutting down");
            self.shutdown.cancel();
        }
        outcome
    }

    async fn dispatch(&self, action: &Action) -> ActionOutcome {
        match action.kind {
            ActionKind::Save => self.save(action),
            ActionKind::Accept => self.accept(action),
            ActionKind::Refine => self.refine(action).await,
            ActionKind::Keepalive => self.keepalive(action),
        }
    }

    /// Accept and refine act on the final plan, which only exists once the run completes
    fn require_complete(&self, action: &Action) -> Option<ActionOutcome> {
        let phase = self.ui.snapshot().phase;
        (phase != Phase::Complete).then(|| {
            ActionOutcome::failed(
                action,
                format!("Cannot {} while the run is {}", action.kind, phase),
            )
        })
    }

    /// Payload `finalPlan` wins over the plan currently shown
    fn plan_text(&self, action: &Action) -> String {
        match action.text_field("finalPlan").filter(|t| !t.trim().is_empty()) {
            Some(text) => text.to_string(),
            None => self.ui.snapshot().final_plan,
        }
    }

    fn save(&self, action: &Action) -> ActionOutcome {
        let text = self.plan_text(action);
        if text.trim().is_empty() {
            return ActionOutcome::failed(action, "No final plan to save");
        }
        match self.store.save_snapshot(&text) {
            Ok(path) => ActionOutcome::ok(action, "Snapshot saved").with_path(&path),
            Err(e) => ActionOutcome::failed(action, e.to_string()),
        }
    }

    fn accept(&self, action: &Action) -> ActionOutcome {
        if let Some(rejected) = self.require_complete(action) {
            return rejected;
        }
        let text = self.plan_text(action);
        if text.trim().is_empty() {
            return ActionOutcome::failed(action, "No final plan to accept");
        }
        match self.store.write_accepted(&text) {
            Ok(path) => {
                if self.ui.snapshot().final_plan != text {
                    self.ui.set_final_plan(&text);
                }
                ActionOutcome::ok(action, "Plan accepted").with_path(&path)
            }
            Err(e) => ActionOutcome::failed(action, e.to_string()),
        }
    }

    async fn refine(&self, action: &Action) -> ActionOutcome {
        let Some(judge) = &self.judge else {
            return ActionOutcome::failed(action, "Refinement needs a configured judge agent");
        };
        if let Some(rejected) = self.require_complete(action) {
            return rejected;
        }

        let state = self.ui.snapshot();
        let current = self.plan_text(action);
        let note = ["note", "feedback", "instructions"]
            .iter()
            .find_map(|key| action.text_field(key))
            .unwrap_or("");

        match judge.refine(&state.task_brief, &current, note).await {
            Ok(text) => match self.store.write_final_plan(&text) {
                Ok(path) => {
                    self.ui.set_final_plan(&text);
                    ActionOutcome::ok(action, "Final plan refined").with_path(&path)
                }
                Err(e) => ActionOutcome::failed(action, e.to_string()),
            },
            Err(e) => ActionOutcome::failed(action, e.to_string()),
        }
    }

    fn keepalive(&self, action: &Action) -> ActionOutcome {
        let requested = action.payload.get("keepOpen").and_then(Value::as_bool);
        let ttl = chrono::Duration::from_std(self.session_ttl).unwrap_or(chrono::Duration::zero());
        let mut keep_open = false;

        self.ui.mutate(|state| {
            state.keep_open = requested.unwrap_or(!state.keep_open);
            keep_open = state.keep_open;
            // Releasing the session never expires it on the spot
            if !state.keep_open {
                let now = Utc::now();
                if let Some(deadline) = state.ui_deadline {
                    if deadline <= now {
                        state.ui_deadline = Some(now + ttl);
                    }
                }
            }
            UiEvent::SessionUpdate(state.session_info(false))
        });

        let message = if keep_open {
            "Session kept open"
        } else {
            "Session timer resumed"
        };
        ActionOutcome::ok(action, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Templates;
    use crate::council::testing::{command_agent, valid_plan, Reply, ScriptedInvoker};
    use crate::ui::state::UiState;
    use chrono::NaiveDate;
    use serde_json::json;

    fn setup() -> (tempfile::TempDir, ActionWorker, UiHandle, CancellationToken) {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(
            RunStore::create(
                root.path(),
                Some("r"),
                "",
                NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            )
            .unwrap(),
        );
        let ui = UiHandle::new(UiState::new("r", "brief", &[], "judge"));
        ui.set_phase(Phase::Complete);
        let token = CancellationToken::new();
        let worker = ActionWorker::new(
            ui.clone(),
            store,
            None,
            token.clone(),
            Duration::from_secs(60),
        );
        (root, worker, ui, token)
    }

    fn worker_with_judge(
        invoker: Arc<ScriptedInvoker>,
    ) -> (tempfile::TempDir, ActionWorker, UiHandle, CancellationToken) {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(
            RunStore::create(
                root.path(),
                Some("r"),
                "",
                NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            )
            .unwrap(),
        );
        let ui = UiHandle::new(UiState::new("r", "brief", &[], "arbiter"));
        let judge = JudgeOrchestrator::new(
            command_agent("arbiter"),
            invoker,
            store.clone(),
            ui.clone(),
            Arc::new(Templates::default()),
            Duration::from_secs(60),
            0,
        );
        let token = CancellationToken::new();
        let worker = ActionWorker::new(
            ui.clone(),
            store,
            Some(Arc::new(judge)),
            token.clone(),
            Duration::from_secs(60),
        );
        (root, worker, ui, token)
    }

    #[test]
    fn test_action_kind_from_path() {
        assert_eq!("/save".parse::<ActionKind>(), Ok(ActionKind::Save));
        assert_eq!("keep-alive".parse::<ActionKind>(), Ok(ActionKind::Keepalive));
        assert!("delete".parse::<ActionKind>().is_err());
    }

    #[tokio::test]
    async fn test_save_without_plan_fails() {
        let (_root, worker, _ui, _token) = setup();
        let outcome = worker
            .handle(Action::new(ActionKind::Save, Value::Null))
            .await;
        assert!(!outcome.ok);
    }

    #[tokio::test]
    async fn test_save_writes_numbered_snapshots() {
        let (root, worker, ui, _token) = setup();
        ui.set_final_plan("# Plan\nv1");

        let first = worker
            .handle(Action::new(ActionKind::Save, Value::Null))
            .await;
        let second = worker
            .handle(Action::new(ActionKind::Save, json!({"finalPlan": "edited"})))
            .await;

        assert!(first.ok && second.ok);
        let dir = root.path().join("r");
        assert_eq!(
            std::fs::read_to_string(dir.join("final-plan-1.md")).unwrap(),
            "# Plan\nv1"
        );
        assert_eq!(
            std::fs::read_to_string(dir.join("final-plan-2.md")).unwrap(),
            "edited"
        );
    }

    #[tokio::test]
    async fn test_accept_persists_and_cancels() {
        let (root, worker, ui, token) = setup();
        ui.set_final_plan("# Plan\nfinal");
        let mut rx = ui.subscribe();

        let outcome = worker
            .handle(Action::new(ActionKind::Accept, Value::Null))
            .await;

        assert!(outcome.ok);
        assert!(token.is_cancelled());
        let dir = root.path().join("r");
        assert!(dir.join("final-plan-accepted.md").exists());
        assert_eq!(
            std::fs::read_to_string(dir.join("final-plan.md")).unwrap(),
            "# Plan\nfinal"
        );
        assert!(matches!(rx.try_recv().unwrap(), UiEvent::ActionResult(o) if o.ok));
    }

    #[tokio::test]
    async fn test_refine_without_judge_fails() {
        let (_root, worker, ui, token) = setup();
        ui.set_final_plan("# Plan");
        let outcome = worker
            .handle(Action::new(ActionKind::Refine, json!({"note": "shorter"})))
            .await;
        assert!(!outcome.ok);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_keepalive_toggles_and_extends_lapsed_deadline() {
        let (_root, worker, ui, _token) = setup();
        ui.set_deadline(Some(Utc::now() - chrono::Duration::seconds(5)));

        worker
            .handle(Action::new(ActionKind::Keepalive, Value::Null))
            .await;
        assert!(ui.snapshot().keep_open);

        worker
            .handle(Action::new(ActionKind::Keepalive, json!({"keepOpen": false})))
            .await;
        let state = ui.snapshot();
        assert!(!state.keep_open);
        assert!(state.ui_deadline.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_queue_processes_in_order() {
        let (_root, worker, ui, token) = setup();
        ui.set_final_plan("# Plan");
        let (queue, rx) = ActionQueue::channel();
        let handle = tokio::spawn(worker.run(rx));

        let first = queue.submit(ActionKind::Save, Value::Null).unwrap();
        let second = queue.submit(ActionKind::Save, Value::Null).unwrap();
        let first = first.await.unwrap();
        let second = second.await.unwrap();

        assert!(first.path.unwrap().ends_with("final-plan-1.md"));
        assert!(second.path.unwrap().ends_with("final-plan-2.md"));

        token.cancel();
        handle.await.unwrap();
        assert!(matches!(
            queue.submit(ActionKind::Save, Value::Null),
            Err(UiError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_accept_and_refine_wait_for_completed_run() {
        let invoker = Arc::new(
            ScriptedInvoker::new().reply("arbiter", vec![Reply::Text(valid_plan("refined"))]),
        );
        let (root, worker, ui, token) = worker_with_judge(invoker.clone());
        ui.set_phase(Phase::Planning);
        ui.set_final_plan("# Plan\nearly");

        let accept = worker
            .handle(Action::new(ActionKind::Accept, Value::Null))
            .await;
        let refine = worker
            .handle(Action::new(ActionKind::Refine, json!({"note": "tighter"})))
            .await;

        assert!(!accept.ok);
        assert!(accept.message.contains("planning"));
        assert!(!refine.ok);
        assert_eq!(invoker.calls_for("arbiter"), 0);
        assert!(!token.is_cancelled());
        assert!(!root.path().join("r").join("final-plan-accepted.md").exists());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_refine() {
        let invoker = Arc::new(ScriptedInvoker::new().reply("arbiter", vec![Reply::Hang]));
        let (_root, worker, ui, token) = worker_with_judge(invoker.clone());
        ui.set_phase(Phase::Complete);
        ui.set_final_plan(&valid_plan("current"));
        let (queue, rx) = ActionQueue::channel();
        let handle = tokio::spawn(worker.run(rx));

        let reply = queue
            .submit(ActionKind::Refine, json!({"note": "more detail"}))
            .unwrap();
        while invoker.calls_for("arbiter") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker kept running after cancel")
            .unwrap();
        let outcome = reply.await.unwrap();
        assert!(!outcome.ok);
        assert!(outcome.message.contains("Session closed"));
    }
}
