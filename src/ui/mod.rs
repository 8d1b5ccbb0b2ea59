//! Live UI: shared state, event broadcast, action queue and the HTTP server.

pub mod actions;
pub mod events;
pub mod server;
pub mod state;
pub mod timer;

pub use actions::{Action, ActionKind, ActionOutcome, ActionQueue, ActionWorker};
pub use events::{SessionInfo, UiEvent};
pub use server::AppState;
pub use state::{AgentEntry, AgentStatus, Phase, UiHandle, UiState};

use crate::council::judge::JudgeOrchestrator;
use crate::error::UiError;
use crate::store::RunStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Where the UI listens and how long it stays up.
#[derive(Debug, Clone)]
pub struct UiOptions {
    pub bind: String,
    pub port: u16,
    /// Grace period after the run completes before the server shuts down
    pub keep_alive: Duration,
    /// Session lifetime for a resumed UI, and the extension granted when keep-open is released
    pub session_ttl: Duration,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            bind: crate::config::default_ui_bind(),
            port: crate::config::default_ui_port(),
            keep_alive: Duration::from_secs(crate::config::default_keep_alive_sec()),
            session_ttl: Duration::from_secs(crate::config::default_session_ttl_sec()),
        }
    }
}

/// Background tasks serving one UI session.
pub struct UiService {
    pub addr: SocketAddr,
    handles: Vec<JoinHandle<()>>,
}

impl UiService {
    /// Bind the server and start the action worker and session timer.
    pub async fn start(
        ui: UiHandle,
        store: Arc<RunStore>,
        judge: Option<Arc<JudgeOrchestrator>>,
        shutdown: CancellationToken,
        options: &UiOptions,
    ) -> Result<Self, UiError> {
        let listener = server::bind(&options.bind, options.port).await?;
        let addr = listener
            .local_addr()
            .map_err(|e| UiError::Bind {
                addr: format!("{}:{}", options.bind, options.port),
                source: e,
            })?;

        let (actions, rx) = ActionQueue::channel();
        let worker = ActionWorker::new(
            ui.clone(),
            store,
            judge,
            shutdown.clone(),
            options.session_ttl,
        );

        let mut handles = vec![
            tokio::spawn(worker.run(rx)),
            timer::spawn_session_timer(ui.clone(), shutdown.clone()),
        ];

        let state = AppState {
            ui,
            actions,
            shutdown: shutdown.clone(),
        };
        handles.push(tokio::spawn(async move {
            if let Err(e) = server::serve(listener, state).await {
                warn!("{}", e);
                shutdown.cancel();
            }
        }));

        Ok(Self { addr, handles })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait for every task to finish (they all stop on session cancellation)
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("UI task failed: {}", e);
            }
        }
    }
}

/// Persist `ui-state.json` after every broadcast until the session ends.
pub fn spawn_snapshot_writer(
    ui: UiHandle,
    store: Arc<RunStore>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = ui.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Coalesce bursts into one write
                        while rx.try_recv().is_ok() {}
                        if let Err(e) = store.write_ui_state(&ui.snapshot()) {
                            warn!("Failed to persist UI state: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("Snapshot writer stopped");
    })
}
