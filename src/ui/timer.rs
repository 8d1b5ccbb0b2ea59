//! Session lifetime: expires the UI once its deadline passes unless kept open.

use super::events::UiEvent;
use super::state::UiHandle;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const TICK: Duration = Duration::from_secs(1);

pub fn spawn_session_timer(ui: UiHandle, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    if expire_if_due(&ui, Utc::now()) {
                        info!("UI session expired");
                        shutdown.cancel();
                        break;
                    }
                }
            }
        }
    })
}

/// Broadcast expiry and return true once `now` is past an active deadline
pub fn expire_if_due(ui: &UiHandle, now: DateTime<Utc>) -> bool {
    ui.try_mutate(|state| {
        let due = !state.keep_open && state.ui_deadline.is_some_and(|deadline| now >= deadline);
        due.then(|| UiEvent::SessionUpdate(state.session_info(true)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::state::UiState;

    fn handle() -> UiHandle {
        UiHandle::new(UiState::new("r", "", &[], "judge"))
    }

    #[test]
    fn test_no_deadline_never_expires() {
        let ui = handle();
        assert!(!expire_if_due(&ui, Utc::now()));
    }

    #[test]
    fn test_keep_open_suspends_expiry() {
        let ui = handle();
        ui.set_deadline(Some(Utc::now() - chrono::Duration::seconds(1)));
        ui.mutate(|state| {
            state.keep_open = true;
            UiEvent::SessionUpdate(state.session_info(false))
        });
        assert!(!expire_if_due(&ui, Utc::now()));
    }

    #[test]
    fn test_past_deadline_broadcasts_expiry() {
        let ui = handle();
        let deadline = Utc::now();
        ui.set_deadline(Some(deadline));
        let mut rx = ui.subscribe();

        assert!(!expire_if_due(&ui, deadline - chrono::Duration::seconds(1)));
        assert!(expire_if_due(&ui, deadline));
        match rx.try_recv().unwrap() {
            UiEvent::SessionUpdate(info) => assert!(info.expired),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_expiry_never_races_past_keep_open() {
        for _ in 0..200 {
            let ui = handle();
            ui.set_deadline(Some(Utc::now() - chrono::Duration::seconds(1)));
            let mut rx = ui.subscribe();

            let timer_ui = ui.clone();
            let timer = std::thread::spawn(move || expire_if_due(&timer_ui, Utc::now()));
            ui.mutate(|state| {
                state.keep_open = true;
                UiEvent::SessionUpdate(state.session_info(false))
            });
            timer.join().unwrap();

            while let Ok(event) = rx.try_recv() {
                if let UiEvent::SessionUpdate(info) = event {
                    assert!(!(info.expired && info.keep_open), "expired a kept-open session");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_timer_cancels_session() {
        let ui = handle();
        ui.set_deadline(Some(Utc::now() - chrono::Duration::seconds(1)));
        let token = CancellationToken::new();

        let timer = spawn_session_timer(ui, token.clone());
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
        timer.await.unwrap();
    }
}
