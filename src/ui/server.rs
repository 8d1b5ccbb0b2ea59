//! HTTP surface of the live UI: SSE event stream, state endpoint, action routes.

use super::actions::{ActionKind, ActionOutcome, ActionQueue};
use super::events::UiEvent;
use super::state::{UiHandle, UiState};
use crate::error::UiError;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

const INDEX_HTML: &str = include_str!("../../assets/index.html");

#[derive(Clone)]
pub struct AppState {
    pub ui: UiHandle,
    pub actions: ActionQueue,
    pub shutdown: CancellationToken,
}

/// Envelope accepted by `POST /api/action`
#[derive(Debug, Deserialize)]
struct ActionRequest {
    path: String,
    #[serde(default)]
    payload: Value,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/events", get(events_handler))
        .route("/api/state", get(state_handler))
        .route("/api/action", post(action_envelope_handler))
        .route("/api/{action}", post(action_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn bind(host: &str, port: u16) -> Result<TcpListener, UiError> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| UiError::Bind { addr, source: e })
}

/// Serve until the session token is cancelled; open event streams end with it
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), UiError> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    let shutdown = state.shutdown.clone();
    if let Some(addr) = addr {
        info!("UI server listening on http://{}", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(UiError::Serve)?;

    debug!("UI server stopped");
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn state_handler(State(state): State<AppState>) -> Json<UiState> {
    Json(state.ui.snapshot())
}

/// SSE endpoint: a snapshot first, then every broadcast event.
async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before snapshotting so nothing falls between the two
    let mut rx = state.ui.subscribe();
    let snapshot = UiEvent::Snapshot(Box::new(state.ui.snapshot()));
    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        if let Some(event) = to_sse(&snapshot) {
            yield Ok(event);
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Some(event) = to_sse(&event) {
                            yield Ok(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "UI client lagged, some events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_sse(event: &UiEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.name()).data(json)),
        Err(e) => {
            warn!("Failed to serialize UI event: {}", e);
            None
        }
    }
}

async fn action_handler(
    State(state): State<AppState>,
    Path(action): Path<String>,
    body: Bytes,
) -> Response {
    let kind = match action.parse::<ActionKind>() {
        Ok(kind) => kind,
        Err(e) => return (StatusCode::NOT_FOUND, e).into_response(),
    };
    let payload = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("Invalid JSON payload: {}", e))
                    .into_response()
            }
        }
    };
    dispatch(&state, kind, payload).await
}

async fn action_envelope_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ActionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid action request: {}", e))
                .into_response()
        }
    };
    match request.path.parse::<ActionKind>() {
        Ok(kind) => dispatch(&state, kind, request.payload).await,
        Err(e) => (StatusCode::NOT_FOUND, e).into_response(),
    }
}

async fn dispatch(state: &AppState, kind: ActionKind, payload: Value) -> Response {
    let reply = match state.actions.submit(kind, payload) {
        Ok(reply) => reply,
        Err(e) => return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    };
    match reply.await {
        Ok(outcome) => outcome_response(outcome),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            UiError::QueueClosed.to_string(),
        )
            .into_response(),
    }
}

fn outcome_response(outcome: ActionOutcome) -> Response {
    let status = if outcome.ok {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(outcome)).into_response()
}
