use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ws::WebSocket, Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chat_api::{ChatContext, ChatReply};
use serde::Deserialize;
use shared::{
    domain::{Participant, ParticipantId, ScopeId},
    error::ApiError,
    protocol::{Notification, QueueListing, TurnSnapshot},
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use turns::{TimerService, TurnCoordinator};

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

const MAX_LABEL_BYTES: usize = 128;

#[derive(Debug, Deserialize)]
struct JoinRequest {
    participant_id: i64,
    display_label: String,
}

#[derive(Debug, Deserialize)]
struct StopRequest {
    participant_id: i64,
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    participant_id: i64,
    display_label: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    scope_id: Option<i64>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings()?;
    let (events, _) = broadcast::channel(settings.event_buffer);
    let coordinator = TurnCoordinator::new(
        settings.coordinator_config(),
        TimerService::current()?,
        events.clone(),
    );
    info!(
        turn_duration_seconds = settings.turn_duration_seconds,
        remove_enabled = settings.remove_enabled,
        "turn coordinator ready"
    );

    let state = AppState {
        chat: ChatContext::new(coordinator),
        events,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/scopes/:scope_id/join", post(http_join))
        .route("/scopes/:scope_id/stop", post(http_stop))
        .route("/scopes/:scope_id/queue", get(http_list_queue))
        .route("/scopes/:scope_id/queue/:position", delete(http_remove_at))
        .route("/scopes/:scope_id/turn", get(http_current_turn))
        .route("/scopes/:scope_id/messages", post(http_message))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn participant(id: i64, label: &str) -> Result<Participant, (StatusCode, Json<ApiError>)> {
    let label = label.trim();
    if label.is_empty() {
        return Err(bad_request(ApiError::validation("display label cannot be empty")));
    }
    if label.len() > MAX_LABEL_BYTES {
        return Err(bad_request(ApiError::validation("display label is too long")));
    }
    Ok(Participant::new(ParticipantId(id), label))
}

fn bad_request(error: ApiError) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(error))
}

async fn http_join(
    State(state): State<Arc<AppState>>,
    Path(scope_id): Path<i64>,
    Json(req): Json<JoinRequest>,
) -> ApiResult<Vec<Notification>> {
    let participant = participant(req.participant_id, &req.display_label)?;
    Ok(Json(
        state.chat.coordinator.join(ScopeId(scope_id), participant),
    ))
}

async fn http_stop(
    State(state): State<Arc<AppState>>,
    Path(scope_id): Path<i64>,
    Json(req): Json<StopRequest>,
) -> ApiResult<Vec<Notification>> {
    Ok(Json(state.chat.coordinator.stop(
        ScopeId(scope_id),
        ParticipantId(req.participant_id),
    )))
}

async fn http_remove_at(
    State(state): State<Arc<AppState>>,
    Path((scope_id, position)): Path<(i64, String)>,
) -> ApiResult<Vec<Notification>> {
    // Parsed here so a bad segment gets an `ApiError` body, not axum's
    // plain-text rejection.
    let position = position.parse::<usize>().map_err(|_| {
        bad_request(ApiError::validation(
            "queue position must be a non-negative number",
        ))
    })?;
    Ok(Json(
        state.chat.coordinator.remove_at(ScopeId(scope_id), position),
    ))
}

async fn http_list_queue(
    State(state): State<Arc<AppState>>,
    Path(scope_id): Path<i64>,
) -> Json<QueueListing> {
    Json(state.chat.coordinator.list_queue(ScopeId(scope_id)))
}

async fn http_current_turn(
    State(state): State<Arc<AppState>>,
    Path(scope_id): Path<i64>,
) -> Json<Option<TurnSnapshot>> {
    Json(state.chat.coordinator.current_turn(ScopeId(scope_id)))
}

async fn http_message(
    State(state): State<Arc<AppState>>,
    Path(scope_id): Path<i64>,
    Json(req): Json<MessageRequest>,
) -> ApiResult<ChatReply> {
    let sender = participant(req.participant_id, &req.display_label)?;
    let reply = state
        .chat
        .handle_message(ScopeId(scope_id), sender, &req.text)
        .map_err(|e| bad_request(e.into()))?;
    Ok(Json(reply))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket, q.scope_id.map(ScopeId)))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, scope: Option<ScopeId>) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged; dropping notifications");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if scope.is_some_and(|scope| scope != event.scope_id) {
                continue;
            }
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
