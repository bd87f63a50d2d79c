// ============================
// coop-backend-lib/src/ws_router.rs
// ============================
//! HTTP router and WebSocket connection handling.
use crate::error::AppError;
use crate::handlers::{self, leaderboard, rooms, QueryParams};
use crate::metrics::WS_ACTIVE;
use crate::websocket::{Flow, WebSocketHandler};
use crate::AppState;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, State,
    },
    http::{header, HeaderValue, Method},
    response::Response,
    routing::{any, get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::gauge;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{debug, warn};

/// How long a closing connection may spend flushing queued frames
const SEND_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/rooms/create", post(rooms::create_room))
        .route("/api/rooms/join", post(rooms::join_room))
        .route("/api/rooms/ready", post(rooms::set_ready))
        .route("/api/rooms/state", get(rooms::room_state))
        .route("/api/rooms/heartbeat", post(rooms::heartbeat))
        .route("/api/rooms/fail", post(rooms::fail_room))
        .route("/api/rooms/leave", post(rooms::leave_room))
        .route("/api/register", post(leaderboard::register))
        .route("/api/score", post(leaderboard::submit_score))
        .route("/api/rankings", get(leaderboard::rankings))
        .route("/api", any(handlers::api_not_found))
        .route("/api/{*rest}", any(handlers::api_not_found))
        .route("/ws", get(ws_handler))
        .method_not_allowed_fallback(handlers::api_not_found);

    if let Some(dir) = &state.settings.static_dir {
        router = router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    let mut router = router
        .layer(DefaultBodyLimit::max(state.settings.max_body_bytes))
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer(&state.settings.allowed_origins) {
        router = router.layer(cors);
    }
    router.with_state(state)
}

/// CORS for the configured origins; `None` when the list is empty.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(86_400));
    if origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            },
        })
        .collect();
    Some(layer.allow_origin(AllowOrigin::list(allowed)))
}

/// Optional credentials on the upgrade request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsAuthQuery {
    pub player_id: Option<String>,
    pub room_code: Option<String>,
}

/// Handler for WebSocket connections. A plain GET without the upgrade
/// handshake is an `INVALID_REQUEST`.
pub async fn ws_handler(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<WsAuthQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let ws = ws.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, query)))
}

async fn handle_connection(socket: WebSocket, state: AppState, query: WsAuthQuery) {
    gauge!(WS_ACTIVE).increment(1.0);
    let (mut sink, mut stream) = socket.split();

    // Forward queued frames to the socket; a close frame ends the task.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let mut handler = WebSocketHandler::new(state, tx);
    let mut flow = Flow::Continue;
    if query.player_id.is_some() || query.room_code.is_some() {
        flow = handler.authenticate(
            query.player_id.as_deref().unwrap_or_default(),
            query.room_code.as_deref().unwrap_or_default(),
        );
    }

    while flow == Flow::Continue {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => flow = handler.handle_text(text.as_str()),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {},
            Some(Err(err)) => {
                debug!(error = %err, "websocket read failed");
                break;
            },
        }
    }

    // Dropping the handler releases the binding and the last sender the
    // relay does not own, which lets the send task drain and exit.
    drop(handler);
    if tokio::time::timeout(SEND_DRAIN_TIMEOUT, &mut send_task).await.is_err() {
        send_task.abort();
    }
    gauge!(WS_ACTIVE).decrement(1.0);
}
