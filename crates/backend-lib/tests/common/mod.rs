//! Shared setup for the integration tests.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use backend_lib::{clock::ManualClock, config::Settings, storage::FlatFileStorage, ws_router, AppState};
use futures_util::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const START: i64 = 1_700_000_000_000;

pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub router: Router,
    _temp_dir: TempDir,
}

pub fn test_settings() -> Settings {
    Settings {
        require_registration: false,
        ..Settings::default()
    }
}

pub fn setup_app(settings: Settings) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let storage = FlatFileStorage::new(temp_dir.path()).unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let state = AppState::with_clock(settings, storage, clock.clone());
    let router = ws_router::create_router(state.clone());
    TestApp {
        state,
        clock,
        router,
        _temp_dir: temp_dir,
    }
}

impl TestApp {
    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_raw(uri, body.to_string()).await
    }

    pub async fn post_raw(&self, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

/// Serve the app on an ephemeral port.
pub async fn setup_server(settings: Settings) -> (SocketAddr, TestApp) {
    let app = setup_app(settings);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, app)
}

pub async fn connect(addr: SocketAddr, query: &str) -> WsStream {
    let url = format!("ws://{addr}/ws{query}");
    let (stream, _) = tokio_tungstenite::connect_async(url).await.expect("Failed to connect");
    stream
}

/// Next frame within `secs`, panicking with `context` on timeout.
pub async fn next_message_with_timeout(ws: &mut WsStream, secs: u64, context: &str) -> Message {
    match tokio::time::timeout(Duration::from_secs(secs), ws.next()).await {
        Ok(Some(Ok(message))) => message,
        Ok(other) => panic!("{context}: stream ended: {other:?}"),
        Err(_) => panic!("{context}: timed out"),
    }
}

pub async fn next_json(ws: &mut WsStream, context: &str) -> Value {
    let message = next_message_with_timeout(ws, 5, context).await;
    serde_json::from_str(message.to_text().unwrap()).unwrap()
}
