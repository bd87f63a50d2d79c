// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! WebSocket Handler Module
//!
//! One `WebSocketHandler` lives per connection. It owns the connection's
//! binding to a (player, room) pair and turns inbound frames into registry
//! calls. Outbound traffic goes through the connection's unbounded channel,
//! which the relay also holds once the socket is authenticated.
//!
//! # Authentication
//! A socket authenticates either with `?playerId=&roomCode=` on the upgrade
//! request or with an in-band `{type:"auth"}` frame. Re-authenticating
//! replaces the previous binding. A failed attempt is answered with
//! `{type:"error", code:"WS_AUTH_FAILED"}` followed by a close frame with
//! code 1008, after which the connection is dropped.

use crate::error::AppError;
use crate::metrics::WS_AUTH_FAILED;
use crate::relay::{send_message, SocketId, SocketSender};
use crate::validation::{normalize_player_id, normalize_room_code};
use crate::AppState;
use axum::extract::ws::{CloseFrame, Message};
use coop_common::{ClientMessage, ServerMessage};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Close code sent after a failed authentication (policy violation)
pub const CLOSE_AUTH_FAILED: u16 = 1008;
const AUTH_FAILED_CODE: &str = "WS_AUTH_FAILED";
const CLOSE_REASON: &str = "auth failed";

/// What the connection loop should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    player_id: String,
    room_code: String,
    socket_id: SocketId,
}

/// WebSocket handler for one connection
pub struct WebSocketHandler {
    state: AppState,
    tx: SocketSender,
    binding: Option<Binding>,
}

impl WebSocketHandler {
    pub fn new(state: AppState, tx: SocketSender) -> Self {
        Self {
            state,
            tx,
            binding: None,
        }
    }

    /// `(player, room)` this socket is bound to, if any.
    pub fn bound_to(&self) -> Option<(&str, &str)> {
        self.binding
            .as_ref()
            .map(|b| (b.player_id.as_str(), b.room_code.as_str()))
    }

    /// Bind this socket. Any previous binding is released first, whatever the
    /// outcome.
    pub fn authenticate(&mut self, raw_player_id: &str, raw_room_code: &str) -> Flow {
        self.unregister();
        match self.try_bind(raw_player_id, raw_room_code) {
            Ok(binding) => {
                info!(player = %binding.player_id, room = %binding.room_code, socket = %binding.socket_id, "socket authenticated");
                self.binding = Some(binding);
                Flow::Continue
            },
            Err(err) => self.reject(&err.to_string()),
        }
    }

    fn try_bind(&self, raw_player_id: &str, raw_room_code: &str) -> Result<Binding, AppError> {
        let player_id = normalize_player_id(raw_player_id)?;
        let room_code = normalize_room_code(raw_room_code)?;
        let socket_id = self.state.rooms.bind_socket(&player_id, &room_code, self.tx.clone())?;
        Ok(Binding {
            player_id,
            room_code,
            socket_id,
        })
    }

    fn reject(&mut self, message: &str) -> Flow {
        counter!(WS_AUTH_FAILED).increment(1);
        warn!(reason = message, "socket authentication failed");
        send_message(
            &self.tx,
            &ServerMessage::Error {
                code: AUTH_FAILED_CODE.to_string(),
                message: message.to_string(),
            },
        );
        let _ = self.tx.send(Message::Close(Some(CloseFrame {
            code: CLOSE_AUTH_FAILED,
            reason: CLOSE_REASON.into(),
        })));
        Flow::Close
    }

    /// Handle one text frame.
    pub fn handle_text(&mut self, text: &str) -> Flow {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Auth {
                player_id,
                room_code,
            }) => self.authenticate(&player_id, &room_code),
            Ok(ClientMessage::Ping {}) => {
                self.keep_alive();
                send_message(
                    &self.tx,
                    &ServerMessage::Pong {
                        at: self.state.rooms.now(),
                    },
                );
                Flow::Continue
            },
            Err(err) if is_auth_frame(text) => {
                self.unregister();
                self.reject(&format!("malformed auth message: {err}"))
            },
            Err(err) => {
                debug!(error = %err, "unrecognised websocket frame");
                send_message(
                    &self.tx,
                    &ServerMessage::Error {
                        code: "INVALID_REQUEST".to_string(),
                        message: err.to_string(),
                    },
                );
                Flow::Continue
            },
        }
    }

    /// A ping on a bound socket counts as presence for its player.
    fn keep_alive(&self) {
        let Some(binding) = &self.binding else {
            return;
        };
        if let Err(err) = self.state.rooms.touch(&binding.player_id, &binding.room_code) {
            debug!(player = %binding.player_id, room = %binding.room_code, error = %err, "ping on a stale binding");
        }
    }

    /// Release the binding, if any.
    pub fn unregister(&mut self) {
        if let Some(binding) = self.binding.take() {
            self.state.relay.unbind(&binding.player_id, binding.socket_id);
            debug!(player = %binding.player_id, room = %binding.room_code, "socket unbound");
        }
    }
}

impl Drop for WebSocketHandler {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// A frame that claims to be an auth attempt, even if it does not parse.
fn is_auth_frame(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(Value::as_str).map(|t| t == "auth"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Settings;
    use crate::storage::FlatFileStorage;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn state() -> (AppState, TempDir) {
        let (state, _clock, dir) = state_with_clock();
        (state, dir)
    }

    fn state_with_clock() -> (AppState, Arc<ManualClock>, TempDir) {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            require_registration: false,
            ..Settings::default()
        };
        let storage = FlatFileStorage::new(dir.path()).unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let state = AppState::with_clock(settings, storage, clock.clone());
        (state, clock, dir)
    }

    fn frames(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn json(message: &Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auth_binds_and_pushes_room() {
        let (state, _dir) = state();
        state.rooms.create("alice", Some("ABCD")).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handler = WebSocketHandler::new(state.clone(), tx);

        let frame = r#"{"type":"auth","playerId":" alice ","roomCode":"abcd"}"#;
        assert_eq!(handler.handle_text(frame), Flow::Continue);
        assert_eq!(handler.bound_to(), Some(("alice", "ABCD")));
        assert_eq!(state.relay.socket_count("alice"), 1);

        let sent = frames(&mut rx);
        assert_eq!(sent.len(), 1);
        let room = json(&sent[0]);
        assert_eq!(room["type"], "room");
        assert_eq!(room["reason"], "auth");
        assert_eq!(room["room"]["you"]["playerId"], "alice");

        drop(handler);
        assert_eq!(state.relay.socket_count("alice"), 0);
    }

    #[tokio::test]
    async fn test_non_member_is_rejected_with_close() {
        let (state, _dir) = state();
        state.rooms.create("alice", Some("ABCD")).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handler = WebSocketHandler::new(state.clone(), tx);

        assert_eq!(handler.authenticate("mallory", "ABCD"), Flow::Close);
        assert!(handler.bound_to().is_none());
        let sent = frames(&mut rx);
        assert_eq!(json(&sent[0])["code"], AUTH_FAILED_CODE);
        match &sent[1] {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CLOSE_AUTH_FAILED),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reauth_replaces_binding() {
        let (state, _dir) = state();
        state.rooms.create("alice", Some("ABCD")).unwrap();
        state.rooms.create("bob", Some("WXYZ")).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut handler = WebSocketHandler::new(state.clone(), tx);

        assert_eq!(handler.authenticate("alice", "ABCD"), Flow::Continue);
        assert_eq!(handler.authenticate("bob", "WXYZ"), Flow::Continue);
        assert_eq!(state.relay.socket_count("alice"), 0);
        assert_eq!(state.relay.socket_count("bob"), 1);

        // a failed attempt drops the live binding too
        assert_eq!(handler.authenticate("bob", "ABCD"), Flow::Close);
        assert_eq!(state.relay.socket_count("bob"), 0);
    }

    #[tokio::test]
    async fn test_ping_and_garbage() {
        let (state, _dir) = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handler = WebSocketHandler::new(state, tx);

        assert_eq!(handler.handle_text(r#"{"type":"ping"}"#), Flow::Continue);
        assert_eq!(handler.handle_text("not json"), Flow::Continue);
        assert_eq!(handler.handle_text(r#"{"type":"auth","playerId":7}"#), Flow::Close);

        let sent = frames(&mut rx);
        assert_eq!(json(&sent[0])["type"], "pong");
        assert_eq!(json(&sent[0])["at"], 1_000);
        assert_eq!(json(&sent[1])["code"], "INVALID_REQUEST");
        assert_eq!(json(&sent[2])["code"], AUTH_FAILED_CODE);
    }

    #[tokio::test]
    async fn test_ping_refreshes_presence_of_bound_player() {
        let (state, clock, _dir) = state_with_clock();
        state.rooms.create("alice", Some("ABCD")).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut handler = WebSocketHandler::new(state.clone(), tx);
        assert_eq!(handler.authenticate("alice", "ABCD"), Flow::Continue);

        clock.advance(20_000);
        assert_eq!(handler.handle_text(r#"{"type":"ping"}"#), Flow::Continue);

        let room = state.rooms.get("ABCD").unwrap();
        assert_eq!(room.lock().player("alice").unwrap().last_seen_at, 21_000);
    }
}
