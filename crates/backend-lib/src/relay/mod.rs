// ============================
// coop-backend-lib/src/relay/mod.rs
// ============================
//! Push side of the snapshot relay: which sockets belong to which player,
//! and fan-out of personalised room snapshots to them.
//!
//! Every socket is represented by the sending half of its outbound channel;
//! the connection task owns the other half and the WebSocket sink. Sends
//! never block and never fail the caller, so the relay can be driven while a
//! room lock is held.
use crate::room::Room;
use axum::extract::ws::{Message, Utf8Bytes};
use coop_common::{Millis, ServerMessage};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub type SocketId = Uuid;
pub type SocketSender = mpsc::UnboundedSender<Message>;

/// One authenticated socket
#[derive(Debug, Clone)]
struct Subscription {
    id: SocketId,
    room_code: String,
    tx: SocketSender,
}

/// Index of authenticated sockets, keyed by player id
#[derive(Debug, Default)]
pub struct SnapshotRelay {
    subscriptions: DashMap<String, Vec<Subscription>>,
}

/// Serialize and queue one message on a socket. Returns whether the socket
/// was still there to take it.
pub fn send_message(tx: &SocketSender, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => tx.send(Message::Text(text.into())).is_ok(),
        Err(err) => {
            warn!(error = %err, "failed to serialize server message");
            false
        },
    }
}

impl SnapshotRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a socket to `player_id` in `room_code`.
    pub fn bind(&self, player_id: &str, room_code: &str, tx: SocketSender) -> SocketId {
        let id = Uuid::new_v4();
        self.subscriptions
            .entry(player_id.to_string())
            .or_default()
            .push(Subscription {
                id,
                room_code: room_code.to_string(),
                tx,
            });
        debug!(player = player_id, room = room_code, socket = %id, "socket bound");
        id
    }

    /// Detach one socket. Returns whether it was bound.
    pub fn unbind(&self, player_id: &str, socket_id: SocketId) -> bool {
        let mut removed = false;
        if let Some(mut subs) = self.subscriptions.get_mut(player_id) {
            let before = subs.len();
            subs.retain(|s| s.id != socket_id);
            removed = subs.len() != before;
        }
        self.subscriptions.remove_if(player_id, |_, subs| subs.is_empty());
        removed
    }

    /// Number of sockets bound for `player_id`, across all rooms.
    pub fn socket_count(&self, player_id: &str) -> usize {
        self.subscriptions.get(player_id).map_or(0, |subs| subs.len())
    }

    pub fn total_sockets(&self) -> usize {
        self.subscriptions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Push `room` to every socket bound to it. The snapshot is built and
    /// serialized once per player and shared by that player's sockets.
    /// Returns the number of sockets that took the message.
    pub fn broadcast(&self, room: &Room, reason: &str, now: Millis, offline_timeout_ms: Millis) -> usize {
        let mut delivered = 0;
        for player in &room.players {
            let Some(mut subs) = self.subscriptions.get_mut(&player.player_id) else {
                continue;
            };
            subs.retain(|s| !s.tx.is_closed());
            if !subs.iter().any(|s| s.room_code == room.code) {
                continue;
            }
            let message = ServerMessage::Room {
                reason: reason.to_string(),
                at: now,
                room: room.snapshot(Some(&player.player_id), now, offline_timeout_ms),
            };
            let text: Utf8Bytes = match serde_json::to_string(&message) {
                Ok(text) => text.into(),
                Err(err) => {
                    warn!(room = %room.code, player = %player.player_id, error = %err, "failed to serialize snapshot");
                    continue;
                },
            };
            for sub in subs.iter().filter(|s| s.room_code == room.code) {
                if sub.tx.send(Message::Text(text.clone())).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Send `closed` to every socket `player_id` has bound to `room_code`
    /// and drop those bindings.
    pub fn close_player(&self, player_id: &str, room_code: &str, reason: &str, now: Millis) -> usize {
        let mut closed = 0;
        if let Some(mut subs) = self.subscriptions.get_mut(player_id) {
            let message = ServerMessage::Closed {
                reason: reason.to_string(),
                at: now,
                room_code: room_code.to_string(),
            };
            subs.retain(|s| {
                if s.room_code != room_code {
                    return true;
                }
                if send_message(&s.tx, &message) {
                    closed += 1;
                }
                false
            });
        }
        self.subscriptions.remove_if(player_id, |_, subs| subs.is_empty());
        closed
    }

    /// Send `closed` to every socket bound to `room`.
    pub fn close_room(&self, room: &Room, reason: &str, now: Millis) -> usize {
        room.players
            .iter()
            .map(|p| self.close_player(&p.player_id, &room.code, reason, now))
            .sum()
    }
}
