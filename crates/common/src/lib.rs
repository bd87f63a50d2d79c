// ================
// common/src/lib.rs
// ================
//! Wire types shared by the co-op room server and its clients.
//!
//! Everything here is plain data: the room snapshot pushed over HTTP and
//! WebSocket, the sanitized entity records a room stores, the WebSocket
//! message envelopes and the leaderboard rows. All field names are camelCase
//! on the wire because the browser client is written against that shape.

use serde::{Deserialize, Serialize};

/// Maximum number of players a room can hold.
pub const MAX_PLAYERS: usize = 2;

/// Wall-clock milliseconds since the Unix epoch.
pub type Millis = i64;

/// Lifecycle state of a room
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Starting,
    Started,
    Failed,
}

impl RoomStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Starting => "starting",
            RoomStatus::Started => "started",
            RoomStatus::Failed => "failed",
        }
    }
}

/// A structure owned by one player, as reported in its heartbeat or the
/// host's world snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildingRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub c: i64,
    pub r: i64,
    pub w: i64,
    pub h: i64,
    pub level: i64,
    pub hp: f64,
    pub max_hp: f64,
    pub is_main_command: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnitRecord {
    pub id: u64,
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub hp: f64,
    pub max_hp: f64,
    pub level: i64,
    pub facing: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnemyRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub hp: f64,
    pub max_hp: f64,
    pub r: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileRecord {
    pub team: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    pub life: f64,
    pub color: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MineralRecord {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub total: f64,
    pub radius: f64,
}

/// Summary of the host's simulation phase.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
    pub phase: String,
    pub wave: i64,
    pub time_sec: f64,
    pub phase_time_left: f64,
    pub kills: i64,
    pub command_hp: f64,
    pub command_max_hp: f64,
}

/// Authoritative shared world, only ever written by the slot-0 player.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub state: WorldState,
    pub buildings: Vec<BuildingRecord>,
    pub enemies: Vec<EnemyRecord>,
    pub units: Vec<UnitRecord>,
    pub minerals: Vec<MineralRecord>,
    pub projectiles: Vec<ProjectileRecord>,
    pub source_player_id: String,
    pub source_slot: u8,
    pub updated_at: Millis,
}

/// One player as seen inside a room snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub player_id: String,
    pub slot: u8,
    pub ready: bool,
    pub online: bool,
    pub has_heartbeat: bool,
    pub last_seen_at: Millis,
    /// `None` until the player has reported it
    pub command_hp: Option<f64>,
    pub wave: i64,
    pub phase: String,
    pub reward_chosen: bool,
    pub resources: f64,
    pub total_minerals_earned: f64,
    pub population_used: i64,
    pub population_limit: i64,
    pub x: f64,
    pub y: f64,
    pub facing: f64,
    pub buildings: Vec<BuildingRecord>,
    pub units: Vec<UnitRecord>,
}

/// Room state personalised for one viewer (`you`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_code: String,
    pub status: RoomStatus,
    pub start_at: Millis,
    pub seed: u32,
    pub max_players: usize,
    pub fail_reason: Option<String>,
    pub failed_by: Option<String>,
    pub players: Vec<PlayerView>,
    pub world: Option<WorldSnapshot>,
    pub you: Option<PlayerView>,
}

/// Messages sent from client to server over the WebSocket
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Bind this socket to a player inside a room
    Auth {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "roomCode")]
        room_code: String,
    },
    /// Keep-alive probe, answered with `Pong`
    Ping {},
}

/// Messages sent from server to client over the WebSocket
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Fresh room snapshot after a change
    Room {
        reason: String,
        at: Millis,
        room: RoomSnapshot,
    },
    /// Error report; `WS_AUTH_FAILED` is followed by a close frame
    Error { code: String, message: String },
    Pong { at: Millis },
    /// The binding to this room is gone
    Closed {
        reason: String,
        at: Millis,
        #[serde(rename = "roomCode")]
        room_code: String,
    },
}

/// `{ok:true, room}` returned by every room endpoint except leave
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoomEnvelope {
    pub ok: bool,
    pub room: RoomSnapshot,
}

/// `{ok:false, error, code}` returned by every failing endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: String,
    pub code: String,
}

/// Best score of one registered player.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub player_id: String,
    pub time_sec: u64,
    pub wave: u64,
    pub kills: u64,
    pub minerals: u64,
    pub updated_at: Millis,
}

impl ScoreRecord {
    /// Ranking order: wave, kills, minerals, then survival time, all
    /// descending. `Ordering::Less` means `self` ranks higher.
    pub fn rank_cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .wave
            .cmp(&self.wave)
            .then(other.kills.cmp(&self.kills))
            .then(other.minerals.cmp(&self.minerals))
            .then(other.time_sec.cmp(&self.time_sec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_tags() {
        let auth: ClientMessage =
            serde_json::from_str(r#"{"type":"auth","playerId":"alice","roomCode":"ABCD"}"#)
                .unwrap();
        assert_eq!(
            auth,
            ClientMessage::Auth {
                player_id: "alice".to_string(),
                room_code: "ABCD".to_string(),
            }
        );

        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping","t":12}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping {});
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::Closed {
            reason: "empty".to_string(),
            at: 5,
            room_code: "ABCD".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "closed");
        assert_eq!(json["roomCode"], "ABCD");

        let err = serde_json::to_value(ServerMessage::Error {
            code: "WS_AUTH_FAILED".to_string(),
            message: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(err["type"], "error");
        assert_eq!(err["code"], "WS_AUTH_FAILED");
    }

    #[test]
    fn test_rank_order() {
        let row = |wave, kills, minerals, time_sec| ScoreRecord {
            player_id: "p".to_string(),
            time_sec,
            wave,
            kills,
            minerals,
            updated_at: 0,
        };
        let mut rows = vec![row(3, 10, 5, 50), row(5, 1, 1, 1), row(3, 10, 5, 90), row(3, 12, 0, 0)];
        rows.sort_by(ScoreRecord::rank_cmp);
        assert_eq!(rows[0].wave, 5);
        assert_eq!(rows[1].kills, 12);
        assert_eq!(rows[2].time_sec, 90);
        assert_eq!(rows[3].time_sec, 50);
    }
}
