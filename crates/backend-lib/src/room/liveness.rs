//! Loss detection for started rooms.
use super::Room;
use coop_common::{Millis, RoomStatus};

pub const COMMAND_DESTROYED: &str = "command_destroyed";
pub const PLAYER_DISCONNECTED: &str = "player_disconnected";

/// A loss condition and the player who triggered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loss {
    pub reason: &'static str,
    pub player_id: String,
}

/// First loss condition met by a started room, if any. A destroyed command
/// outranks a silent player.
pub fn detect_loss(room: &Room, now: Millis, offline_timeout_ms: Millis) -> Option<Loss> {
    if room.status != RoomStatus::Started {
        return None;
    }
    let destroyed = room
        .players
        .iter()
        .find(|p| p.has_heartbeat && p.command_hp.is_some_and(|hp| hp <= 0.0))
        .map(|p| Loss {
            reason: COMMAND_DESTROYED,
            player_id: p.player_id.clone(),
        });
    destroyed.or_else(|| {
        room.players
            .iter()
            .find(|p| !p.is_online(now, offline_timeout_ms))
            .map(|p| Loss {
                reason: PLAYER_DISCONNECTED,
                player_id: p.player_id.clone(),
            })
    })
}

impl Room {
    /// Fail the room on the first loss condition. Returns whether it failed.
    pub fn check_liveness(&mut self, now: Millis, offline_timeout_ms: Millis) -> bool {
        match detect_loss(self, now, offline_timeout_ms) {
            Some(loss) => self.fail(loss.reason, &loss.player_id, now),
            None => false,
        }
    }
}
