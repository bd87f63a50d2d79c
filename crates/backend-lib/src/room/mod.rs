// ============================
// coop-backend-lib/src/room/mod.rs
// ============================
//! The room aggregate: at most two players, their last reported state and the
//! host's authoritative world.
//!
//! A `Room` is plain data plus the rules that keep it consistent. It never
//! talks to sockets or the registry; callers serialize access to it and
//! broadcast whatever it produces.

pub mod lifecycle;
pub mod liveness;
pub mod registry;

pub use liveness::{COMMAND_DESTROYED, PLAYER_DISCONNECTED};
pub use registry::{RoomRef, RoomRegistry};

use crate::error::AppError;
use crate::sanitize::HeartbeatPayload;
use coop_common::{
    BuildingRecord, Millis, PlayerView, RoomSnapshot, RoomStatus, UnitRecord, WorldSnapshot,
    MAX_PLAYERS,
};

/// Slot of the player allowed to publish the shared world.
pub const HOST_SLOT: u8 = 0;

/// A member of a room.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub player_id: String,
    pub slot: u8,
    pub ready: bool,
    pub last_seen_at: Millis,
    pub has_heartbeat: bool,
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

impl Player {
    pub fn new(player_id: impl Into<String>, slot: u8, now: Millis) -> Self {
        Self {
            player_id: player_id.into(),
            slot,
            ready: false,
            last_seen_at: now,
            has_heartbeat: false,
            command_hp: None,
            wave: 1,
            phase: String::new(),
            reward_chosen: false,
            resources: 0.0,
            total_minerals_earned: 0.0,
            population_used: 0,
            population_limit: 0,
            x: 0.0,
            y: 0.0,
            facing: 0.0,
            buildings: Vec::new(),
            units: Vec::new(),
        }
    }

    /// Seen within the offline window.
    pub fn is_online(&self, now: Millis, offline_timeout_ms: Millis) -> bool {
        now - self.last_seen_at <= offline_timeout_ms
    }

    /// Merge a sanitized heartbeat. Absent scalars keep their value, lists are
    /// replaced wholesale.
    pub fn apply_heartbeat(&mut self, hb: HeartbeatPayload) {
        fn keep<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        keep(&mut self.x, hb.x);
        keep(&mut self.y, hb.y);
        keep(&mut self.facing, hb.facing);
        if hb.command_hp.is_some() {
            self.command_hp = hb.command_hp;
        }
        keep(&mut self.wave, hb.wave);
        keep(&mut self.phase, hb.phase);
        keep(&mut self.reward_chosen, hb.reward_chosen);
        keep(&mut self.resources, hb.resources);
        keep(&mut self.total_minerals_earned, hb.total_minerals_earned);
        keep(&mut self.population_used, hb.population_used);
        keep(&mut self.population_limit, hb.population_limit);
        self.buildings = hb.buildings;
        self.units = hb.units;
        self.has_heartbeat = true;
    }

    pub fn view(&self, now: Millis, offline_timeout_ms: Millis) -> PlayerView {
        PlayerView {
            player_id: self.player_id.clone(),
            slot: self.slot,
            ready: self.ready,
            online: self.is_online(now, offline_timeout_ms),
            has_heartbeat: self.has_heartbeat,
            last_seen_at: self.last_seen_at,
            command_hp: self.command_hp,
            wave: self.wave,
            phase: self.phase.clone(),
            reward_chosen: self.reward_chosen,
            resources: self.resources,
            total_minerals_earned: self.total_minerals_earned,
            population_used: self.population_used,
            population_limit: self.population_limit,
            x: self.x,
            y: self.y,
            facing: self.facing,
            buildings: self.buildings.clone(),
            units: self.units.clone(),
        }
    }
}

/// A co-op room.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    pub status: RoomStatus,
    pub start_at: Millis,
    /// 0 until the first start is scheduled
    pub seed: u32,
    pub fail_reason: Option<String>,
    pub failed_by: Option<String>,
    /// Sorted by slot
    pub players: Vec<Player>,
    pub world: Option<WorldSnapshot>,
    pub created_at: Millis,
    pub updated_at: Millis,
    /// Set once the room has been removed from the registry. Anyone still
    /// holding a handle must treat the room as gone.
    pub(crate) closed: bool,
}

impl Room {
    /// A fresh `waiting` room with `host_id` in slot 0.
    pub fn new(code: impl Into<String>, host_id: impl Into<String>, now: Millis) -> Self {
        Self {
            code: code.into(),
            status: RoomStatus::Waiting,
            start_at: 0,
            seed: 0,
            fail_reason: None,
            failed_by: None,
            players: vec![Player::new(host_id, HOST_SLOT, now)],
            world: None,
            created_at: now,
            updated_at: now,
            closed: false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn is_member(&self, player_id: &str) -> bool {
        self.player(player_id).is_some()
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.player_id == player_id)
    }

    pub fn require_member(&self, player_id: &str) -> Result<(), AppError> {
        if self.is_member(player_id) {
            Ok(())
        } else {
            Err(AppError::RoomNotMember)
        }
    }

    /// Record activity from `player_id`.
    pub fn touch(&mut self, player_id: &str, now: Millis) {
        if let Some(player) = self.player_mut(player_id) {
            player.last_seen_at = now;
        }
        self.updated_at = now;
    }

    /// Seat a new player in the lowest free slot. Callers check capacity and
    /// status first.
    pub fn add_player(&mut self, player_id: &str, now: Millis) -> Result<u8, AppError> {
        if self.is_full() {
            return Err(AppError::RoomFull);
        }
        let slot = (0..MAX_PLAYERS as u8)
            .find(|slot| self.players.iter().all(|p| p.slot != *slot))
            .ok_or(AppError::RoomFull)?;
        self.players.push(Player::new(player_id, slot, now));
        self.players.sort_by_key(|p| p.slot);
        self.updated_at = now;
        Ok(slot)
    }

    /// Remove a player and compact the remaining one into slot 0. When the
    /// host leaves, its world goes with it.
    pub fn remove_player(&mut self, player_id: &str, now: Millis) -> Option<Player> {
        let index = self.players.iter().position(|p| p.player_id == player_id)?;
        let removed = self.players.remove(index);
        for (slot, player) in self.players.iter_mut().enumerate() {
            player.slot = slot as u8;
        }
        if removed.slot == HOST_SLOT {
            self.world = None;
        }
        self.updated_at = now;
        Some(removed)
    }

    /// Apply a heartbeat. Only the host's world is kept; a failed room
    /// accepts nothing.
    pub fn apply_heartbeat(&mut self, player_id: &str, mut hb: HeartbeatPayload, now: Millis) {
        if self.status == RoomStatus::Failed {
            return;
        }
        let Some(player) = self.player_mut(player_id) else {
            return;
        };
        let slot = player.slot;
        let world = hb.world.take();
        player.apply_heartbeat(hb);
        if slot == HOST_SLOT {
            if let Some(mut world) = world {
                world.source_player_id = player_id.to_string();
                world.source_slot = slot;
                world.updated_at = now;
                self.world = Some(world);
            }
        }
        self.updated_at = now;
    }

    /// Snapshot of the room as `viewer` sees it.
    pub fn snapshot(&self, viewer: Option<&str>, now: Millis, offline_timeout_ms: Millis) -> RoomSnapshot {
        let players: Vec<PlayerView> = self
            .players
            .iter()
            .map(|p| p.view(now, offline_timeout_ms))
            .collect();
        let you = viewer.and_then(|id| players.iter().find(|p| p.player_id == id).cloned());
        RoomSnapshot {
            room_code: self.code.clone(),
            status: self.status,
            start_at: self.start_at,
            seed: self.seed,
            max_players: MAX_PLAYERS,
            fail_reason: self.fail_reason.clone(),
            failed_by: self.failed_by.clone(),
            players,
            world: self.world.clone(),
            you,
        }
    }
}
