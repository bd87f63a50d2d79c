// ============================
// coop-backend-lib/src/room/registry.rs
// ============================
//! Live rooms and the player -> room membership index.
//!
//! Each room sits behind its own mutex, so operations on one room run one at
//! a time while different rooms proceed in parallel. Handles are cloned out
//! of the map before locking; no map guard is ever held across a room lock.
//! Broadcasts happen while the room lock is held so pushed snapshots and
//! HTTP responses leave in the same order the mutations were applied.
use super::{Room, PLAYER_DISCONNECTED};
use crate::clock::Clock;
use crate::config::RoomSettings;
use crate::error::AppError;
use crate::metrics::{fail_reason_label, ROOMS_ACTIVE, ROOMS_CLOSED, ROOMS_CREATED, ROOMS_FAILED};
use crate::relay::{send_message, SnapshotRelay, SocketId, SocketSender};
use crate::sanitize::HeartbeatPayload;
use crate::validation::generate_room_code;
use coop_common::{Millis, RoomSnapshot, RoomStatus, ServerMessage};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

pub type RoomRef = Arc<Mutex<Room>>;

/// Attempts at drawing an unused room code before giving up
const CODE_ATTEMPTS: usize = 16;

pub struct RoomRegistry {
    rooms: DashMap<String, RoomRef>,
    memberships: DashMap<String, String>,
    relay: Arc<SnapshotRelay>,
    clock: Arc<dyn Clock>,
    timings: RoomSettings,
}

impl RoomRegistry {
    pub fn new(timings: RoomSettings, clock: Arc<dyn Clock>, relay: Arc<SnapshotRelay>) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            relay,
            clock,
            timings,
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    pub fn timings(&self) -> &RoomSettings {
        &self.timings
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Code of the room `player_id` currently belongs to.
    pub fn room_of(&self, player_id: &str) -> Option<String> {
        self.memberships.get(player_id).map(|code| code.value().clone())
    }

    pub fn get(&self, room_code: &str) -> Option<RoomRef> {
        self.rooms.get(room_code).map(|entry| entry.value().clone())
    }

    /// Open a room with `player_id` as host, leaving any previous room.
    pub fn create(&self, player_id: &str, requested_code: Option<&str>) -> Result<RoomSnapshot, AppError> {
        let now = self.now();
        self.sweep_at(now);

        let handle = match requested_code {
            Some(code) => self.insert_room(code, player_id, now).ok_or(AppError::RoomCodeTaken)?,
            None => {
                let mut rng = rand::rng();
                (0..CODE_ATTEMPTS)
                    .find_map(|_| self.insert_room(&generate_room_code(&mut rng), player_id, now))
                    .ok_or(AppError::RoomCreateFailed)?
            },
        };
        counter!(ROOMS_CREATED).increment(1);
        gauge!(ROOMS_ACTIVE).set(self.len() as f64);

        let code = handle.lock().code.clone();
        self.move_membership(player_id, &code, now);

        let room = handle.lock();
        info!(room = %room.code, player = player_id, "room created");
        self.broadcast(&room, "create", now);
        Ok(self.snapshot(&room, player_id, now))
    }

    /// Add `player_id` to an open room, leaving any previous room. Joining a
    /// room one already belongs to just returns its snapshot.
    pub fn join(&self, player_id: &str, room_code: &str) -> Result<RoomSnapshot, AppError> {
        let (snapshot, now) = self.with_room(room_code, |room, now| {
            if room.is_member(player_id) {
                room.touch(player_id, now);
                return Ok((self.snapshot(room, player_id, now), now));
            }
            if room.status != RoomStatus::Waiting {
                return Err(AppError::RoomNotJoinable);
            }
            if room.is_full() {
                return Err(AppError::RoomFull);
            }
            let slot = room.add_player(player_id, now)?;
            info!(room = %room.code, player = player_id, slot, "player joined");
            self.broadcast(room, "join", now);
            Ok((self.snapshot(room, player_id, now), now))
        })?;
        self.move_membership(player_id, room_code, now);
        Ok(snapshot)
    }

    pub fn ready(&self, player_id: &str, room_code: &str, ready: bool) -> Result<RoomSnapshot, AppError> {
        self.with_room(room_code, |room, now| {
            room.require_member(player_id)?;
            if !matches!(room.status, RoomStatus::Waiting | RoomStatus::Starting) {
                return Err(AppError::RoomNotReadyable);
            }
            room.touch(player_id, now);
            room.set_ready(player_id, ready, now);
            room.reconcile_start(now, &self.timings);
            self.settle(room, now);
            self.broadcast(room, "ready", now);
            Ok(self.snapshot(room, player_id, now))
        })
    }

    /// Poll: refreshes the caller's presence and returns its view.
    pub fn state(&self, player_id: &str, room_code: &str) -> Result<RoomSnapshot, AppError> {
        self.with_room(room_code, |room, now| {
            room.require_member(player_id)?;
            room.touch(player_id, now);
            if self.settle(room, now) {
                self.broadcast(room, "state", now);
            }
            Ok(self.snapshot(room, player_id, now))
        })
    }

    /// Presence only: refreshes `lastSeenAt` without building a snapshot.
    pub fn touch(&self, player_id: &str, room_code: &str) -> Result<(), AppError> {
        self.with_room(room_code, |room, now| {
            room.require_member(player_id)?;
            room.touch(player_id, now);
            Ok(())
        })
    }

    pub fn heartbeat(
        &self,
        player_id: &str,
        room_code: &str,
        payload: HeartbeatPayload,
    ) -> Result<RoomSnapshot, AppError> {
        self.with_room(room_code, |room, now| {
            room.require_member(player_id)?;
            room.touch(player_id, now);
            if room.status != RoomStatus::Failed {
                room.apply_heartbeat(player_id, payload, now);
                self.settle(room, now);
                self.broadcast(room, "heartbeat", now);
            }
            Ok(self.snapshot(room, player_id, now))
        })
    }

    /// Client-reported loss. No effect before the room starts or once it has
    /// already failed.
    pub fn fail(&self, player_id: &str, room_code: &str, reason: &str) -> Result<RoomSnapshot, AppError> {
        self.with_room(room_code, |room, now| {
            room.require_member(player_id)?;
            room.touch(player_id, now);
            if room.fail(reason, player_id, now) {
                counter!(ROOMS_FAILED, "reason" => fail_reason_label(reason)).increment(1);
                self.broadcast(room, "fail", now);
            }
            Ok(self.snapshot(room, player_id, now))
        })
    }

    pub fn leave(&self, player_id: &str, room_code: &str) -> Result<(), AppError> {
        self.with_room(room_code, |room, now| {
            room.require_member(player_id)?;
            self.detach(room, player_id, "left", now);
            Ok(())
        })
    }

    /// Authenticate a socket: the player must belong to the room. On success
    /// the socket is bound and receives the current snapshot.
    pub fn bind_socket(&self, player_id: &str, room_code: &str, tx: SocketSender) -> Result<SocketId, AppError> {
        self.with_room(room_code, |room, now| {
            room.require_member(player_id)?;
            room.touch(player_id, now);
            let id = self.relay.bind(player_id, room_code, tx.clone());
            send_message(
                &tx,
                &ServerMessage::Room {
                    reason: "auth".to_string(),
                    at: now,
                    room: self.snapshot(room, player_id, now),
                },
            );
            Ok(id)
        })
    }

    /// Tick every room, and drop the empty and the stale ones. Returns the
    /// number of rooms removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(self.now())
    }

    fn sweep_at(&self, now: Millis) -> usize {
        let handles: Vec<RoomRef> = self.rooms.iter().map(|entry| entry.value().clone()).collect();
        let mut removed = 0;
        for handle in handles {
            let mut room = handle.lock();
            if room.closed {
                continue;
            }
            if room.players.is_empty() {
                self.retire(&mut room, "empty", now);
                removed += 1;
            } else if now - room.updated_at > self.timings.stale_room_ms {
                self.retire(&mut room, "stale", now);
                removed += 1;
            } else if self.settle(&mut room, now) {
                self.broadcast(&room, "tick", now);
            }
        }
        if removed > 0 {
            debug!(removed, remaining = self.len(), "swept rooms");
        }
        removed
    }

    /// Lock a live room, apply pending time-driven transitions, then run `f`.
    fn with_room<T>(
        &self,
        room_code: &str,
        f: impl FnOnce(&mut Room, Millis) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let handle = self.get(room_code).ok_or(AppError::RoomNotFound)?;
        let mut room = handle.lock();
        if room.closed {
            return Err(AppError::RoomNotFound);
        }
        let now = self.now();
        if self.settle(&mut room, now) {
            self.broadcast(&room, "tick", now);
        }
        f(&mut room, now)
    }

    /// Run promotion and liveness checks, counting any failure they cause.
    fn settle(&self, room: &mut Room, now: Millis) -> bool {
        let was_failed = room.status == RoomStatus::Failed;
        let changed = room.tick(now, &self.timings);
        if !was_failed && room.status == RoomStatus::Failed {
            let label = fail_reason_label(room.fail_reason.as_deref().unwrap_or_default());
            counter!(ROOMS_FAILED, "reason" => label).increment(1);
        }
        changed
    }

    /// Publish a new room under `code`, or `None` if the code is in use.
    fn insert_room(&self, code: &str, host_id: &str, now: Millis) -> Option<RoomRef> {
        match self.rooms.entry(code.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let handle = Arc::new(Mutex::new(Room::new(code, host_id, now)));
                slot.insert(handle.clone());
                Some(handle)
            },
        }
    }

    /// Point `player_id` at `room_code` and take it out of whatever room it
    /// was in before.
    fn move_membership(&self, player_id: &str, room_code: &str, now: Millis) {
        let previous = self.memberships.insert(player_id.to_string(), room_code.to_string());
        let Some(previous) = previous.filter(|code| code != room_code) else {
            return;
        };
        let Some(handle) = self.get(&previous) else {
            return;
        };
        let mut room = handle.lock();
        if !room.closed && room.is_member(player_id) {
            debug!(room = %previous, player = player_id, next = room_code, "evicting from previous room");
            self.detach(&mut room, player_id, "moved", now);
        }
    }

    /// Remove a member from a locked room and deal with the consequences.
    fn detach(&self, room: &mut Room, player_id: &str, reason: &str, now: Millis) {
        let was_started = room.status == RoomStatus::Started;
        if room.remove_player(player_id, now).is_none() {
            return;
        }
        self.relay.close_player(player_id, &room.code, reason, now);
        self.memberships.remove_if(player_id, |_, code| *code == room.code);
        info!(room = %room.code, player = player_id, reason, "player left");

        if room.players.is_empty() {
            self.retire(room, "empty", now);
            return;
        }
        if was_started {
            if room.fail(PLAYER_DISCONNECTED, player_id, now) {
                counter!(ROOMS_FAILED, "reason" => fail_reason_label(PLAYER_DISCONNECTED)).increment(1);
            }
        } else if room.status != RoomStatus::Failed {
            // the remaining player must confirm again for a solo start
            room.reset_ready();
            room.reconcile_start(now, &self.timings);
        }
        self.settle(room, now);
        self.broadcast(room, "leave", now);
    }

    /// Remove a locked room from the registry and close its sockets.
    fn retire(&self, room: &mut Room, reason: &str, now: Millis) {
        room.closed = true;
        self.relay.close_room(room, reason, now);
        self.rooms.remove(&room.code);
        for player in &room.players {
            self.memberships.remove_if(&player.player_id, |_, code| *code == room.code);
        }
        counter!(ROOMS_CLOSED).increment(1);
        gauge!(ROOMS_ACTIVE).set(self.len() as f64);
        info!(room = %room.code, reason, "room closed");
    }

    fn broadcast(&self, room: &Room, reason: &str, now: Millis) {
        let delivered = self.relay.broadcast(room, reason, now, self.timings.offline_timeout_ms);
        if delivered == 0 {
            return;
        }
        debug!(room = %room.code, reason, sockets = delivered, "snapshot pushed");
    }

    fn snapshot(&self, room: &Room, player_id: &str, now: Millis) -> RoomSnapshot {
        room.snapshot(Some(player_id), now, self.timings.offline_timeout_ms)
    }
}
