// ============================
// coop-backend-lib/src/room/lifecycle.rs
// ============================
//! `waiting -> starting -> started -> failed`, with `starting -> waiting` as
//! the only way back.
use super::Room;
use crate::config::RoomSettings;
use coop_common::{Millis, RoomStatus};
use rand::Rng;
use tracing::{debug, info};

/// Which start condition a room currently meets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// One player, ready
    Solo,
    /// Two players, both ready
    Duo,
}

impl StartMode {
    pub fn delay_ms(self, timings: &RoomSettings) -> Millis {
        match self {
            StartMode::Solo => timings.solo_start_delay_ms,
            StartMode::Duo => timings.duo_start_delay_ms,
        }
    }
}

impl Room {
    pub fn start_mode(&self) -> Option<StartMode> {
        let all_ready = self.players.iter().all(|p| p.ready);
        match self.players.len() {
            1 if all_ready => Some(StartMode::Solo),
            2 if all_ready => Some(StartMode::Duo),
            _ => None,
        }
    }

    pub fn set_ready(&mut self, player_id: &str, ready: bool, now: Millis) {
        if let Some(player) = self.player_mut(player_id) {
            player.ready = ready;
        }
        self.updated_at = now;
    }

    /// Clear every ready flag, used when membership changes under a room
    /// that has not started.
    pub fn reset_ready(&mut self) {
        for player in &mut self.players {
            player.ready = false;
        }
    }

    /// Re-evaluate the start condition after a readiness or membership
    /// change. Schedules a start from `waiting`, regresses a `starting` room
    /// whose condition no longer holds. Returns whether `status` changed.
    pub fn reconcile_start(&mut self, now: Millis, timings: &RoomSettings) -> bool {
        match (self.status, self.start_mode()) {
            (RoomStatus::Waiting, Some(mode)) => {
                self.status = RoomStatus::Starting;
                self.start_at = now + mode.delay_ms(timings);
                if self.seed == 0 {
                    self.seed = rand::rng().random_range(1..=i32::MAX as u32);
                }
                self.updated_at = now;
                info!(room = %self.code, ?mode, start_at = self.start_at, "room starting");
                true
            },
            (RoomStatus::Starting, None) => {
                self.status = RoomStatus::Waiting;
                self.start_at = 0;
                self.updated_at = now;
                info!(room = %self.code, "room start cancelled");
                true
            },
            _ => false,
        }
    }

    /// Promote a `starting` room once its deadline has passed.
    pub fn promote_if_due(&mut self, now: Millis) -> bool {
        if self.status == RoomStatus::Starting && now >= self.start_at {
            self.status = RoomStatus::Started;
            self.updated_at = now;
            info!(room = %self.code, "room started");
            return true;
        }
        false
    }

    /// Move to `failed`. Only `starting` and `started` rooms can fail, and
    /// only once; returns whether this call did it.
    pub fn fail(&mut self, reason: &str, failed_by: &str, now: Millis) -> bool {
        if !matches!(self.status, RoomStatus::Starting | RoomStatus::Started) {
            debug!(room = %self.code, status = self.status.as_str(), reason, "fail ignored");
            return false;
        }
        self.status = RoomStatus::Failed;
        self.fail_reason = Some(reason.to_string());
        self.failed_by = Some(failed_by.to_string());
        self.updated_at = now;
        info!(room = %self.code, player = failed_by, reason, "room failed");
        true
    }

    /// Time-driven transitions: promotion, then the liveness checks. Runs
    /// after every mutation and on every read.
    pub fn tick(&mut self, now: Millis, timings: &RoomSettings) -> bool {
        let promoted = self.promote_if_due(now);
        let failed = self.check_liveness(now, timings.offline_timeout_ms);
        promoted || failed
    }
}
