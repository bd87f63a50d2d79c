// ============================
// coop-backend-lib/src/lib.rs
// ============================
//! Core of the two-player co-op room server: room lifecycle, liveness,
//! snapshot relay, and the leaderboard collaborator.

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod leaderboard_actor;
pub mod metrics;
pub mod relay;
pub mod room;
pub mod sanitize;
pub mod storage;
pub mod validation;
pub mod websocket;
pub mod ws_router;

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::leaderboard_actor::{spawn_leaderboard_actor, LeaderboardHandle};
use crate::relay::SnapshotRelay;
use crate::room::RoomRegistry;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Settings manager
    pub settings: Arc<Settings>,
    /// Live rooms
    pub rooms: Arc<RoomRegistry>,
    /// Authenticated sockets
    pub relay: Arc<SnapshotRelay>,
    /// Leaderboard actor
    pub leaderboard: LeaderboardHandle,
}

impl AppState {
    /// Create a new application state on the system clock. Spawns the
    /// leaderboard actor, so it must run inside a Tokio runtime.
    pub fn new(settings: Settings, storage: impl Storage + 'static) -> Self {
        Self::with_clock(settings, storage, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: Settings, storage: impl Storage + 'static, clock: Arc<dyn Clock>) -> Self {
        let relay = Arc::new(SnapshotRelay::new());
        let rooms = Arc::new(RoomRegistry::new(settings.rooms, clock.clone(), relay.clone()));
        let leaderboard = spawn_leaderboard_actor(storage, clock);
        Self {
            settings: Arc::new(settings),
            rooms,
            relay,
            leaderboard,
        }
    }
}

/// Periodically sweep the registry so rooms promote, fail and expire even
/// when nobody polls them. Returns `None` when the interval is 0.
pub fn spawn_sweeper(state: &AppState) -> Option<JoinHandle<()>> {
    let period = state.settings.rooms.sweep_interval_ms;
    if period == 0 {
        return None;
    }
    let rooms = state.rooms.clone();
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(period));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            rooms.sweep();
        }
    }))
}
