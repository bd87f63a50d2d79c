// ============================
// coop-backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Directory holding `leaderboard.json`
    pub data_dir: PathBuf,
    /// Directory served for non-API paths, if any
    pub static_dir: Option<PathBuf>,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Largest accepted request body
    pub max_body_bytes: usize,
    /// CORS allow-list, `"*"` allows any origin
    pub allowed_origins: Vec<String>,
    /// Room create/join requires a registered leaderboard id
    pub require_registration: bool,
    /// Room timing
    pub rooms: RoomSettings,
}

/// Timing knobs of the room lifecycle, all in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoomSettings {
    pub solo_start_delay_ms: i64,
    pub duo_start_delay_ms: i64,
    pub offline_timeout_ms: i64,
    pub stale_room_ms: i64,
    /// Period of the background sweep; 0 disables it
    pub sweep_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8787)),
            data_dir: PathBuf::from("data"),
            static_dir: None,
            log_level: "info".to_string(),
            log_json: false,
            max_body_bytes: 64 * 1024,
            allowed_origins: Vec::new(),
            require_registration: true,
            rooms: RoomSettings::default(),
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            solo_start_delay_ms: 800,
            duo_start_delay_ms: 1800,
            offline_timeout_ms: 30_000,
            stale_room_ms: 60 * 60 * 1000,
            sweep_interval_ms: 1000,
        }
    }
}

impl Settings {
    /// Load settings from defaults, the TOML file at `path` and `COOP_*`
    /// variables; a missing file is skipped
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("COOP_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            bail!("log_level must not be empty");
        }
        if self.max_body_bytes == 0 {
            bail!("max_body_bytes must be positive");
        }
        let rooms = &self.rooms;
        if rooms.solo_start_delay_ms < 0 {
            bail!("rooms.solo_start_delay_ms must not be negative");
        }
        if rooms.duo_start_delay_ms < rooms.solo_start_delay_ms {
            bail!("rooms.duo_start_delay_ms must be at least rooms.solo_start_delay_ms");
        }
        if rooms.offline_timeout_ms <= 0 {
            bail!("rooms.offline_timeout_ms must be positive");
        }
        if rooms.stale_room_ms < rooms.offline_timeout_ms {
            bail!("rooms.stale_room_ms must be at least rooms.offline_timeout_ms");
        }
        Ok(())
    }
}
