// ============================
// coop-backend-lib/src/storage.rs
// ============================
//! Storage abstraction with flat-file implementation.
use crate::error::AppError;
use async_trait::async_trait;
use coop_common::{Millis, ScoreRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokio::fs as tokio_fs;
use tracing::warn;

pub const LEADERBOARD_FILE: &str = "leaderboard.json";

/// One registered player and the best run it has submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub player_id: String,
    pub created_at: Millis,
    #[serde(default)]
    pub best_score: Option<ScoreRecord>,
    /// 0 until the first score submission
    #[serde(default)]
    pub last_played_at: Millis,
}

/// Whole leaderboard document, keyed by player id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardDb {
    #[serde(default)]
    pub players: BTreeMap<String, PlayerRecord>,
}

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the leaderboard. A missing or unreadable document yields an
    /// empty one.
    async fn load(&self) -> Result<LeaderboardDb, AppError>;

    /// Replace the stored leaderboard
    async fn save(&self, db: &LeaderboardDb) -> Result<(), AppError>;
}

/// Flat-file implementation of the Storage trait
#[derive(Clone)]
pub struct FlatFileStorage {
    path: PathBuf,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            path: root.join(LEADERBOARD_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Storage for FlatFileStorage {
    async fn load(&self) -> Result<LeaderboardDb, AppError> {
        if !self.path.exists() {
            let db = LeaderboardDb::default();
            self.save(&db).await?;
            return Ok(db);
        }

        let content = tokio_fs::read_to_string(&self.path).await?;
        match serde_json::from_str(&content) {
            Ok(db) => Ok(db),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt leaderboard file, starting empty");
                let db = LeaderboardDb::default();
                self.save(&db).await?;
                Ok(db)
            },
        }
    }

    /// Write to a sibling temp file, then rename over the old document.
    async fn save(&self, db: &LeaderboardDb) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(db)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio_fs::write(&tmp, json).await?;
        tokio_fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_created_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FlatFileStorage::new(dir.path()).unwrap();
        assert_eq!(storage.load().await.unwrap(), LeaderboardDb::default());
        assert!(storage.path().exists());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = FlatFileStorage::new(dir.path().join("nested")).unwrap();
        let mut db = LeaderboardDb::default();
        db.players.insert(
            "alice".to_string(),
            PlayerRecord {
                player_id: "alice".to_string(),
                created_at: 1,
                best_score: None,
                last_played_at: 0,
            },
        );
        storage.save(&db).await.unwrap();
        assert_eq!(storage.load().await.unwrap(), db);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(storage.path()).unwrap()).unwrap();
        assert_eq!(raw["players"]["alice"]["createdAt"], 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_resets() {
        let dir = TempDir::new().unwrap();
        let storage = FlatFileStorage::new(dir.path()).unwrap();
        fs::write(storage.path(), "{not json").unwrap();
        assert_eq!(storage.load().await.unwrap(), LeaderboardDb::default());
        let raw = fs::read_to_string(storage.path()).unwrap();
        assert!(serde_json::from_str::<LeaderboardDb>(&raw).is_ok());
    }
}
