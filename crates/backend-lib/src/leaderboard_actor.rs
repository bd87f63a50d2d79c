// ============================
// coop-backend-lib/src/leaderboard_actor.rs
// ============================
//! Single writer over the leaderboard file.
//!
//! All reads and writes go through one task, so registrations and score
//! submissions never interleave their read-modify-write cycles.
use crate::clock::Clock;
use crate::error::AppError;
use crate::metrics::LEADERBOARD_SCORES;
use crate::storage::{LeaderboardDb, PlayerRecord, Storage};
use coop_common::ScoreRecord;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

/// Size of the public rankings table
pub const RANKINGS_LIMIT: usize = 100;

/// A score as submitted, before it is stamped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreSubmission {
    pub time_sec: u64,
    pub wave: u64,
    pub kills: u64,
    pub minerals: u64,
}

/// Message sent *into* the actor
#[derive(Debug)]
pub enum ActorMsg {
    Register {
        player_id: String,
        resp_tx: oneshot::Sender<Result<(), AppError>>,
    },
    SubmitScore {
        player_id: String,
        score: ScoreSubmission,
        resp_tx: oneshot::Sender<Result<bool, AppError>>,
    },
    Rankings {
        limit: usize,
        resp_tx: oneshot::Sender<Vec<ScoreRecord>>,
    },
    IsRegistered {
        player_id: String,
        resp_tx: oneshot::Sender<bool>,
    },
}

/// Handle that other components keep
#[derive(Clone)]
pub struct LeaderboardHandle {
    cmd_tx: mpsc::UnboundedSender<ActorMsg>,
}

fn actor_gone() -> AppError {
    AppError::Internal("leaderboard actor is not running".to_string())
}

impl LeaderboardHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ActorMsg) -> Result<T, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(build(resp_tx)).map_err(|_| actor_gone())?;
        resp_rx.await.map_err(|_| actor_gone())
    }

    /// Register a new player id. Fails with `ID_EXISTS` for a known id.
    pub async fn register(&self, player_id: String) -> Result<(), AppError> {
        self.request(|resp_tx| ActorMsg::Register { player_id, resp_tx }).await?
    }

    /// Submit a finished run. Returns whether it became the player's best.
    pub async fn submit_score(&self, player_id: String, score: ScoreSubmission) -> Result<bool, AppError> {
        self.request(|resp_tx| ActorMsg::SubmitScore {
            player_id,
            score,
            resp_tx,
        })
        .await?
    }

    pub async fn rankings(&self) -> Result<Vec<ScoreRecord>, AppError> {
        self.request(|resp_tx| ActorMsg::Rankings {
            limit: RANKINGS_LIMIT,
            resp_tx,
        })
        .await
    }

    pub async fn is_registered(&self, player_id: String) -> Result<bool, AppError> {
        self.request(|resp_tx| ActorMsg::IsRegistered { player_id, resp_tx }).await
    }
}

pub struct LeaderboardActor {
    storage: Box<dyn Storage>,
    clock: Arc<dyn Clock>,
    db: LeaderboardDb,
}

impl LeaderboardActor {
    pub fn new(storage: impl Storage + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage: Box::new(storage),
            clock,
            db: LeaderboardDb::default(),
        }
    }

    /// Pull the stored document into memory.
    pub async fn load(&mut self) -> Result<(), AppError> {
        self.db = self.storage.load().await?;
        info!(players = self.db.players.len(), "leaderboard loaded");
        Ok(())
    }

    /// Apply `change` to a copy of the database and keep it only once it is
    /// on disk.
    async fn commit<T>(
        &mut self,
        change: impl FnOnce(&mut LeaderboardDb) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut next = self.db.clone();
        let out = change(&mut next)?;
        self.storage.save(&next).await?;
        self.db = next;
        Ok(out)
    }

    pub async fn handle_register(&mut self, player_id: String) -> Result<(), AppError> {
        let now = self.clock.now_ms();
        self.commit(|db| {
            if db.players.contains_key(&player_id) {
                return Err(AppError::IdExists);
            }
            db.players.insert(
                player_id.clone(),
                PlayerRecord {
                    player_id: player_id.clone(),
                    created_at: now,
                    best_score: None,
                    last_played_at: 0,
                },
            );
            Ok(())
        })
        .await?;
        info!(player = %player_id, "player registered");
        Ok(())
    }

    pub async fn handle_submit_score(&mut self, player_id: String, score: ScoreSubmission) -> Result<bool, AppError> {
        let now = self.clock.now_ms();
        let updated = self
            .commit(|db| {
                let player = db.players.get_mut(&player_id).ok_or(AppError::IdNotFound)?;
                let candidate = ScoreRecord {
                    player_id: player_id.clone(),
                    time_sec: score.time_sec,
                    wave: score.wave,
                    kills: score.kills,
                    minerals: score.minerals,
                    updated_at: now,
                };
                let updated = player
                    .best_score
                    .as_ref()
                    .map_or(true, |best| candidate.rank_cmp(best).is_lt());
                if updated {
                    player.best_score = Some(candidate);
                }
                player.last_played_at = now;
                Ok(updated)
            })
            .await?;
        counter!(LEADERBOARD_SCORES).increment(1);
        info!(player = %player_id, wave = score.wave, updated, "score submitted");
        Ok(updated)
    }

    /// Best score per player, strongest first.
    pub fn rankings(&self, limit: usize) -> Vec<ScoreRecord> {
        let mut rows: Vec<ScoreRecord> = self
            .db
            .players
            .values()
            .filter_map(|p| p.best_score.clone())
            .collect();
        rows.sort_by(ScoreRecord::rank_cmp);
        rows.truncate(limit);
        rows
    }

    pub fn is_registered(&self, player_id: &str) -> bool {
        self.db.players.contains_key(player_id)
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ActorMsg>) {
        if let Err(err) = self.load().await {
            error!(error = %err, "failed to load leaderboard, starting empty");
        }
        while let Some(msg) = rx.recv().await {
            match msg {
                ActorMsg::Register { player_id, resp_tx } => {
                    let result = self.handle_register(player_id).await;
                    let _ = resp_tx.send(result);
                },
                ActorMsg::SubmitScore {
                    player_id,
                    score,
                    resp_tx,
                } => {
                    let result = self.handle_submit_score(player_id, score).await;
                    let _ = resp_tx.send(result);
                },
                ActorMsg::Rankings { limit, resp_tx } => {
                    let _ = resp_tx.send(self.rankings(limit));
                },
                ActorMsg::IsRegistered { player_id, resp_tx } => {
                    let _ = resp_tx.send(self.is_registered(&player_id));
                },
            }
        }
    }
}

/// Spawn the leaderboard actor and return its handle
pub fn spawn_leaderboard_actor(storage: impl Storage + 'static, clock: Arc<dyn Clock>) -> LeaderboardHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let actor = LeaderboardActor::new(storage, clock);
    tokio::spawn(actor.run(cmd_rx));
    LeaderboardHandle { cmd_tx }
}
