// ============================
// crates/backend-lib/src/handlers/leaderboard.rs
// ============================
//! `/api/register`, `/api/score` and `/api/rankings`.
use super::JsonBody;
use crate::error::AppError;
use crate::leaderboard_actor::ScoreSubmission;
use crate::sanitize::integer;
use crate::AppState;
use axum::{extract::State, Json};
use coop_common::ScoreRecord;
use serde::Serialize;

/// Largest count accepted in a score submission
const MAX_SCORE_FIELD: i64 = 1_000_000_000_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub ok: bool,
    pub player_id: String,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub ok: bool,
    pub updated: bool,
}

#[derive(Debug, Serialize)]
pub struct RankingsResponse {
    pub ok: bool,
    pub rankings: Vec<ScoreRecord>,
}

pub async fn register(State(state): State<AppState>, body: JsonBody) -> Result<Json<RegisterResponse>, AppError> {
    let player_id = body.player_id()?;
    state.leaderboard.register(player_id.clone()).await?;
    Ok(Json(RegisterResponse { ok: true, player_id }))
}

/// Non-negative whole count; junk reads as `default`.
#[allow(clippy::cast_sign_loss)]
fn count(body: &JsonBody, key: &str, default: i64, min: i64) -> u64 {
    integer(body.field(key), default, min, MAX_SCORE_FIELD) as u64
}

pub async fn submit_score(State(state): State<AppState>, body: JsonBody) -> Result<Json<ScoreResponse>, AppError> {
    let player_id = body.player_id()?;
    let score = ScoreSubmission {
        time_sec: count(&body, "timeSec", 0, 0),
        wave: count(&body, "wave", 1, 1),
        kills: count(&body, "kills", 0, 0),
        minerals: count(&body, "minerals", 0, 0),
    };
    let updated = state.leaderboard.submit_score(player_id, score).await?;
    Ok(Json(ScoreResponse { ok: true, updated }))
}

pub async fn rankings(State(state): State<AppState>) -> Result<Json<RankingsResponse>, AppError> {
    let rankings = state.leaderboard.rankings().await?;
    Ok(Json(RankingsResponse { ok: true, rankings }))
}
