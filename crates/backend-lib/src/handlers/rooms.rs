// ============================
// crates/backend-lib/src/handlers/rooms.rs
// ============================
//! `/api/rooms/*`: every body is validated and sanitized here, before the
//! registry touches a room.
use super::{Ack, JsonBody, QueryParams};
use crate::error::AppError;
use crate::sanitize::{flag, sanitize_heartbeat};
use crate::validation::{normalize_fail_reason, normalize_player_id, normalize_room_code};
use crate::AppState;
use axum::{extract::State, Json};
use coop_common::RoomEnvelope;
use serde::Deserialize;
use serde_json::Value;

type RoomResponse = Result<Json<RoomEnvelope>, AppError>;

fn envelope(room: coop_common::RoomSnapshot) -> Json<RoomEnvelope> {
    Json(RoomEnvelope { ok: true, room })
}

/// Create and join are gated on a leaderboard registration when configured.
async fn ensure_registered(state: &AppState, player_id: &str) -> Result<(), AppError> {
    if !state.settings.require_registration {
        return Ok(());
    }
    if state.leaderboard.is_registered(player_id.to_string()).await? {
        Ok(())
    } else {
        Err(AppError::IdNotFound)
    }
}

pub async fn create_room(State(state): State<AppState>, body: JsonBody) -> RoomResponse {
    let player_id = body.player_id()?;
    let requested = match body.field("roomCode") {
        None | Some(Value::Null) => None,
        Some(Value::String(code)) if code.trim().is_empty() => None,
        Some(Value::String(code)) => Some(normalize_room_code(code)?),
        Some(_) => return Err(AppError::InvalidRoomCode),
    };
    ensure_registered(&state, &player_id).await?;
    let room = state.rooms.create(&player_id, requested.as_deref())?;
    Ok(envelope(room))
}

pub async fn join_room(State(state): State<AppState>, body: JsonBody) -> RoomResponse {
    let player_id = body.player_id()?;
    let room_code = body.room_code()?;
    ensure_registered(&state, &player_id).await?;
    Ok(envelope(state.rooms.join(&player_id, &room_code)?))
}

pub async fn set_ready(State(state): State<AppState>, body: JsonBody) -> RoomResponse {
    let player_id = body.player_id()?;
    let room_code = body.room_code()?;
    let ready = flag(body.field("ready"));
    Ok(envelope(state.rooms.ready(&player_id, &room_code, ready)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    pub player_id: Option<String>,
    pub room_code: Option<String>,
}

pub async fn room_state(State(state): State<AppState>, QueryParams(query): QueryParams<RoomQuery>) -> RoomResponse {
    let player_id = normalize_player_id(query.player_id.as_deref().unwrap_or_default())?;
    let room_code = normalize_room_code(query.room_code.as_deref().unwrap_or_default())?;
    Ok(envelope(state.rooms.state(&player_id, &room_code)?))
}

pub async fn heartbeat(State(state): State<AppState>, body: JsonBody) -> RoomResponse {
    let player_id = body.player_id()?;
    let room_code = body.room_code()?;
    let payload = sanitize_heartbeat(&body.0);
    Ok(envelope(state.rooms.heartbeat(&player_id, &room_code, payload)?))
}

pub async fn fail_room(State(state): State<AppState>, body: JsonBody) -> RoomResponse {
    let player_id = body.player_id()?;
    let room_code = body.room_code()?;
    let reason = normalize_fail_reason(body.field("reason").and_then(Value::as_str));
    Ok(envelope(state.rooms.fail(&player_id, &room_code, &reason)?))
}

pub async fn leave_room(State(state): State<AppState>, body: JsonBody) -> Result<Json<Ack>, AppError> {
    let player_id = body.player_id()?;
    let room_code = body.room_code()?;
    state.rooms.leave(&player_id, &room_code)?;
    Ok(Json(Ack { ok: true }))
}
