// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers and the request-body plumbing they share.
pub mod leaderboard;
pub mod rooms;

use crate::error::AppError;
use crate::validation::{normalize_player_id, normalize_room_code};
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, Method, StatusCode, Uri},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// Loosely-typed JSON body. An empty body reads as `{}`; an oversized one is
/// `BODY_TOO_LARGE` and anything unparseable is `INVALID_REQUEST`.
#[derive(Debug, Clone)]
pub struct JsonBody(pub Value);

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::BodyTooLarge
            } else {
                AppError::InvalidRequest(rejection.body_text())
            }
        })?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonBody(Value::Object(Map::new())));
        }
        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|err| AppError::InvalidRequest(format!("malformed JSON body: {err}")))
    }
}

/// `Query` whose rejection is an `INVALID_REQUEST` envelope.
#[derive(Debug, Clone)]
pub struct QueryParams<T>(pub T);

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
        Ok(QueryParams(value))
    }
}

impl JsonBody {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn str_field(&self, key: &str) -> &str {
        self.field(key).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn player_id(&self) -> Result<String, AppError> {
        normalize_player_id(self.str_field("playerId"))
    }

    pub fn room_code(&self) -> Result<String, AppError> {
        normalize_room_code(self.str_field("roomCode"))
    }
}

/// `{ok:true}` and nothing else
#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

pub async fn health() -> Json<Ack> {
    Json(Ack { ok: true })
}

/// Fallback for unknown `/api/*` paths and for known paths called with the
/// wrong method
pub async fn api_not_found(method: Method, uri: Uri) -> AppError {
    AppError::NotFound(format!("no API route for {method} {}", uri.path()))
}
