// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use coop_common::ErrorEnvelope;
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Player id must be 2-16 characters without control characters")]
    InvalidId,

    #[error("Room code must be 4-12 letters or digits")]
    InvalidRoomCode,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Player is not a member of this room")]
    RoomNotMember,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Player id is not registered")]
    IdNotFound,

    #[error("Room code is already in use")]
    RoomCodeTaken,

    #[error("Player id already exists")]
    IdExists,

    #[error("Room is full")]
    RoomFull,

    #[error("Room can no longer be joined")]
    RoomNotJoinable,

    #[error("Readiness can no longer be changed in this room")]
    RoomNotReadyable,

    #[error("Request body is too large")]
    BodyTooLarge,

    #[error("Could not allocate a room code")]
    RoomCreateFailed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidId | AppError::InvalidRoomCode | AppError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            },
            AppError::RoomNotMember => StatusCode::FORBIDDEN,
            AppError::RoomNotFound | AppError::IdNotFound | AppError::NotFound(_) => {
                StatusCode::NOT_FOUND
            },
            AppError::RoomCodeTaken
            | AppError::IdExists
            | AppError::RoomFull
            | AppError::RoomNotJoinable
            | AppError::RoomNotReadyable => StatusCode::CONFLICT,
            AppError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RoomCreateFailed
            | AppError::Internal(_)
            | AppError::Io(_)
            | AppError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidId => "INVALID_ID",
            AppError::InvalidRoomCode => "INVALID_ROOM_CODE",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::RoomNotMember => "ROOM_NOT_MEMBER",
            AppError::RoomNotFound => "ROOM_NOT_FOUND",
            AppError::IdNotFound => "ID_NOT_FOUND",
            AppError::RoomCodeTaken => "ROOM_CODE_TAKEN",
            AppError::IdExists => "ID_EXISTS",
            AppError::RoomFull => "ROOM_FULL",
            AppError::RoomNotJoinable => "ROOM_NOT_JOINABLE",
            AppError::RoomNotReadyable => "ROOM_NOT_READYABLE",
            AppError::BodyTooLarge => "BODY_TOO_LARGE",
            AppError::RoomCreateFailed => "ROOM_CREATE_FAILED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) | AppError::Io(_) | AppError::Json(_) => "INTERNAL_ERROR",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::Io(_) | AppError::Json(_) => {
                "An internal server error occurred".to_string()
            },
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = ErrorEnvelope {
            ok: false,
            error: message,
            code: self.error_code().to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
