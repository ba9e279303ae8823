use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Failures of lobby and game operations.
///
/// All variants are recoverable: the gateway reports them to the originating
/// connection as an `error` message and keeps the connection open. The
/// `Display` text is exactly what the client sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Lobby not found")]
    NotFound,

    #[error("Lobby is full")]
    Full,

    #[error("Game already started")]
    AlreadyStarted,

    #[error("Not authorized")]
    Unauthorized,

    #[error("Not all players are ready")]
    NotAllReady,

    #[error("Invalid message format")]
    InvalidMessage,

    #[error("Unknown message type")]
    UnknownMessageType,
}

/// Structured API error returned to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "FORBIDDEN".to_string(),
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "CONFLICT".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let message = err.to_string();
        match err {
            CoordinatorError::NotFound => Self::not_found(message),
            CoordinatorError::Unauthorized => Self::forbidden(message),
            CoordinatorError::Full
            | CoordinatorError::AlreadyStarted
            | CoordinatorError::NotAllReady => Self::conflict(message),
            CoordinatorError::InvalidMessage | CoordinatorError::UnknownMessageType => {
                Self::bad_request(message)
            }
        }
    }
}
