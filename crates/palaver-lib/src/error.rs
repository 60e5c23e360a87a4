//! Engine and HTTP error types.
//!
//! Engine code returns [`PalaverError`]. Handlers return [`ApiError`], which
//! implements [`IntoResponse`] so failures become a JSON body with a status
//! code. Internal failures are logged in full; the client only sees a
//! generic message.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum PalaverError {
    #[error("chat backend error: {0}")]
    Chat(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("speech error: {0}")]
    Speech(String),

    #[error("offline speech engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("no text to speak")]
    EmptySpeech,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PalaverError>;

/// Error returned from HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body could not be parsed or was unusable.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] PalaverError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Engine(PalaverError::EmptySpeech) => {
                (StatusCode::BAD_REQUEST, PalaverError::EmptySpeech.to_string())
            }
            ApiError::Engine(e) => {
                error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
