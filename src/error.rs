use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by the auth and image services.
///
/// Everything except `Internal` is an expected outcome and is reported to the
/// caller with a specific message. `Internal` keeps its detail in the logs.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("User already exists")]
    DuplicateUser,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid password")]
    InvalidCredential,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Upload failed")]
    UploadFailed,

    #[error("Not allowed to modify this image")]
    Forbidden,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Validation(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Uniform error body; `status` always mirrors the transport status code.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub status: u16,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DuplicateUser => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidCredential | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::MissingField(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UploadFailed => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                "Internal server error".to_string()
            }
            other => {
                warn!(%status, error = %other, "request rejected");
                other.to_string()
            }
        };
        (
            status,
            Json(ErrorBody {
                message,
                status: status.as_u16(),
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection, "malformed json body");
        AppError::Validation("Malformed request body")
    }
}
