// API error type. Every failure a handler can hit ends here and is rendered
// as a destructive notification; nothing propagates past the handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::services::notify::Notification;
use crate::services::recorder::RecorderError;

pub type ApiResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad user input, nothing was changed
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Capture device or recording session in the wrong state
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    /// Store or other internal failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Recorder(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn notification(&self) -> Notification {
        match self {
            AppError::Validation(msg) => Notification::error("Invalid input", msg.clone()),
            AppError::NotFound(_) => Notification::error("Not found", self.to_string()),
            AppError::Recorder(e) => Notification::error("Recording error", e.to_string()),
            // Store details stay in the log
            AppError::Internal(_) => {
                Notification::error("Error", "Something went wrong. Please try again.")
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(e) => tracing::error!("Request failed: {:#}", e),
            other => tracing::debug!("Request rejected: {}", other),
        }
        (self.status(), Json(self.notification())).into_response()
    }
}
