use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::lifecycle::LifecycleError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid transition: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("webhook rejected: {0}")]
    Webhook(String),
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(what) => AppError::NotFound(what),
            LifecycleError::Invalid(msg) => AppError::BadRequest(msg),
            e @ LifecycleError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            LifecycleError::Database(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Webhook(_) => StatusCode::UNAUTHORIZED,
        };

        if let AppError::Database(e) = &self {
            tracing::error!(error = %e, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
