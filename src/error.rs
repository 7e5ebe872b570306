use crate::domain::delivery::ErrorCategory;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Human verification failed: {0}")]
    Verification(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Active webhook limit reached")]
    Quota,
    #[error("Test delivery failed")]
    DeliveryTest { category: ErrorCategory },
    #[error("Not found")]
    NotFound,
    #[error("Server is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
            }
            Self::Validation(msg) => {
                tracing::debug!(message = %msg, "Validation rejected request");
                (StatusCode::BAD_REQUEST, msg, None)
            }
            Self::Verification(msg) => {
                tracing::debug!(message = %msg, "Verification rejected request");
                (StatusCode::BAD_REQUEST, msg, None)
            }
            Self::Conflict(msg) => {
                tracing::debug!(message = %msg, "Conflict");
                (StatusCode::CONFLICT, msg, None)
            }
            Self::Quota => (
                StatusCode::TOO_MANY_REQUESTS,
                "The maximum number of active webhooks has been reached".to_string(),
                None,
            ),
            Self::DeliveryTest { category } => {
                tracing::debug!(category = ?category, "Test delivery failed");
                (
                    StatusCode::BAD_REQUEST,
                    format!("Test delivery failed: {}", category.describe()),
                    Some(json!({ "errorCategory": category })),
                )
            }
            Self::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string(), None),
            Self::ShuttingDown => {
                (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down".to_string(), None)
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(json!({ "error": e.to_string() })),
                )
            }
        };

        let mut body = json!({
            "success": false,
            "message": message,
        });
        if let (Some(details), Some(map)) = (details, body.as_object_mut()) {
            map.insert("details".to_string(), details);
        }

        (status, Json(body)).into_response()
    }
}
