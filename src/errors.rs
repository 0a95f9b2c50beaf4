use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("validation error: {0}")]
    Validation(String),

    /// The requested vehicle/window is held by another booking. Carries the
    /// conflicting booking's reference so the caller can show it.
    #[error("vehicle is not available: blocked by booking {conflict_ref}")]
    AvailabilityConflict {
        vehicle_id: String,
        conflict_ref: String,
        conflict_customer: String,
    },

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AvailabilityConflict { .. } => StatusCode::CONFLICT,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        let body = match &self {
            AppError::AvailabilityConflict {
                vehicle_id,
                conflict_ref,
                conflict_customer,
            } => serde_json::json!({
                "error": self.to_string(),
                "vehicle_id": vehicle_id,
                "conflict_ref": conflict_ref,
                "conflict_customer": conflict_customer,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}
