//! HTTP error responses.
//!
//! Every failure leaves the API as `{"detail": "..."}`. Upstream detail is
//! logged server-side and replaced with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use draugnet_core::DraugnetError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not authorized.")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("Object creation failed. {0}")]
    ObjectBuild(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DraugnetError> for ApiError {
    fn from(err: DraugnetError) -> Self {
        match err {
            DraugnetError::Validation(msg) => ApiError::BadRequest(msg),
            DraugnetError::Forbidden => ApiError::Forbidden,
            DraugnetError::NotFound(msg) => ApiError::NotFound(msg),
            DraugnetError::ObjectBuild(msg) => ApiError::ObjectBuild(msg),
            DraugnetError::Upstream(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::ObjectBuild(_) => {
                tracing::warn!(error = %self, "Object build failed");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "Upstream failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error.".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
