//! Unified error handling with consistent API response envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::clients::ClientError;
use crate::db::StoreError;

/// Error detail in the API response envelope.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Consistent JSON envelope for all API responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap a successful result in the envelope.
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            data: Some(data),
            error: None,
        })
    }
}

/// Application error type mapping to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No open event correlates with incident {0}")]
    CorrelationNotFound(String),

    #[error("Remote API error: {0}")]
    Remote(#[from] ClientError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AppError {
    /// Client errors are never retried by the caller.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::CorrelationNotFound(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Remote(ClientError::RateLimited { .. }))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            tracing::info!(error = %self, "Rejected request");
        }

        let (status, code, message) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::CorrelationNotFound(_) => (
                StatusCode::BAD_REQUEST,
                "CORRELATION_NOT_FOUND",
                self.to_string(),
            ),
            AppError::Remote(e) => {
                if self.is_rate_limited() {
                    tracing::error!(error = %e, "Remote API rate limit exhausted");
                } else {
                    tracing::error!(error = %e, "Remote API error");
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REMOTE_ERROR",
                    e.to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!(error = %e, "Storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "An internal storage error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()> {
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message,
            }),
        };

        (status, Json(body)).into_response()
    }
}
