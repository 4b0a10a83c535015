//! Health check endpoints for liveness and deep dependency checks.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::errors::ApiResponse;
use crate::services::health;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    pub format: Option<String>,
}

/// Liveness probe: always returns OK if the process is running.
pub async fn live() -> &'static str {
    "OK"
}

/// GET /health: store round trip plus both remote systems.
///
/// Plain-text report unless `?format=json`; 500 when any check failed.
pub async fn report(State(state): State<AppState>, Query(query): Query<HealthQuery>) -> Response {
    let report = health::check(&state).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    if query.format.as_deref() == Some("json") {
        (status, ApiResponse::success(report)).into_response()
    } else {
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            report.to_string(),
        )
            .into_response()
    }
}
