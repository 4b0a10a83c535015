//! Incident webhook intake (reverse sync).

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::errors::{ApiResponse, AppError};
use crate::middleware::client_addr::ClientAddr;
use crate::models::incident::IncidentWebhookPayload;
use crate::services::reverse_sync::{self, ReverseSyncOutcome};
use crate::AppState;

/// POST /incident-events: mirror an incident status change onto Nagios.
pub async fn receive(
    State(state): State<AppState>,
    client: ClientAddr,
    payload: Result<Json<IncidentWebhookPayload>, JsonRejection>,
) -> Result<Json<ApiResponse<ReverseSyncOutcome>>, AppError> {
    let Json(payload) = payload.map_err(|e| {
        tracing::info!(client = %client, error = %e, "Rejected malformed incident event");
        AppError::Validation(format!("Invalid incident event body: {}", e.body_text()))
    })?;

    let outcome = reverse_sync::handle_incident_event(&state, &payload).await?;
    Ok(ApiResponse::success(outcome))
}
