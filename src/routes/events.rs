use axum::{extract::State, Json};

use crate::errors::{ApiResponse, AppError};
use crate::models::event::EventCorrelationRecord;
use crate::AppState;

/// GET /events: every open correlation record.
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<EventCorrelationRecord>>>, AppError> {
    let records = state.store.lock().await.list_all().await?;
    Ok(ApiResponse::success(records))
}
