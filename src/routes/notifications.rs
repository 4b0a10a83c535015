//! Monitoring notification intake.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::errors::{ApiResponse, AppError};
use crate::middleware::client_addr::ClientAddr;
use crate::models::event::MonitoringNotification;
use crate::services::correlation::{self, NotificationOutcome};
use crate::AppState;

/// POST /notifications: correlate a Nagios notification with remote incidents.
pub async fn receive(
    State(state): State<AppState>,
    client: ClientAddr,
    payload: Result<Json<MonitoringNotification>, JsonRejection>,
) -> Result<Json<ApiResponse<NotificationOutcome>>, AppError> {
    let Json(notification) = payload.map_err(|e| {
        tracing::info!(client = %client, error = %e, "Rejected malformed notification");
        AppError::Validation(format!("Invalid notification body: {}", e.body_text()))
    })?;

    let outcome = correlation::handle_notification(&state, &notification).await?;
    Ok(ApiResponse::success(outcome))
}

#[cfg(test)]
mod tests {
    use crate::routes::router;
    use crate::services::testing::{state_with, FakeIncidents, FakeMonitoring};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn problem_returns_created_outcome() {
        let incidents = Arc::new(FakeIncidents::new());
        let app = router(
            state_with(incidents.clone(), Arc::new(FakeMonitoring::with_open_problem())),
            Duration::from_secs(5),
        );

        let response = app
            .oneshot(post(
                "/notifications",
                json!({
                    "siteName": "a",
                    "problemId": 1,
                    "hostname": "h1",
                    "notificationType": "PROBLEM",
                    "remotePolicyId": "p1"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["action"], "created");
        assert_eq!(body["data"]["incident_id"], "inc-1");
        assert_eq!(incidents.create_count(), 1);
    }

    #[tokio::test]
    async fn legacy_path_and_field_names_are_accepted() {
        let app = router(
            state_with(
                Arc::new(FakeIncidents::new()),
                Arc::new(FakeMonitoring::with_open_problem()),
            ),
            Duration::from_secs(5),
        );

        let response = app
            .oneshot(post(
                "/api/nagios-event",
                json!({
                    "nagiosSiteName": "telops",
                    "nagiosProblemId": "23",
                    "nagiosProblemHostname": "h1",
                    "nagiosProblemNotificationType": "FLAPPINGSTART",
                    "betterStackPolicyId": "p1"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["action"], "ignored");
        assert_eq!(body["data"]["notification_type"], "FLAPPINGSTART");
    }

    #[tokio::test]
    async fn unrecognised_type_is_accepted_and_ignored() {
        let incidents = Arc::new(FakeIncidents::new());
        let app = router(
            state_with(incidents.clone(), Arc::new(FakeMonitoring::with_open_problem())),
            Duration::from_secs(5),
        );

        let response = app
            .oneshot(post(
                "/notifications",
                json!({
                    "siteName": "a",
                    "problemId": "1",
                    "hostname": "h1",
                    "notificationType": "SOMETHINGNEW",
                    "remotePolicyId": "p1"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["action"], "ignored");
        assert_eq!(body["data"]["notification_type"], "SOMETHINGNEW");
        assert_eq!(incidents.create_count(), 0);
    }

    #[tokio::test]
    async fn missing_fields_return_bad_request() {
        let app = router(
            state_with(
                Arc::new(FakeIncidents::new()),
                Arc::new(FakeMonitoring::with_open_problem()),
            ),
            Duration::from_secs(5),
        );

        let response = app
            .oneshot(post("/notifications", json!({"hostname": "h1"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn malformed_json_returns_bad_request() {
        let app = router(
            state_with(
                Arc::new(FakeIncidents::new()),
                Arc::new(FakeMonitoring::with_open_problem()),
            ),
            Duration::from_secs(5),
        );

        let request = Request::builder()
            .method("POST")
            .uri("/notifications")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn downstream_failure_returns_server_error() {
        let mut incidents = FakeIncidents::new();
        incidents.fail_create = true;
        let app = router(
            state_with(Arc::new(incidents), Arc::new(FakeMonitoring::with_open_problem())),
            Duration::from_secs(5),
        );

        let response = app
            .oneshot(post(
                "/notifications",
                json!({
                    "siteName": "a",
                    "problemId": "1",
                    "hostname": "h1",
                    "notificationType": "PROBLEM",
                    "remotePolicyId": "p1"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "REMOTE_ERROR");
    }
}
