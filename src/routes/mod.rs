//! Route definitions for the relay API.

pub mod events;
pub mod health;
pub mod incident_events;
pub mod notifications;

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::middleware::client_addr::log_request;
use crate::AppState;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the full application router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/notifications", post(notifications::receive))
        .route("/incident-events", post(incident_events::receive))
        .route("/events", get(events::list))
        .route("/health", get(health::report))
        .route("/health/live", get(health::live))
        // Paths used by existing notification commands and webhook configs.
        .route(
            "/api/nagios-event",
            get(events::list).post(notifications::receive),
        )
        .route("/api/better-stack-event", post(incident_events::receive))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(log_request))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
