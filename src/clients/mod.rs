//! Outbound API clients for the incident-management and monitoring systems.
//!
//! The engine only sees the [`IncidentApi`] and [`MonitoringApi`] traits;
//! [`betterstack::BetterStackClient`] and [`thruk::ThrukClient`] are the
//! production implementations.

pub mod betterstack;
pub mod retry;
pub mod thruk;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use betterstack::BetterStackClient;
pub use retry::RetryPolicy;
pub use thruk::ThrukClient;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("expected exactly one {kind} matching '{query}', found {found}")]
    NotExactlyOne {
        kind: &'static str,
        query: String,
        found: usize,
    },
}

impl ClientError {
    /// Build an `UnexpectedStatus` from a response, consuming its body.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::UnexpectedStatus { status, body }
    }
}

/// Incident-management API used by the correlation engine.
#[async_trait]
pub trait IncidentApi: Send + Sync {
    /// Create an incident, returning its remote id.
    async fn create_incident(
        &self,
        policy_id: &str,
        requester_email: &str,
        name: &str,
        description: &str,
    ) -> Result<String, ClientError>;

    /// Acknowledge an incident. Already-acknowledged incidents count as success.
    async fn acknowledge_incident(
        &self,
        actor_email: Option<&str>,
        fallback_email: &str,
        incident_id: &str,
    ) -> Result<(), ClientError>;

    /// Resolve an incident. Already-resolved incidents count as success.
    async fn resolve_incident(
        &self,
        actor_email: Option<&str>,
        fallback_email: &str,
        incident_id: &str,
    ) -> Result<(), ClientError>;

    /// Lightweight reachability probe.
    async fn check_health_endpoint(&self) -> Result<(), ClientError>;
}

/// Current state of a monitored host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostState {
    pub name: String,
    pub acknowledged: bool,
    /// Host is UP.
    pub alive: bool,
    pub address: String,
    pub services: Vec<String>,
}

/// Current state of a monitored service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceState {
    pub display_name: String,
    pub acknowledged: bool,
    /// Service is OK.
    pub alive: bool,
    pub check_output: String,
    pub host_name: String,
    pub host_address: String,
}

/// Monitoring query/command API used by reverse sync and health checks.
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    async fn get_host_state(&self, host: &str) -> Result<HostState, ClientError>;

    async fn get_service_state(&self, host: &str, service: &str)
        -> Result<ServiceState, ClientError>;

    async fn ack_host(&self, host: &str, comment: &str) -> Result<(), ClientError>;

    async fn ack_service(&self, host: &str, service: &str, comment: &str)
        -> Result<(), ClientError>;

    async fn list_hosts(&self) -> Result<Vec<HostState>, ClientError>;
}
