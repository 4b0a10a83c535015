//! Better Stack Uptime incidents API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ClientError, IncidentApi, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://uptime.betterstack.com";

#[derive(Debug, Clone)]
pub struct BetterStackClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct CreateIncidentRequest<'a> {
    requester_email: &'a str,
    name: &'a str,
    summary: &'a str,
    description: &'a str,
    call: bool,
    sms: bool,
    email: bool,
    push: bool,
    policy_id: &'a str,
}

#[derive(Debug, Serialize)]
struct AcknowledgeRequest<'a> {
    acknowledged_by: &'a str,
}

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    resolved_by: &'a str,
}

#[derive(Debug, Deserialize)]
struct IncidentResponse {
    data: IncidentResponseData,
}

#[derive(Debug, Deserialize)]
struct IncidentResponseData {
    id: String,
}

impl BetterStackClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{endpoint}", self.base_url))
            .bearer_auth(&self.api_key)
    }

    /// Shared acknowledge/resolve call: 200 and 409 Conflict are both success.
    async fn transition<T: Serialize + Sync>(
        &self,
        incident_id: &str,
        action: &str,
        body: &T,
    ) -> Result<(), ClientError> {
        if incident_id.is_empty() {
            return Err(ClientError::InvalidUrl(format!(
                "cannot {action} an incident without an id"
            )));
        }
        let endpoint = format!("/api/v2/incidents/{incident_id}/{action}");
        let response = self
            .retry
            .send("betterstack", || {
                self.request(Method::POST, &endpoint).json(body)
            })
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => {
                debug!(incident_id, action, "Incident already in target state");
                Ok(())
            }
            _ => Err(ClientError::from_response(response).await),
        }
    }
}

/// Interacting user's email, falling back to the configured contact.
fn actor<'a>(actor_email: Option<&'a str>, fallback_email: &'a str) -> &'a str {
    actor_email.filter(|e| !e.is_empty()).unwrap_or(fallback_email)
}

#[async_trait]
impl IncidentApi for BetterStackClient {
    async fn create_incident(
        &self,
        policy_id: &str,
        requester_email: &str,
        name: &str,
        description: &str,
    ) -> Result<String, ClientError> {
        let body = CreateIncidentRequest {
            requester_email,
            name,
            summary: description,
            description,
            call: false,
            sms: false,
            email: false,
            push: false,
            policy_id,
        };

        let response = self
            .retry
            .send("betterstack", || {
                self.request(Method::POST, "/api/v2/incidents").json(&body)
            })
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(ClientError::from_response(response).await);
        }

        let created: IncidentResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("incident body: {e}")))?;
        if created.data.id.is_empty() {
            return Err(ClientError::InvalidResponse(
                "created incident has an empty id".to_string(),
            ));
        }

        info!(incident_id = %created.data.id, name, "Created Better Stack incident");
        Ok(created.data.id)
    }

    async fn acknowledge_incident(
        &self,
        actor_email: Option<&str>,
        fallback_email: &str,
        incident_id: &str,
    ) -> Result<(), ClientError> {
        let body = AcknowledgeRequest {
            acknowledged_by: actor(actor_email, fallback_email),
        };
        self.transition(incident_id, "acknowledge", &body).await
    }

    async fn resolve_incident(
        &self,
        actor_email: Option<&str>,
        fallback_email: &str,
        incident_id: &str,
    ) -> Result<(), ClientError> {
        let body = ResolveRequest {
            resolved_by: actor(actor_email, fallback_email),
        };
        self.transition(incident_id, "resolve", &body).await
    }

    async fn check_health_endpoint(&self) -> Result<(), ClientError> {
        let response = self
            .retry
            .send("betterstack", || {
                self.request(Method::GET, "/api/v2/incidents")
            })
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ClientError::from_response(response).await);
        }
        Ok(())
    }
}
