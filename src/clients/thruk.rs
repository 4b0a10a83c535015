//! Nagios client over the Thruk REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ClientError, HostState, MonitoringApi, RetryPolicy, ServiceState};

#[derive(Debug, Clone)]
pub struct ThrukClient {
    client: Client,
    api_user: String,
    api_key: String,
    base_url: Url,
    site_name: String,
    retry: RetryPolicy,
}

/// Row from `/thruk/r/hosts`.
#[derive(Debug, Deserialize)]
struct ThrukHost {
    #[serde(default)]
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    acknowledged: i64,
    #[serde(default)]
    state: i64,
    #[serde(default)]
    address: String,
    #[serde(default)]
    services: Vec<String>,
}

impl From<ThrukHost> for HostState {
    fn from(h: ThrukHost) -> Self {
        let name = if h.name.is_empty() { h.display_name } else { h.name };
        Self {
            name,
            acknowledged: h.acknowledged != 0,
            alive: h.state == 0,
            address: h.address,
            services: h.services,
        }
    }
}

/// Row from `/thruk/r/services`.
#[derive(Debug, Deserialize)]
struct ThrukService {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    acknowledged: i64,
    #[serde(default)]
    state: i64,
    #[serde(default)]
    plugin_output: String,
    #[serde(default)]
    host_name: String,
    #[serde(default)]
    host_address: String,
}

impl From<ThrukService> for ServiceState {
    fn from(s: ThrukService) -> Self {
        Self {
            display_name: s.display_name,
            acknowledged: s.acknowledged != 0,
            alive: s.state == 0,
            check_output: s.plugin_output,
            host_name: s.host_name,
            host_address: s.host_address,
        }
    }
}

#[derive(Debug, Serialize)]
struct HostAckCommand<'a> {
    comment_data: &'a str,
}

#[derive(Debug, Serialize)]
struct ServiceAckCommand<'a> {
    cmd: &'static str,
    host: &'a str,
    service: &'a str,
    comment_data: &'a str,
}

impl ThrukClient {
    pub fn new(
        api_user: impl Into<String>,
        api_key: impl Into<String>,
        base_url: &str,
        site_name: impl Into<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_user: api_user.into(),
            api_key: api_key.into(),
            base_url,
            site_name: site_name.into(),
            retry,
        })
    }

    /// `<base>/<site>/thruk/r/<segments...>`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push(&self.site_name)
                .extend(["thruk", "r"])
                .extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("X-Thruk-Auth-User", &self.api_user)
            .header("X-Thruk-Auth-Key", &self.api_key)
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ClientError> {
        let response = self
            .retry
            .send("thruk", || {
                self.request(Method::GET, url.clone()).query(query)
            })
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("Thruk rows: {e}")))
    }

    async fn post_command<T: Serialize + Sync>(&self, url: Url, body: &T) -> Result<(), ClientError> {
        let response = self
            .retry
            .send("thruk", || {
                self.request(Method::POST, url.clone()).json(body)
            })
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(())
    }
}

/// The query must identify exactly one object.
fn exactly_one<T>(mut rows: Vec<T>, kind: &'static str, query: String) -> Result<T, ClientError> {
    if rows.len() != 1 {
        return Err(ClientError::NotExactlyOne {
            kind,
            query,
            found: rows.len(),
        });
    }
    Ok(rows.remove(0))
}

#[async_trait]
impl MonitoringApi for ThrukClient {
    async fn get_host_state(&self, host: &str) -> Result<HostState, ClientError> {
        let rows: Vec<ThrukHost> = self
            .get_rows(self.url(&["hosts"]), &[("name", host)])
            .await?;
        exactly_one(rows, "host", host.to_string()).map(HostState::from)
    }

    async fn get_service_state(
        &self,
        host: &str,
        service: &str,
    ) -> Result<ServiceState, ClientError> {
        let rows: Vec<ThrukService> = self
            .get_rows(
                self.url(&["services"]),
                &[("host_name", host), ("description", service)],
            )
            .await?;
        exactly_one(rows, "service", format!("{host}/{service}")).map(ServiceState::from)
    }

    async fn ack_host(&self, host: &str, comment: &str) -> Result<(), ClientError> {
        let url = self.url(&["hosts", host, "cmd", "acknowledge_host_problem"]);
        let command = HostAckCommand {
            comment_data: comment,
        };
        self.post_command(url, &command).await?;
        tracing::info!(host, "Acknowledged host problem in Nagios");
        Ok(())
    }

    async fn ack_service(&self, host: &str, service: &str, comment: &str) -> Result<(), ClientError> {
        let command = ServiceAckCommand {
            cmd: "acknowledge_svc_problem",
            host,
            service,
            comment_data: comment,
        };
        self.post_command(self.url(&["cmd"]), &command).await?;
        tracing::info!(host, service, "Acknowledged service problem in Nagios");
        Ok(())
    }

    async fn list_hosts(&self) -> Result<Vec<HostState>, ClientError> {
        let rows: Vec<ThrukHost> = self.get_rows(self.url(&["hosts"]), &[]).await?;
        Ok(rows.into_iter().map(HostState::from).collect())
    }
}
