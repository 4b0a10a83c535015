//! In-process fakes for the remote API seams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::clients::{ClientError, HostState, IncidentApi, MonitoringApi, ServiceState};
use crate::config::{RelaySettings, DEFAULT_ACK_COMMENT};
use crate::db::{MemoryBackend, Store};
use crate::AppState;

#[derive(Default)]
pub struct FakeIncidents {
    pub created: AtomicUsize,
    pub acknowledged: Mutex<Vec<String>>,
    pub resolved: Mutex<Vec<String>>,
    pub fail_create: bool,
    pub fail_transitions: bool,
    pub create_delay: Option<Duration>,
    pub healthy: bool,
}

impl FakeIncidents {
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Self::default()
        }
    }

    pub fn create_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().unwrap().clone()
    }

    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

fn server_error() -> ClientError {
    ClientError::UnexpectedStatus {
        status: 500,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl IncidentApi for FakeIncidents {
    async fn create_incident(
        &self,
        _policy_id: &str,
        _requester_email: &str,
        _name: &str,
        _description: &str,
    ) -> Result<String, ClientError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create {
            return Err(ClientError::RateLimited { attempts: 11 });
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("inc-{n}"))
    }

    async fn acknowledge_incident(
        &self,
        _actor_email: Option<&str>,
        _fallback_email: &str,
        incident_id: &str,
    ) -> Result<(), ClientError> {
        self.acknowledged.lock().unwrap().push(incident_id.to_string());
        if self.fail_transitions {
            return Err(server_error());
        }
        Ok(())
    }

    async fn resolve_incident(
        &self,
        _actor_email: Option<&str>,
        _fallback_email: &str,
        incident_id: &str,
    ) -> Result<(), ClientError> {
        self.resolved.lock().unwrap().push(incident_id.to_string());
        if self.fail_transitions {
            return Err(server_error());
        }
        Ok(())
    }

    async fn check_health_endpoint(&self) -> Result<(), ClientError> {
        if self.healthy {
            Ok(())
        } else {
            Err(server_error())
        }
    }
}

pub struct FakeMonitoring {
    pub acknowledged: bool,
    pub alive: bool,
    pub host_acks: Mutex<Vec<String>>,
    pub service_acks: Mutex<Vec<(String, String)>>,
    pub hosts: Vec<HostState>,
    pub fail_queries: bool,
}

impl FakeMonitoring {
    /// A monitoring system where every target is in an unacknowledged problem state.
    pub fn with_open_problem() -> Self {
        Self {
            acknowledged: false,
            alive: false,
            host_acks: Mutex::new(Vec::new()),
            service_acks: Mutex::new(Vec::new()),
            hosts: vec![HostState {
                name: "h1".to_string(),
                acknowledged: false,
                alive: true,
                address: "10.0.0.1".to_string(),
                services: vec!["disk".to_string()],
            }],
            fail_queries: false,
        }
    }

    pub fn ack_count(&self) -> usize {
        self.host_acks.lock().unwrap().len() + self.service_acks.lock().unwrap().len()
    }
}

#[async_trait]
impl MonitoringApi for FakeMonitoring {
    async fn get_host_state(&self, host: &str) -> Result<HostState, ClientError> {
        if self.fail_queries {
            return Err(server_error());
        }
        Ok(HostState {
            name: host.to_string(),
            acknowledged: self.acknowledged,
            alive: self.alive,
            address: String::new(),
            services: Vec::new(),
        })
    }

    async fn get_service_state(
        &self,
        host: &str,
        service: &str,
    ) -> Result<ServiceState, ClientError> {
        if self.fail_queries {
            return Err(server_error());
        }
        Ok(ServiceState {
            display_name: service.to_string(),
            acknowledged: self.acknowledged,
            alive: self.alive,
            check_output: String::new(),
            host_name: host.to_string(),
            host_address: String::new(),
        })
    }

    async fn ack_host(&self, host: &str, _comment: &str) -> Result<(), ClientError> {
        self.host_acks.lock().unwrap().push(host.to_string());
        Ok(())
    }

    async fn ack_service(
        &self,
        host: &str,
        service: &str,
        _comment: &str,
    ) -> Result<(), ClientError> {
        self.service_acks
            .lock()
            .unwrap()
            .push((host.to_string(), service.to_string()));
        Ok(())
    }

    async fn list_hosts(&self) -> Result<Vec<HostState>, ClientError> {
        if self.fail_queries {
            return Err(server_error());
        }
        Ok(self.hosts.clone())
    }
}

pub fn state_with(incidents: Arc<FakeIncidents>, monitoring: Arc<FakeMonitoring>) -> AppState {
    AppState {
        store: Store::new(Arc::new(MemoryBackend::new()), std::env::temp_dir()),
        incidents,
        monitoring,
        relay: RelaySettings {
            default_contact_email: "ops@example.com".to_string(),
            ack_comment: DEFAULT_ACK_COMMENT.to_string(),
        },
    }
}
