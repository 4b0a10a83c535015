//! Deep health check across the store and both remote systems.

use std::fmt;

use chrono::Utc;
use serde::Serialize;

use crate::models::event::{NewEventRecord, NotificationType, ProblemType};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentState {
    Healthy,
    Unhealthy,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "HEALTHY",
            Self::Unhealthy => "UNHEALTHY",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub succeeded: bool,
    pub message: String,
}

/// Checks for one dependency. Any failure marks the component unhealthy.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub state: ComponentState,
    pub checks: Vec<CheckResult>,
}

impl ComponentHealth {
    fn new() -> Self {
        Self {
            state: ComponentState::Healthy,
            checks: Vec::new(),
        }
    }

    fn success(&mut self, message: impl Into<String>) {
        self.checks.push(CheckResult {
            succeeded: true,
            message: message.into(),
        });
    }

    fn failure(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "Health check failed");
        self.state = ComponentState::Unhealthy;
        self.checks.push(CheckResult {
            succeeded: false,
            message,
        });
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub database: ComponentHealth,
    pub monitoring: ComponentHealth,
    pub incidents: ComponentHealth,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        [&self.database, &self.monitoring, &self.incidents]
            .iter()
            .all(|c| c.state == ComponentState::Healthy)
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("Database", &self.database),
            ("Nagios", &self.monitoring),
            ("BetterStack", &self.incidents),
        ];
        for (i, (title, component)) in sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{title}: {}", component.state)?;
            for check in &component.checks {
                let label = if check.succeeded { "SUCCESS" } else { "FAILURE" };
                writeln!(f, "  - {label}: {}", check.message)?;
            }
        }
        Ok(())
    }
}

/// Run every check and collect the results. Never fails itself.
pub async fn check(state: &AppState) -> HealthReport {
    HealthReport {
        database: check_store(state).await,
        monitoring: check_monitoring(state).await,
        incidents: check_incidents(state).await,
    }
}

fn probe_record() -> NewEventRecord {
    NewEventRecord {
        site_name: "__health__".to_string(),
        problem_id: String::new(),
        problem_type: ProblemType::Host,
        hostname: String::new(),
        service_name: String::new(),
        service_display_name: String::new(),
        content: String::new(),
        notification_type: NotificationType::Custom,
        remote_policy_id: String::new(),
        remote_incident_id: String::new(),
        interacting_user_email: None,
        created_at: Utc::now(),
    }
}

async fn check_store(state: &AppState) -> ComponentHealth {
    let mut health = ComponentHealth::new();
    let store = state.store.lock().await;

    match store.list_all().await {
        Ok(_) => health.success("Listed event records"),
        Err(e) => health.failure(format!("Failed to list event records: {e}")),
    }

    let id = match store.insert(&probe_record()).await {
        Ok(id) => {
            health.success("Inserted probe record");
            id
        }
        Err(e) => {
            health.failure(format!("Failed to insert probe record: {e}"));
            return health;
        }
    };

    match store.delete(id).await {
        Ok(1) => health.success("Deleted probe record"),
        Ok(n) => health.failure(format!(
            "Failed to delete probe record: expected 1 row affected, got {n}"
        )),
        Err(e) => health.failure(format!("Failed to delete probe record: {e}")),
    }

    health
}

async fn check_monitoring(state: &AppState) -> ComponentHealth {
    let mut health = ComponentHealth::new();

    let hosts = match state.monitoring.list_hosts().await {
        Ok(hosts) => {
            health.success(format!("Listed {} hosts from Nagios", hosts.len()));
            hosts
        }
        Err(e) => {
            health.failure(format!("Failed to list hosts from Nagios: {e}"));
            return health;
        }
    };

    let sample = hosts
        .iter()
        .find_map(|h| h.services.first().map(|s| (h.name.as_str(), s.as_str())));
    let Some((host, service)) = sample else {
        health.success("No host with services to sample");
        return health;
    };

    match state.monitoring.get_service_state(host, service).await {
        Ok(_) => health.success(format!(
            "Got Nagios service state for HOST=\"{host}\" SERVICE=\"{service}\""
        )),
        Err(e) => health.failure(format!(
            "Failed to get Nagios service state for HOST=\"{host}\" SERVICE=\"{service}\": {e}"
        )),
    }

    health
}

async fn check_incidents(state: &AppState) -> ComponentHealth {
    let mut health = ComponentHealth::new();
    match state.incidents.check_health_endpoint().await {
        Ok(()) => health.success("BetterStack incidents endpoint returned status 200"),
        Err(e) => health.failure(format!(
            "Failed to check BetterStack incidents endpoint: {e}"
        )),
    }
    health
}
