//! Mirrors incident acknowledgement and resolution back onto Nagios.

use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::event::ProblemType;
use crate::models::incident::{IncidentStatus, IncidentWebhookPayload};
use crate::AppState;

/// What reverse sync did with a webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReverseSyncOutcome {
    /// Status does not drive reverse sync.
    Ignored { status: IncidentStatus },
    /// An acknowledgement was issued on the monitoring side.
    Acknowledged {
        hostname: String,
        service_name: Option<String>,
    },
    /// Target was already acknowledged or already OK.
    AlreadyHandled {
        hostname: String,
        service_name: Option<String>,
    },
}

/// Acknowledge the monitoring problem behind an acknowledged or resolved incident.
///
/// The store lock is held only for the record lookup. The state query and
/// the acknowledge command are two separate calls, so a concurrent change on
/// the monitoring side can slip in between them.
pub async fn handle_incident_event(
    state: &AppState,
    payload: &IncidentWebhookPayload,
) -> Result<ReverseSyncOutcome, AppError> {
    let incident_id = payload.data.id.as_str();
    let status = &payload.data.attributes.status;

    if !status.triggers_reverse_sync() {
        info!(incident_id, status = ?status, "Ignoring incident status");
        return Ok(ReverseSyncOutcome::Ignored {
            status: status.clone(),
        });
    }

    let record = {
        let store = state.store.lock().await;
        store.find_by_incident_id(incident_id).await?
    };
    let Some(record) = record else {
        warn!(incident_id, status = ?status, "No open event correlates with incident");
        return Err(AppError::CorrelationNotFound(incident_id.to_string()));
    };

    let comment = state.relay.ack_comment.as_str();
    let hostname = record.hostname.clone();

    match record.problem_type {
        ProblemType::Host => {
            let host = state.monitoring.get_host_state(&hostname).await?;
            if host.acknowledged || host.alive {
                info!(
                    incident_id,
                    host = %hostname,
                    acknowledged = host.acknowledged,
                    alive = host.alive,
                    "Host needs no acknowledgement"
                );
                return Ok(ReverseSyncOutcome::AlreadyHandled {
                    hostname,
                    service_name: None,
                });
            }
            state.monitoring.ack_host(&hostname, comment).await?;
            info!(incident_id, host = %hostname, "Acknowledged host from incident event");
            Ok(ReverseSyncOutcome::Acknowledged {
                hostname,
                service_name: None,
            })
        }
        ProblemType::Service => {
            let service_name = record.service_name.clone();
            let service = state
                .monitoring
                .get_service_state(&hostname, &service_name)
                .await?;
            if service.acknowledged || service.alive {
                info!(
                    incident_id,
                    host = %hostname,
                    service = %service_name,
                    acknowledged = service.acknowledged,
                    alive = service.alive,
                    "Service needs no acknowledgement"
                );
                return Ok(ReverseSyncOutcome::AlreadyHandled {
                    hostname,
                    service_name: Some(service_name),
                });
            }
            state
                .monitoring
                .ack_service(&hostname, &service_name, comment)
                .await?;
            info!(
                incident_id,
                host = %hostname,
                service = %service_name,
                "Acknowledged service from incident event"
            );
            Ok(ReverseSyncOutcome::Acknowledged {
                hostname,
                service_name: Some(service_name),
            })
        }
    }
}
