//! Notification correlation engine.
//!
//! Maps an inbound monitoring notification onto the open correlation
//! records and decides the remote action:
//!
//! - `PROBLEM` opens an incident unless one is already open for the key.
//! - `ACKNOWLEDGEMENT` acknowledges every incident open for the key.
//! - `RECOVERY` resolves every incident open for the same target and drops
//!   the records, whether or not the resolve call succeeded.
//! - Everything else is logged and ignored.
//!
//! Each branch holds the store lock from its scan until its last write,
//! including the remote calls in between. That serialises all notification
//! handling, but it is what keeps two concurrent `PROBLEM`s for the same key
//! from both creating an incident.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::event::{MonitoringNotification, NotificationType};
use crate::AppState;

/// What the engine did with a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// A new incident was opened and correlated.
    Created { incident_id: String, record_id: i64 },
    /// An incident is already open for this problem; nothing was done.
    Duplicate { incident_id: String },
    Acknowledged { incident_ids: Vec<String> },
    /// Records were dropped; `unresolved` lists incidents whose resolve call failed.
    Resolved {
        resolved: Vec<String>,
        unresolved: Vec<String>,
    },
    /// Notification type that drives no remote action, including unrecognised ones.
    Ignored { notification_type: String },
}

/// Validate a notification and apply it.
pub async fn handle_notification(
    state: &AppState,
    notification: &MonitoringNotification,
) -> Result<NotificationOutcome, AppError> {
    let missing = notification.missing_fields();
    if !missing.is_empty() {
        info!(missing = ?missing, "Notification missing required fields, ignoring");
        return Err(AppError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let incident_name = notification.incident_name();
    let notification_type = match notification.notification_type.parse::<NotificationType>() {
        Ok(parsed) => parsed,
        Err(reason) => {
            info!(incident = %incident_name, %reason, "Ignoring unrecognised notification type");
            return Ok(NotificationOutcome::Ignored {
                notification_type: notification.notification_type.trim().to_string(),
            });
        }
    };

    info!(
        incident = %incident_name,
        problem_id = %notification.problem_id,
        notification_type = %notification_type,
        "Incoming notification"
    );

    match notification_type {
        NotificationType::Problem => open_incident(state, notification, &incident_name).await,
        NotificationType::Acknowledgement => {
            acknowledge_incidents(state, notification, &incident_name).await
        }
        NotificationType::Recovery => resolve_incidents(state, notification, &incident_name).await,
        other => {
            info!(
                incident = %incident_name,
                notification_type = %other,
                "Ignoring notification type"
            );
            Ok(NotificationOutcome::Ignored {
                notification_type: other.as_str().to_string(),
            })
        }
    }
}

async fn open_incident(
    state: &AppState,
    notification: &MonitoringNotification,
    incident_name: &str,
) -> Result<NotificationOutcome, AppError> {
    if notification.problem_id.trim().is_empty() {
        return Err(AppError::Validation(
            "Missing required field \"problemId\"".to_string(),
        ));
    }

    let key = notification.correlation_key();
    let store = state.store.lock().await;

    let records = store.list_all().await?;
    if let Some(existing) = records.iter().find(|r| r.correlation_key() == key) {
        info!(
            key = %key,
            incident_id = %existing.remote_incident_id,
            "Ignoring superfluous notification for open incident"
        );
        return Ok(NotificationOutcome::Duplicate {
            incident_id: existing.remote_incident_id.clone(),
        });
    }

    info!(key = %key, incident = %incident_name, "Creating incident");
    let incident_id = state
        .incidents
        .create_incident(
            &notification.remote_policy_id,
            &state.relay.default_contact_email,
            incident_name,
            &notification.content,
        )
        .await
        .map_err(|e| {
            error!(key = %key, incident = %incident_name, error = %e, "Failed to create incident");
            e
        })?;

    let record = notification.to_new_record(NotificationType::Problem, incident_id.clone());
    let record_id = store.insert(&record).await.map_err(|e| {
        error!(
            key = %key,
            incident_id = %incident_id,
            error = %e,
            "Incident created but its correlation record was not stored"
        );
        e
    })?;

    info!(key = %key, incident_id = %incident_id, record_id, "Created incident");
    Ok(NotificationOutcome::Created {
        incident_id,
        record_id,
    })
}

async fn acknowledge_incidents(
    state: &AppState,
    notification: &MonitoringNotification,
    incident_name: &str,
) -> Result<NotificationOutcome, AppError> {
    let key = notification.correlation_key();
    let store = state.store.lock().await;

    let matches: Vec<_> = store
        .list_all()
        .await?
        .into_iter()
        .filter(|r| r.correlation_key() == key)
        .collect();

    if matches.is_empty() {
        info!(key = %key, incident = %incident_name, "No open incident to acknowledge");
    }

    let mut incident_ids = Vec::with_capacity(matches.len());
    let mut first_error = None;
    for record in &matches {
        let result = state
            .incidents
            .acknowledge_incident(
                notification.actor_email(),
                &state.relay.default_contact_email,
                &record.remote_incident_id,
            )
            .await;

        match result {
            Ok(()) => {
                info!(
                    key = %key,
                    incident_id = %record.remote_incident_id,
                    "Acknowledged incident"
                );
                incident_ids.push(record.remote_incident_id.clone());
            }
            Err(e) => {
                warn!(
                    key = %key,
                    incident_id = %record.remote_incident_id,
                    error = %e,
                    "Failed to acknowledge incident"
                );
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(NotificationOutcome::Acknowledged { incident_ids }),
    }
}

async fn resolve_incidents(
    state: &AppState,
    notification: &MonitoringNotification,
    incident_name: &str,
) -> Result<NotificationOutcome, AppError> {
    let target = notification.target();
    let store = state.store.lock().await;

    let matches: Vec<_> = store
        .list_all()
        .await?
        .into_iter()
        .filter(|r| r.is_same_target(&target))
        .collect();

    if matches.is_empty() {
        info!(incident = %incident_name, "No open incident to resolve");
    }

    let mut resolved = Vec::new();
    let mut unresolved = Vec::new();
    for record in matches {
        let result = state
            .incidents
            .resolve_incident(
                notification.actor_email(),
                &state.relay.default_contact_email,
                &record.remote_incident_id,
            )
            .await;

        match result {
            Ok(()) => {
                info!(
                    key = %record.correlation_key(),
                    incident_id = %record.remote_incident_id,
                    "Resolved incident"
                );
                resolved.push(record.remote_incident_id.clone());
            }
            Err(e) => {
                warn!(
                    key = %record.correlation_key(),
                    incident_id = %record.remote_incident_id,
                    error = %e,
                    "Failed to resolve incident, dropping its correlation anyway"
                );
                unresolved.push(record.remote_incident_id.clone());
            }
        }

        let removed = store.delete(record.id).await?;
        if removed != 1 {
            warn!(record_id = record.id, removed, "Unexpected row count deleting correlation");
        }
    }

    Ok(NotificationOutcome::Resolved {
        resolved,
        unresolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{state_with, FakeIncidents, FakeMonitoring};
    use std::sync::Arc;
    use std::time::Duration;

    fn notification(kind: &str) -> MonitoringNotification {
        MonitoringNotification {
            site_name: "a".into(),
            problem_id: "1".into(),
            hostname: "h1".into(),
            notification_type: kind.into(),
            remote_policy_id: "p1".into(),
            ..Default::default()
        }
    }

    fn fixture() -> (AppState, Arc<FakeIncidents>) {
        fixture_with(FakeIncidents::new())
    }

    fn fixture_with(incidents: FakeIncidents) -> (AppState, Arc<FakeIncidents>) {
        let incidents = Arc::new(incidents);
        let state = state_with(
            incidents.clone(),
            Arc::new(FakeMonitoring::with_open_problem()),
        );
        (state, incidents)
    }

    async fn open_records(state: &AppState) -> usize {
        state.store.lock().await.list_all().await.unwrap().len()
    }

    #[tokio::test]
    async fn problem_creates_incident_and_record() {
        let (state, incidents) = fixture();

        let outcome = handle_notification(&state, &notification("PROBLEM"))
            .await
            .unwrap();

        assert!(matches!(outcome, NotificationOutcome::Created { ref incident_id, .. } if incident_id == "inc-1"));
        let records = state.store.lock().await.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].problem_type, crate::models::event::ProblemType::Host);
        assert_eq!(records[0].remote_incident_id, "inc-1");
        assert_eq!(incidents.create_count(), 1);
    }

    #[tokio::test]
    async fn repeated_problem_is_a_no_op() {
        let (state, incidents) = fixture();
        let n = notification("PROBLEM");

        handle_notification(&state, &n).await.unwrap();
        let second = handle_notification(&state, &n).await.unwrap();

        assert_eq!(
            second,
            NotificationOutcome::Duplicate {
                incident_id: "inc-1".into()
            }
        );
        assert_eq!(incidents.create_count(), 1);
        assert_eq!(open_records(&state).await, 1);
    }

    #[tokio::test]
    async fn concurrent_problems_create_one_incident() {
        let mut fake = FakeIncidents::new();
        fake.create_delay = Some(Duration::from_millis(10));
        let (state, incidents) = fixture_with(fake);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move {
                    handle_notification(&state, &notification("PROBLEM")).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(incidents.create_count(), 1);
        assert_eq!(open_records(&state).await, 1);
    }

    #[tokio::test]
    async fn different_policies_are_different_problems() {
        let (state, incidents) = fixture();
        handle_notification(&state, &notification("PROBLEM")).await.unwrap();

        let mut other = notification("PROBLEM");
        other.remote_policy_id = "p2".into();
        handle_notification(&state, &other).await.unwrap();

        assert_eq!(incidents.create_count(), 2);
    }

    #[tokio::test]
    async fn problem_without_id_is_rejected() {
        let (state, incidents) = fixture();
        let mut n = notification("PROBLEM");
        n.problem_id = String::new();

        let err = handle_notification(&state, &n).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("problemId")));
        assert_eq!(incidents.create_count(), 0);
    }

    #[tokio::test]
    async fn failed_creation_persists_nothing() {
        let mut fake = FakeIncidents::new();
        fake.fail_create = true;
        let (state, _) = fixture_with(fake);

        let err = handle_notification(&state, &notification("PROBLEM"))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(open_records(&state).await, 0);
    }

    #[tokio::test]
    async fn missing_fields_are_validation_errors() {
        let (state, _) = fixture();
        let mut n = notification("PROBLEM");
        n.hostname = String::new();

        let err = handle_notification(&state, &n).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("hostname")));
    }

    #[tokio::test]
    async fn unrecognised_notification_type_is_ignored() {
        let (state, incidents) = fixture();
        handle_notification(&state, &notification("PROBLEM")).await.unwrap();

        let outcome = handle_notification(&state, &notification("SOMETHINGNEW"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            NotificationOutcome::Ignored {
                notification_type: "SOMETHINGNEW".into()
            }
        );
        assert_eq!(incidents.create_count(), 1);
        assert!(incidents.acknowledged().is_empty());
        assert!(incidents.resolved().is_empty());
        assert_eq!(open_records(&state).await, 1);
    }

    #[tokio::test]
    async fn acknowledgement_acks_matching_incident_and_keeps_record() {
        let (state, incidents) = fixture();
        handle_notification(&state, &notification("PROBLEM")).await.unwrap();

        let outcome = handle_notification(&state, &notification("ACKNOWLEDGEMENT"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            NotificationOutcome::Acknowledged {
                incident_ids: vec!["inc-1".into()]
            }
        );
        assert_eq!(incidents.acknowledged(), vec!["inc-1"]);
        assert_eq!(open_records(&state).await, 1);
    }

    #[tokio::test]
    async fn failed_acknowledgement_surfaces_and_keeps_record() {
        let mut fake = FakeIncidents::new();
        fake.fail_transitions = true;
        let (state, _) = fixture_with(fake);
        handle_notification(&state, &notification("PROBLEM")).await.unwrap();

        let err = handle_notification(&state, &notification("ACKNOWLEDGEMENT"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Remote(_)));
        assert_eq!(open_records(&state).await, 1);
    }

    #[tokio::test]
    async fn recovery_resolves_once_and_drops_record() {
        let (state, incidents) = fixture();
        handle_notification(&state, &notification("PROBLEM")).await.unwrap();

        // Recovery notifications may carry a different problem id.
        let mut recovery = notification("RECOVERY");
        recovery.problem_id = "2".into();
        let outcome = handle_notification(&state, &recovery).await.unwrap();

        assert_eq!(
            outcome,
            NotificationOutcome::Resolved {
                resolved: vec!["inc-1".into()],
                unresolved: vec![],
            }
        );
        assert_eq!(incidents.resolved(), vec!["inc-1"]);
        assert_eq!(open_records(&state).await, 0);
    }

    #[tokio::test]
    async fn recovery_drops_record_even_when_resolve_fails() {
        let mut fake = FakeIncidents::new();
        fake.fail_transitions = true;
        let (state, incidents) = fixture_with(fake);
        handle_notification(&state, &notification("PROBLEM")).await.unwrap();

        let outcome = handle_notification(&state, &notification("RECOVERY"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            NotificationOutcome::Resolved {
                resolved: vec![],
                unresolved: vec!["inc-1".into()],
            }
        );
        assert_eq!(incidents.resolved().len(), 1);
        assert_eq!(open_records(&state).await, 0);
    }

    #[tokio::test]
    async fn recovery_frees_key_for_a_new_problem() {
        let (state, incidents) = fixture();
        handle_notification(&state, &notification("PROBLEM")).await.unwrap();
        handle_notification(&state, &notification("RECOVERY")).await.unwrap();
        handle_notification(&state, &notification("PROBLEM")).await.unwrap();

        assert_eq!(incidents.create_count(), 2);
        let records = state.store.lock().await.list_all().await.unwrap();
        assert_eq!(records[0].remote_incident_id, "inc-2");
    }

    #[tokio::test]
    async fn recovery_for_other_service_leaves_record() {
        let (state, incidents) = fixture();
        handle_notification(&state, &notification("PROBLEM")).await.unwrap();

        let mut recovery = notification("RECOVERY");
        recovery.service_name = "disk".into();
        handle_notification(&state, &recovery).await.unwrap();

        assert!(incidents.resolved().is_empty());
        assert_eq!(open_records(&state).await, 1);
    }

    #[tokio::test]
    async fn flapping_and_downtime_are_ignored() {
        let (state, incidents) = fixture();
        for kind in ["FLAPPINGSTART", "DOWNTIMESTART", "DOWNTIMECANCELLED"] {
            let outcome = handle_notification(&state, &notification(kind)).await.unwrap();
            assert!(matches!(outcome, NotificationOutcome::Ignored { .. }));
        }
        assert_eq!(incidents.create_count(), 0);
        assert_eq!(open_records(&state).await, 0);
    }
}
