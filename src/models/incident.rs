//! Incident-state webhook payloads sent by Better Stack.

use serde::{Deserialize, Serialize};

/// Incident status values carried by the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Started,
    Acknowledged,
    Resolved,
    #[serde(other)]
    Other,
}

impl IncidentStatus {
    /// Only acknowledgement and resolution are mirrored back onto monitoring.
    pub fn triggers_reverse_sync(&self) -> bool {
        matches!(self, Self::Acknowledged | Self::Resolved)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncidentWebhookPayload {
    pub data: IncidentWebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncidentWebhookData {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub attributes: IncidentWebhookAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncidentWebhookAttributes {
    #[serde(default)]
    pub name: String,
    pub status: IncidentStatus,
}
