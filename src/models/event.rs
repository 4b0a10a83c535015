//! Correlation records linking monitoring problems to remote incidents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

// -- Enums stored as TEXT --

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ProblemType {
    Host,
    Service,
}

impl ProblemType {
    /// A notification naming a service is a service problem, otherwise a host problem.
    pub fn from_service_name(service_name: &str) -> Self {
        if service_name.is_empty() {
            Self::Host
        } else {
            Self::Service
        }
    }
}

/// Nagios `$NOTIFICATIONTYPE$` values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationType {
    Problem,
    Recovery,
    Acknowledgement,
    FlappingStart,
    FlappingStop,
    FlappingDisabled,
    DowntimeStart,
    DowntimeEnd,
    DowntimeCancelled,
    Custom,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Problem => "PROBLEM",
            Self::Recovery => "RECOVERY",
            Self::Acknowledgement => "ACKNOWLEDGEMENT",
            Self::FlappingStart => "FLAPPINGSTART",
            Self::FlappingStop => "FLAPPINGSTOP",
            Self::FlappingDisabled => "FLAPPINGDISABLED",
            Self::DowntimeStart => "DOWNTIMESTART",
            Self::DowntimeEnd => "DOWNTIMEEND",
            Self::DowntimeCancelled => "DOWNTIMECANCELLED",
            Self::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.trim().to_ascii_uppercase().as_str() {
            "PROBLEM" => Self::Problem,
            "RECOVERY" => Self::Recovery,
            "ACKNOWLEDGEMENT" => Self::Acknowledgement,
            "FLAPPINGSTART" => Self::FlappingStart,
            "FLAPPINGSTOP" => Self::FlappingStop,
            "FLAPPINGDISABLED" => Self::FlappingDisabled,
            "DOWNTIMESTART" => Self::DowntimeStart,
            "DOWNTIMEEND" => Self::DowntimeEnd,
            "DOWNTIMECANCELLED" => Self::DowntimeCancelled,
            "CUSTOM" => Self::Custom,
            other => return Err(format!("Unknown notification type '{other}'")),
        };
        Ok(parsed)
    }
}

// -- Correlation record --

/// Full row from the events table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventCorrelationRecord {
    pub id: i64,
    pub site_name: String,
    pub problem_id: String,
    pub problem_type: ProblemType,
    pub hostname: String,
    pub service_name: String,
    pub service_display_name: String,
    pub content: String,
    pub notification_type: NotificationType,
    pub remote_policy_id: String,
    pub remote_incident_id: String,
    pub interacting_user_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EventCorrelationRecord {
    pub fn correlation_key(&self) -> CorrelationKey<'_> {
        CorrelationKey {
            site_name: &self.site_name,
            problem_id: &self.problem_id,
            problem_type: self.problem_type,
            remote_policy_id: &self.remote_policy_id,
        }
    }

    /// Recovery match: same monitored target under the same policy, any problem id.
    pub fn is_same_target(&self, target: &ProblemTarget<'_>) -> bool {
        self.site_name == target.site_name
            && self.problem_type == target.problem_type
            && self.hostname == target.hostname
            && self.service_name == target.service_name
            && self.remote_policy_id == target.remote_policy_id
    }
}

/// Insert DTO; the store assigns `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewEventRecord {
    pub site_name: String,
    pub problem_id: String,
    pub problem_type: ProblemType,
    pub hostname: String,
    pub service_name: String,
    pub service_display_name: String,
    pub content: String,
    pub notification_type: NotificationType,
    pub remote_policy_id: String,
    pub remote_incident_id: String,
    pub interacting_user_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewEventRecord {
    pub fn into_record(self, id: i64) -> EventCorrelationRecord {
        EventCorrelationRecord {
            id,
            site_name: self.site_name,
            problem_id: self.problem_id,
            problem_type: self.problem_type,
            hostname: self.hostname,
            service_name: self.service_name,
            service_display_name: self.service_display_name,
            content: self.content,
            notification_type: self.notification_type,
            remote_policy_id: self.remote_policy_id,
            remote_incident_id: self.remote_incident_id,
            interacting_user_email: self.interacting_user_email,
            created_at: self.created_at,
        }
    }
}

/// `(siteName, problemId, problemType, remotePolicyId)`: one open problem lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationKey<'a> {
    pub site_name: &'a str,
    pub problem_id: &'a str,
    pub problem_type: ProblemType,
    pub remote_policy_id: &'a str,
}

impl fmt::Display for CorrelationKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{:?}/{}",
            self.site_name, self.problem_id, self.problem_type, self.remote_policy_id
        )
    }
}

/// Monitored target a recovery applies to.
#[derive(Debug, Clone, Copy)]
pub struct ProblemTarget<'a> {
    pub site_name: &'a str,
    pub problem_type: ProblemType,
    pub hostname: &'a str,
    pub service_name: &'a str,
    pub remote_policy_id: &'a str,
}

// -- Inbound notification --

/// Notification posted by the monitoring system's notification command.
///
/// Accepts both the current camelCase names and the legacy `nagios*` /
/// `betterStack*` field names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringNotification {
    #[serde(default, alias = "nagiosSiteName")]
    pub site_name: String,
    #[serde(
        default,
        alias = "nagiosProblemId",
        deserialize_with = "string_or_number"
    )]
    pub problem_id: String,
    #[serde(default, alias = "nagiosProblemHostname")]
    pub hostname: String,
    #[serde(default, alias = "nagiosProblemServiceName")]
    pub service_name: String,
    #[serde(default, alias = "nagiosProblemServiceDisplayName")]
    pub service_display_name: String,
    #[serde(default, alias = "nagiosProblemContent")]
    pub content: String,
    #[serde(default, alias = "nagiosProblemNotificationType")]
    pub notification_type: String,
    #[serde(default, alias = "betterStackPolicyId")]
    pub remote_policy_id: String,
    #[serde(default)]
    pub interacting_user_email: Option<String>,
}

impl MonitoringNotification {
    /// Names of required fields that are missing or empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.site_name.trim().is_empty() {
            missing.push("siteName");
        }
        if self.notification_type.trim().is_empty() {
            missing.push("notificationType");
        }
        if self.hostname.trim().is_empty() {
            missing.push("hostname");
        }
        if self.remote_policy_id.trim().is_empty() {
            missing.push("remotePolicyId");
        }
        missing
    }

    pub fn problem_type(&self) -> ProblemType {
        ProblemType::from_service_name(&self.service_name)
    }

    pub fn correlation_key(&self) -> CorrelationKey<'_> {
        CorrelationKey {
            site_name: &self.site_name,
            problem_id: &self.problem_id,
            problem_type: self.problem_type(),
            remote_policy_id: &self.remote_policy_id,
        }
    }

    pub fn target(&self) -> ProblemTarget<'_> {
        ProblemTarget {
            site_name: &self.site_name,
            problem_type: self.problem_type(),
            hostname: &self.hostname,
            service_name: &self.service_name,
            remote_policy_id: &self.remote_policy_id,
        }
    }

    pub fn incident_name(&self) -> String {
        incident_name(&self.hostname, &self.service_name, &self.service_display_name)
    }

    /// Interacting user's email, if one was supplied.
    pub fn actor_email(&self) -> Option<&str> {
        self.interacting_user_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    pub fn to_new_record(
        &self,
        notification_type: NotificationType,
        remote_incident_id: String,
    ) -> NewEventRecord {
        NewEventRecord {
            site_name: self.site_name.clone(),
            problem_id: self.problem_id.clone(),
            problem_type: self.problem_type(),
            hostname: self.hostname.clone(),
            service_name: self.service_name.clone(),
            service_display_name: self.service_display_name.clone(),
            content: self.content.clone(),
            notification_type,
            remote_policy_id: self.remote_policy_id.clone(),
            remote_incident_id,
            interacting_user_email: self.actor_email().map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

/// `[host] - [service]` for service problems, `[host]` otherwise.
pub fn incident_name(hostname: &str, service_name: &str, service_display_name: &str) -> String {
    if service_name.is_empty() {
        return format!("[{hostname}]");
    }
    let display = service_display_name.trim();
    let service = if display.is_empty() {
        service_name
    } else {
        display
    };
    format!("[{hostname}] - [{service}]")
}

/// Nagios macros render problem ids as bare numbers; keep them as strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
        Null,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
        Raw::Null => String::new(),
    })
}
