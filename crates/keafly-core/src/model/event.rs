// ── Operator-facing events ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DaemonId, EventId, MachineId, SubnetId};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventLevel {
    #[default]
    Info,
    Warning,
    Error,
}

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub created_at: DateTime<Utc>,
    pub level: EventLevel,
    pub text: String,
    #[serde(default)]
    pub daemon_id: Option<DaemonId>,
    #[serde(default)]
    pub machine_id: Option<MachineId>,
    #[serde(default)]
    pub subnet_id: Option<SubnetId>,
    #[serde(default)]
    pub details: Option<String>,
}

/// An event that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewEvent {
    pub level: EventLevel,
    pub text: String,
    pub daemon_id: Option<DaemonId>,
    pub machine_id: Option<MachineId>,
    pub subnet_id: Option<SubnetId>,
    pub details: Option<String>,
}

impl NewEvent {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Warning,
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Error,
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn for_daemon(mut self, daemon_id: DaemonId, machine_id: MachineId) -> Self {
        self.daemon_id = Some(daemon_id);
        self.machine_id = Some(machine_id);
        self
    }

    pub fn for_subnet(mut self, subnet_id: SubnetId) -> Self {
        self.subnet_id = Some(subnet_id);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Stamp with store identity and creation time.
    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> Event {
        Event {
            id,
            created_at,
            level: self.level,
            text: self.text,
            daemon_id: self.daemon_id,
            machine_id: self.machine_id,
            subnet_id: self.subnet_id,
            details: self.details,
        }
    }
}
