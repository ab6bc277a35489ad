// ── Scheduled configuration changes ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DaemonId, ScheduledChangeId, UserId};

/// Configuration operations the transaction engine can carry out.
///
/// The variant names are persisted verbatim in scheduled change rows.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum Operation {
    KeaHostAdd,
    KeaHostUpdate,
    KeaHostDelete,
    KeaSubnetAdd,
    KeaSubnetUpdate,
    KeaSubnetDelete,
    KeaSharedNetworkAdd,
    KeaSharedNetworkUpdate,
    KeaSharedNetworkDelete,
    KeaGlobalParametersUpdate,
}

impl Operation {
    /// Adds create new entities and need neither a before-image nor locks.
    pub fn is_add(self) -> bool {
        matches!(
            self,
            Self::KeaHostAdd | Self::KeaSubnetAdd | Self::KeaSharedNetworkAdd
        )
    }
}

/// One update of a scheduled change as stored: the recipe is kept as an
/// opaque JSON document so the row survives schema drift of the in-memory
/// types until it is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedConfigUpdate {
    pub operation: Operation,
    pub daemon_ids: Vec<DaemonId>,
    pub recipe: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledConfigChange {
    pub id: ScheduledChangeId,
    pub created_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub user_id: UserId,
    pub updates: Vec<PersistedConfigUpdate>,
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ScheduledConfigChange {
    pub fn new(
        deadline_at: DateTime<Utc>,
        user_id: UserId,
        updates: Vec<PersistedConfigUpdate>,
    ) -> Self {
        Self {
            id: ScheduledChangeId::UNASSIGNED,
            created_at: Utc::now(),
            deadline_at,
            user_id,
            updates,
            executed: false,
            error: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.executed && self.deadline_at <= now
    }
}
