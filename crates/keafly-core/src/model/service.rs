// ── HA service domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::daemon::DaemonName;
use super::ids::{DaemonId, ServiceId};

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
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HaMode {
    LoadBalancing,
    HotStandby,
    PassiveBackup,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HaRole {
    Primary,
    Secondary,
    Standby,
    Backup,
}

impl HaRole {
    /// Roles whose server shares the lease database of an active peer
    /// without serving clients itself.
    pub fn is_passive(self) -> bool {
        matches!(self, Self::Standby | Self::Backup)
    }
}

/// A member of an HA relationship as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HaPeer {
    pub name: String,
    pub url: String,
    pub role: HaRole,
}

/// Last known HA state of one server in a relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    pub last_state: Option<String>,
    #[serde(default)]
    pub last_scopes: Vec<String>,
    pub status_time: Option<DateTime<Utc>>,
    /// When the partner of this server was last taken over (`partner-down`).
    pub failover_at: Option<DateTime<Utc>>,
    pub in_touch: Option<bool>,
    pub comm_interrupted: Option<bool>,
    pub connecting_clients: Option<i64>,
    pub unacked_clients: Option<i64>,
    pub unacked_clients_left: Option<i64>,
    pub analyzed_packets: Option<i64>,
}

/// An HA relationship between daemons, keyed by (type, relationship).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub ha_type: DaemonName,
    pub relationship: String,
    pub mode: HaMode,
    #[serde(default)]
    pub peers: Vec<HaPeer>,
    pub primary_id: Option<DaemonId>,
    /// Secondary (load-balancing) or standby (hot-standby) server.
    pub secondary_id: Option<DaemonId>,
    #[serde(default)]
    pub backup_ids: BTreeSet<DaemonId>,
    #[serde(default)]
    pub primary_status: PeerStatus,
    #[serde(default)]
    pub secondary_status: PeerStatus,
    pub created_at: DateTime<Utc>,
}

impl Service {
    pub fn new(ha_type: DaemonName, relationship: impl Into<String>, mode: HaMode) -> Self {
        Self {
            id: ServiceId::UNASSIGNED,
            ha_type,
            relationship: relationship.into(),
            mode,
            peers: Vec::new(),
            primary_id: None,
            secondary_id: None,
            backup_ids: BTreeSet::new(),
            primary_status: PeerStatus::default(),
            secondary_status: PeerStatus::default(),
            created_at: Utc::now(),
        }
    }

    /// Display name of the service.
    pub fn name(&self) -> String {
        format!("{}/{}", self.ha_type, self.relationship)
    }

    pub fn daemon_ids(&self) -> Vec<DaemonId> {
        self.primary_id
            .into_iter()
            .chain(self.secondary_id)
            .chain(self.backup_ids.iter().copied())
            .collect()
    }

    pub fn contains_daemon(&self, daemon_id: DaemonId) -> bool {
        self.primary_id == Some(daemon_id)
            || self.secondary_id == Some(daemon_id)
            || self.backup_ids.contains(&daemon_id)
    }

    pub fn is_empty(&self) -> bool {
        self.primary_id.is_none() && self.secondary_id.is_none() && self.backup_ids.is_empty()
    }

    /// Role the daemon plays in this relationship.
    pub fn role_of(&self, daemon_id: DaemonId) -> Option<HaRole> {
        if self.primary_id == Some(daemon_id) {
            Some(HaRole::Primary)
        } else if self.secondary_id == Some(daemon_id) {
            Some(match self.mode {
                HaMode::HotStandby => HaRole::Standby,
                HaMode::LoadBalancing | HaMode::PassiveBackup => HaRole::Secondary,
            })
        } else if self.backup_ids.contains(&daemon_id) {
            Some(HaRole::Backup)
        } else {
            None
        }
    }

    /// Place a daemon in the slot for `role`; the primary slot is never
    /// taken by another role.
    pub fn assign(&mut self, daemon_id: DaemonId, role: HaRole) {
        match role {
            HaRole::Primary => self.primary_id = Some(daemon_id),
            HaRole::Secondary | HaRole::Standby => self.secondary_id = Some(daemon_id),
            HaRole::Backup => {
                self.backup_ids.insert(daemon_id);
            }
        }
    }

    pub fn remove_daemon(&mut self, daemon_id: DaemonId) {
        if self.primary_id == Some(daemon_id) {
            self.primary_id = None;
            self.primary_status = PeerStatus::default();
        }
        if self.secondary_id == Some(daemon_id) {
            self.secondary_id = None;
            self.secondary_status = PeerStatus::default();
        }
        self.backup_ids.remove(&daemon_id);
    }

    /// Peer lists compared independently of order.
    pub fn same_peers(&self, peers: &[HaPeer]) -> bool {
        let mut mine = self.peers.clone();
        let mut theirs = peers.to_vec();
        mine.sort();
        theirs.sort();
        mine == theirs
    }

    pub fn status_mut(&mut self, role: HaRole) -> Option<&mut PeerStatus> {
        match role {
            HaRole::Primary => Some(&mut self.primary_status),
            HaRole::Secondary | HaRole::Standby => Some(&mut self.secondary_status),
            HaRole::Backup => None,
        }
    }
}
