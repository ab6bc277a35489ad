// ── Machine and daemon domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::ids::{DaemonId, MachineId};
use crate::keaconfig::KeaConfig;
use crate::version::KeaVersion;

/// Address family of a DHCP scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::V4 => 4,
            Self::V6 => 6,
        }
    }

    /// The DHCP daemon serving this family.
    pub fn daemon_name(self) -> DaemonName {
        match self {
            Self::V4 => DaemonName::Dhcp4,
            Self::V6 => DaemonName::Dhcp6,
        }
    }

    /// Suffix used in command names (`subnet4-add`, `network6-del`).
    pub fn suffix(self) -> char {
        match self {
            Self::V4 => '4',
            Self::V6 => '6',
        }
    }
}

impl From<Family> for u8 {
    fn from(family: Family) -> Self {
        family.as_u8()
    }
}

impl TryFrom<u8> for Family {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            4 => Ok(Self::V4),
            6 => Ok(Self::V6),
            other => Err(format!("invalid address family {other}")),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_u8())
    }
}

/// Kea daemon kinds.
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
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DaemonName {
    Dhcp4,
    Dhcp6,
    Ca,
    D2,
}

impl DaemonName {
    pub fn is_dhcp(self) -> bool {
        matches!(self, Self::Dhcp4 | Self::Dhcp6)
    }

    pub fn family(self) -> Option<Family> {
        match self {
            Self::Dhcp4 => Some(Family::V4),
            Self::Dhcp6 => Some(Family::V6),
            Self::Ca | Self::D2 => None,
        }
    }

    /// Name of the top-level key in this daemon's configuration.
    pub fn config_root(self) -> &'static str {
        match self {
            Self::Dhcp4 => "Dhcp4",
            Self::Dhcp6 => "Dhcp6",
            Self::Ca => "Control-agent",
            Self::D2 => "DhcpDdns",
        }
    }
}

/// A host running a Kea control agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub address: String,
    pub agent_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPointType {
    Control,
    Statistics,
}

/// Endpoint through which a daemon is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    #[serde(rename = "type")]
    pub kind: AccessPointType,
    pub address: String,
    pub port: u16,
    pub scheme: String,
}

impl AccessPoint {
    pub fn control(address: impl Into<String>, port: u16) -> Self {
        Self {
            kind: AccessPointType::Control,
            address: address.into(),
            port,
            scheme: "http".into(),
        }
    }
}

/// A logger output configured on a daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTarget {
    pub name: String,
    pub severity: String,
    pub output: String,
}

/// A monitored Kea daemon.
///
/// Snapshots are replaced wholesale by the reconciler; the configuration
/// is shared read-only between components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Daemon {
    pub id: DaemonId,
    pub machine_id: MachineId,
    pub name: DaemonName,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub extended_version: Option<String>,
    pub active: bool,
    pub monitored: bool,
    #[serde(default)]
    pub uptime: i64,
    #[serde(default)]
    pub reloaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub access_points: Vec<AccessPoint>,
    #[serde(default)]
    pub config: Option<Arc<KeaConfig>>,
    #[serde(default)]
    pub config_hash: Option<String>,
    #[serde(default)]
    pub log_targets: Vec<LogTarget>,
}

impl Daemon {
    /// A freshly enrolled daemon that has not been contacted yet.
    pub fn new(machine_id: MachineId, name: DaemonName, access_point: AccessPoint) -> Self {
        Self {
            id: DaemonId::UNASSIGNED,
            machine_id,
            name,
            version: None,
            extended_version: None,
            active: false,
            monitored: true,
            uptime: 0,
            reloaded_at: None,
            access_points: vec![access_point],
            config: None,
            config_hash: None,
            log_targets: Vec::new(),
        }
    }

    pub fn control_access_point(&self) -> Option<&AccessPoint> {
        self.access_points
            .iter()
            .find(|ap| ap.kind == AccessPointType::Control)
    }

    /// Parsed daemon version, if known and well-formed.
    pub fn kea_version(&self) -> Option<KeaVersion> {
        self.version.as_deref().and_then(KeaVersion::parse)
    }

    pub fn family(&self) -> Option<Family> {
        self.name.family()
    }

    /// Returns `true` when the configuration loads a hook library whose
    /// file name contains `library`.
    pub fn has_hook(&self, library: &str) -> bool {
        self.config
            .as_ref()
            .is_some_and(|config| config.has_hook(library))
    }

    /// Lease queries require the lease_cmds hook on a DHCP daemon.
    pub fn supports_lease_queries(&self) -> bool {
        self.name.is_dhcp() && self.has_hook("libdhcp_lease_cmds")
    }
}

impl fmt::Display for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.control_access_point() {
            Some(ap) => write!(f, "{} daemon {} at {}:{}", self.name, self.id, ap.address, ap.port),
            None => write!(f, "{} daemon {}", self.name, self.id),
        }
    }
}
