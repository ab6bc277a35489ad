// ── Runtime control plane configuration ──
//
// Describes the fleet to monitor and how hard to poll it. Built by the
// CLI from a loaded profile and handed to `ControlPlane`; core never
// reads configuration files.

use std::time::Duration;

use keafly_api::TransportConfig;

use crate::config_tx::DEFAULT_COMMAND_TIMEOUT;
use crate::leases::DEFAULT_LEASE_CONCURRENCY;
use crate::model::DaemonName;
use crate::reconcile::REFRESH_TIMEOUT;

/// What the due-scanner does with a change whose daemons are locked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockPolicy {
    /// Leave the change for the next pass.
    #[default]
    Postpone,
    /// Mark the change executed with the contention error.
    FailFast,
}

/// One machine running a Kea control agent.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub address: String,
    pub agent_port: u16,
    /// `http` or `https`.
    pub scheme: String,
    pub name: Option<String>,
    /// Daemons expected behind the control agent.
    pub daemons: Vec<DaemonName>,
    /// Overrides the default transport (credentials, TLS) for this machine.
    pub transport: Option<TransportConfig>,
}

impl MachineConfig {
    pub fn new(address: impl Into<String>, agent_port: u16) -> Self {
        Self {
            address: address.into(),
            agent_port,
            scheme: "http".into(),
            name: None,
            daemons: vec![DaemonName::Dhcp4],
            transport: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    pub machines: Vec<MachineConfig>,
    pub transport: TransportConfig,
    /// Deadline of each transaction command.
    pub command_timeout: Duration,
    /// Deadline of the combined version/config/status call.
    pub refresh_timeout: Duration,
    /// Zero disables the puller.
    pub state_pull_interval: Duration,
    /// Zero disables the puller.
    pub stats_pull_interval: Duration,
    /// Zero disables the due-scanner.
    pub due_scan_interval: Duration,
    pub lease_concurrency: usize,
    pub lock_policy: LockPolicy,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            machines: Vec::new(),
            transport: TransportConfig::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            refresh_timeout: REFRESH_TIMEOUT,
            state_pull_interval: Duration::from_secs(30),
            stats_pull_interval: Duration::from_secs(60),
            due_scan_interval: Duration::from_secs(10),
            lease_concurrency: DEFAULT_LEASE_CONCURRENCY,
            lock_policy: LockPolicy::default(),
        }
    }
}
