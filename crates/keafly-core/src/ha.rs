// ── HA service detection ──
//
// Turns the HA hook parameters of a refreshed daemon into Service
// proposals, merges proposals into persisted services, and folds
// `status-get` HA reports into per-role status.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{Daemon, DaemonId, HaPeer, HaRole, Service, ServiceId};
use crate::reconcile::seconds_before;

/// One Service proposal per HA relationship the daemon declares.
///
/// A daemon without the HA hook yields no proposals. A malformed HA block
/// or a relationship that does not list this server among its peers is a
/// soft error: the caller keeps the daemon but treats it as non-HA.
pub fn detect_services(daemon: &Daemon) -> Result<Vec<Service>, CoreError> {
    if !daemon.name.is_dhcp() {
        return Ok(Vec::new());
    }
    let Some(config) = daemon.config.as_deref() else {
        return Ok(Vec::new());
    };
    let Some(relationships) = config.ha_configs()? else {
        return Ok(Vec::new());
    };

    relationships
        .iter()
        .map(|ha| {
            let local = ha.this_peer().ok_or_else(|| {
                CoreError::validation(format!(
                    "HA peer {} not found in the peers list of {daemon}",
                    ha.this_server_name
                ))
            })?;
            let mut service = Service::new(daemon.name, ha.relationship_name(), ha.mode);
            service.peers = ha
                .peers
                .iter()
                .map(|p| HaPeer {
                    name: p.name.clone(),
                    url: p.url.clone(),
                    role: p.role,
                })
                .collect();
            service.assign(daemon.id, local.role);
            Ok(service)
        })
        .collect()
}

/// Outcome of merging a proposal into the persisted service with the same
/// (type, relationship) key.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceMerge {
    /// No service with this key yet.
    Create(Service),
    /// The daemon joins the existing service.
    Join(Service),
    /// Mode or peers changed: the old service is dropped for the proposal.
    Replace { old: ServiceId, service: Service },
}

pub fn merge_proposal(
    existing: Option<&Service>,
    proposal: Service,
    daemon_id: DaemonId,
) -> ServiceMerge {
    let Some(existing) = existing else {
        return ServiceMerge::Create(proposal);
    };
    if existing.mode != proposal.mode || !existing.same_peers(&proposal.peers) {
        debug!(
            relationship = %proposal.relationship,
            old_mode = %existing.mode,
            new_mode = %proposal.mode,
            "HA relationship reconfigured"
        );
        return ServiceMerge::Replace {
            old: existing.id,
            service: proposal,
        };
    }
    let mut joined = existing.clone();
    if let Some(role) = proposal.role_of(daemon_id) {
        joined.assign(daemon_id, role);
    }
    ServiceMerge::Join(joined)
}

// ── HA status ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HaRelationshipStatus {
    ha_servers: HaServers,
}

#[derive(Debug, Clone, Deserialize)]
struct HaServers {
    local: LocalServerStatus,
    remote: Option<RemoteServerStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LocalServerStatus {
    role: HaRole,
    #[serde(default)]
    scopes: Vec<String>,
    state: String,
    #[serde(default)]
    server_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RemoteServerStatus {
    role: HaRole,
    #[serde(default)]
    age: i64,
    #[serde(default)]
    in_touch: Option<bool>,
    #[serde(default)]
    last_scopes: Vec<String>,
    #[serde(default)]
    last_state: Option<String>,
    #[serde(default)]
    communication_interrupted: Option<bool>,
    #[serde(default)]
    connecting_clients: Option<i64>,
    #[serde(default)]
    unacked_clients: Option<i64>,
    #[serde(default)]
    unacked_clients_left: Option<i64>,
    #[serde(default)]
    analyzed_packets: Option<i64>,
}

const PARTNER_DOWN: &str = "partner-down";

/// Fold the `high-availability` list of a `status-get` response into the
/// services the daemon belongs to. Returns the services that changed.
pub fn apply_ha_status(
    services: &mut [Service],
    daemon_id: DaemonId,
    ha_status: &Value,
    now: DateTime<Utc>,
) -> Result<Vec<ServiceId>, CoreError> {
    let reports: Vec<HaRelationshipStatus> = serde_json::from_value(ha_status.clone())
        .map_err(|e| CoreError::validation(format!("malformed HA status: {e}")))?;

    let mut changed = Vec::new();
    for report in reports {
        let local = &report.ha_servers.local;
        let service = services.iter_mut().find(|s| {
            s.contains_daemon(daemon_id)
                && local
                    .server_name
                    .as_ref()
                    .is_none_or(|name| s.peers.iter().any(|p| &p.name == name))
        });
        let Some(service) = service else {
            continue;
        };

        if let Some(status) = service.status_mut(local.role) {
            if local.state == PARTNER_DOWN && status.last_state.as_deref() != Some(PARTNER_DOWN) {
                status.failover_at = Some(now);
            }
            status.last_state = Some(local.state.clone());
            status.last_scopes.clone_from(&local.scopes);
            status.status_time = Some(now);
        }

        if let Some(remote) = &report.ha_servers.remote {
            if let Some(status) = service.status_mut(remote.role) {
                if remote.last_state.as_deref() == Some(PARTNER_DOWN)
                    && status.last_state.as_deref() != Some(PARTNER_DOWN)
                {
                    status.failover_at = Some(now);
                }
                status.last_state.clone_from(&remote.last_state);
                status.last_scopes.clone_from(&remote.last_scopes);
                status.status_time = seconds_before(now, remote.age);
                status.in_touch = remote.in_touch;
                status.comm_interrupted = remote.communication_interrupted;
                status.connecting_clients = remote.connecting_clients;
                status.unacked_clients = remote.unacked_clients;
                status.unacked_clients_left = remote.unacked_clients_left;
                status.analyzed_packets = remote.analyzed_packets;
            }
        }
        changed.push(service.id);
    }
    Ok(changed)
}
