// ── Lease aggregator ──
//
// Answers lease queries across every monitored DHCP daemon that loads the
// lease_cmds hook. Each daemon gets its own task; at most `concurrency`
// tasks talk to agents at once. A failing daemon never aborts the query:
// it is reported in `erred_daemons` next to the leases the others returned.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use keafly_api::{KeaCommand, ResponseCode};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::gateway::AgentGateway;
use crate::model::{
    Daemon, DaemonId, Family, Host, HostIdentifierType, Lease, LeaseType, format_hex,
    is_hex_identifier, leases_from_arguments, parse_hex,
};
use crate::registry::DaemonRegistry;
use crate::version::{DeclinedLeaseQuery, declined_lease_query, rejects_short_identifier};

/// Daemons queried in parallel when no limit is configured.
pub const DEFAULT_LEASE_CONCURRENCY: usize = 8;

/// What a free-form search text was recognised as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseQuery {
    Address(IpAddr),
    /// Decoded bytes plus the text as typed, which some daemons only
    /// accept as a hostname.
    Identifier { bytes: Vec<u8>, text: String },
    Hostname(String),
}

impl LeaseQuery {
    pub fn classify(text: &str) -> Self {
        let text = text.trim();
        if let Ok(address) = text.parse::<IpAddr>() {
            return Self::Address(address);
        }
        if is_hex_identifier(text) {
            if let Ok(bytes) = parse_hex(text) {
                return Self::Identifier {
                    bytes,
                    text: text.to_owned(),
                };
            }
        }
        Self::Hostname(text.to_owned())
    }
}

/// Leases gathered from the fleet plus the daemons that could not answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeaseSearchResult {
    pub leases: Vec<Lease>,
    pub erred_daemons: Vec<DaemonId>,
}

/// A lease found for a host reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct HostLease {
    pub lease: Lease,
    /// The lease belongs to a client other than the reserved one.
    pub conflict: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostLeases {
    pub leases: Vec<HostLease>,
    pub erred_daemons: Vec<DaemonId>,
}

impl HostLeases {
    pub fn conflicts(&self) -> impl Iterator<Item = &Lease> {
        self.leases.iter().filter(|l| l.conflict).map(|l| &l.lease)
    }
}

// ── Per-daemon plans ────────────────────────────────────────────────

/// Commands one daemon must answer.
#[derive(Debug, Clone)]
struct Plan {
    commands: Vec<KeaCommand>,
    /// Stop at the first command returning leases.
    first_hit: bool,
    declined_only: bool,
}

impl Plan {
    fn all(commands: Vec<KeaCommand>) -> Self {
        Self {
            commands,
            first_hit: false,
            declined_only: false,
        }
    }
}

fn lease_command(daemon: &Daemon, family: Family, action: &str, arguments: serde_json::Value) -> KeaCommand {
    KeaCommand::new(format!("lease{}-{action}", family.suffix()), daemon.name.as_ref())
        .with_arguments(arguments)
}

fn hostname_command(daemon: &Daemon, family: Family, hostname: &str) -> KeaCommand {
    lease_command(daemon, family, "get-by-hostname", json!({ "hostname": hostname }))
}

fn search_plan(daemon: &Daemon, query: &LeaseQuery) -> Option<Plan> {
    let family = daemon.family()?;
    let plan = match (query, family) {
        (LeaseQuery::Address(IpAddr::V4(address)), Family::V4) => Plan::all(vec![lease_command(
            daemon,
            family,
            "get",
            json!({ "ip-address": address.to_string() }),
        )]),
        (LeaseQuery::Address(IpAddr::V6(address)), Family::V6) => Plan {
            commands: [LeaseType::IaNa, LeaseType::IaPd]
                .into_iter()
                .map(|lease_type| {
                    lease_command(
                        daemon,
                        family,
                        "get",
                        json!({ "type": lease_type.to_string(), "ip-address": address.to_string() }),
                    )
                })
                .collect(),
            first_hit: true,
            declined_only: false,
        },
        (LeaseQuery::Address(_), _) => return None,
        (LeaseQuery::Identifier { bytes, text }, _)
            if rejects_short_identifier(daemon.kea_version().as_ref(), bytes.len()) =>
        {
            Plan::all(vec![hostname_command(daemon, family, text)])
        }
        (LeaseQuery::Identifier { bytes, .. }, Family::V4) => {
            let colon = format_hex(bytes, ":");
            let mut commands = Vec::with_capacity(2);
            if bytes.len() == 6 {
                commands.push(lease_command(daemon, family, "get-by-hw-address", json!({ "hw-address": colon })));
            }
            commands.push(lease_command(daemon, family, "get-by-client-id", json!({ "client-id": colon })));
            Plan::all(commands)
        }
        (LeaseQuery::Identifier { bytes, .. }, Family::V6) => Plan::all(vec![lease_command(
            daemon,
            family,
            "get-by-duid",
            json!({ "duid": format_hex(bytes, ":") }),
        )]),
        (LeaseQuery::Hostname(hostname), _) => Plan::all(vec![hostname_command(daemon, family, hostname)]),
    };
    Some(plan)
}

/// `None` when the daemon's release cannot enumerate declined leases.
fn declined_plan(daemon: &Daemon) -> Option<Plan> {
    let family = daemon.family()?;
    let commands = match declined_lease_query(daemon.kea_version().as_ref()) {
        DeclinedLeaseQuery::ByState => vec![lease_command(daemon, family, "get-by-state", json!({ "state": 1 }))],
        DeclinedLeaseQuery::ByEmptyIdentifier { duid } => match family {
            Family::V4 => vec![lease_command(daemon, family, "get-by-hw-address", json!({ "hw-address": "" }))],
            Family::V6 => vec![lease_command(daemon, family, "get-by-duid", json!({ "duid": duid }))],
        },
        DeclinedLeaseQuery::Unsupported => return None,
    };
    Some(Plan {
        commands,
        first_hit: false,
        declined_only: true,
    })
}

fn host_plan(daemon: &Daemon, host: &Host) -> Option<Plan> {
    let family = daemon.family()?;
    let mut commands = Vec::new();
    for reservation in host.reservations() {
        match (reservation.prefix(), reservation.address(), family) {
            (Some(prefix), _, Family::V6) => commands.push(lease_command(
                daemon,
                family,
                "get",
                json!({ "type": LeaseType::IaPd.to_string(), "ip-address": prefix.addr().to_string() }),
            )),
            (None, Some(IpAddr::V4(address)), Family::V4) => commands.push(lease_command(
                daemon,
                family,
                "get",
                json!({ "ip-address": address.to_string() }),
            )),
            (None, Some(IpAddr::V6(address)), Family::V6) => commands.push(lease_command(
                daemon,
                family,
                "get",
                json!({ "type": LeaseType::IaNa.to_string(), "ip-address": address.to_string() }),
            )),
            _ => {}
        }
    }
    for identifier in &host.identifiers {
        let action = match (identifier.id_type, family) {
            (HostIdentifierType::HwAddress, Family::V4) => "get-by-hw-address",
            (HostIdentifierType::ClientId, Family::V4) => "get-by-client-id",
            (HostIdentifierType::Duid, Family::V6) => "get-by-duid",
            _ => continue,
        };
        let key = identifier.id_type.as_ref();
        commands.push(lease_command(daemon, family, action, json!({ key: identifier.to_colon_hex() })));
    }
    (!commands.is_empty()).then(|| Plan::all(commands))
}

// ── Conflict detection ──────────────────────────────────────────────

fn identifier_matches(host: &Host, id_type: HostIdentifierType, text: Option<&str>) -> Option<bool> {
    let text = text.filter(|t| !t.is_empty())?;
    let bytes = parse_hex(text).ok()?;
    Some(
        host.identifiers
            .iter()
            .any(|id| id.id_type == id_type && id.value == bytes),
    )
}

/// Whether `lease` was handed to a client other than the one `host`
/// reserves for. Hosts keyed by identifiers absent from lease data never
/// conflict.
pub fn is_conflicting(host: &Host, lease: &Lease) -> bool {
    if host.identifiers.iter().any(|id| id.id_type.is_lease_invisible()) {
        return false;
    }
    let matches = [
        identifier_matches(host, HostIdentifierType::HwAddress, lease.hw_address.as_deref()),
        identifier_matches(host, HostIdentifierType::ClientId, lease.client_id.as_deref()),
        identifier_matches(host, HostIdentifierType::Duid, lease.duid.as_deref()),
    ];
    !matches.into_iter().flatten().any(|m| m)
}

// ── Aggregator ──────────────────────────────────────────────────────

pub struct LeaseAggregator {
    registry: Arc<DaemonRegistry>,
    gateway: Arc<dyn AgentGateway>,
    timeout: Duration,
    concurrency: usize,
}

impl LeaseAggregator {
    pub fn new(registry: Arc<DaemonRegistry>, gateway: Arc<dyn AgentGateway>, timeout: Duration) -> Self {
        Self {
            registry,
            gateway,
            timeout,
            concurrency: DEFAULT_LEASE_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn lease_daemons(&self) -> Vec<Arc<Daemon>> {
        self.registry
            .snapshot()
            .iter()
            .filter(|d| d.monitored && d.supports_lease_queries())
            .cloned()
            .collect()
    }

    /// Find leases by address, identifier or hostname.
    pub async fn find_leases(&self, text: &str) -> LeaseSearchResult {
        let query = LeaseQuery::classify(text);
        debug!(?query, "lease search");
        let plans = self
            .lease_daemons()
            .into_iter()
            .filter_map(|d| search_plan(&d, &query).map(|plan| (d, plan)))
            .collect();
        self.run(plans, Vec::new()).await
    }

    /// Enumerate declined leases on every daemon able to report them.
    pub async fn find_declined_leases(&self) -> LeaseSearchResult {
        let mut plans = Vec::new();
        let mut unsupported = Vec::new();
        for daemon in self.lease_daemons() {
            match declined_plan(&daemon) {
                Some(plan) => plans.push((daemon, plan)),
                None => {
                    warn!(daemon_id = %daemon.id, version = ?daemon.version, "declined lease query unsupported");
                    unsupported.push(daemon.id);
                }
            }
        }
        self.run(plans, unsupported).await
    }

    /// Leases on the host's daemons matching its reservations or
    /// identifiers, each marked when it conflicts with the reservation.
    pub async fn find_host_leases(&self, host: &Host) -> HostLeases {
        let daemon_ids = host.daemon_ids();
        let plans = self
            .lease_daemons()
            .into_iter()
            .filter(|d| daemon_ids.contains(&d.id))
            .filter_map(|d| host_plan(&d, host).map(|plan| (d, plan)))
            .collect();
        let found = self.run(plans, Vec::new()).await;
        HostLeases {
            leases: found
                .leases
                .into_iter()
                .map(|lease| HostLease {
                    conflict: is_conflicting(host, &lease),
                    lease,
                })
                .collect(),
            erred_daemons: found.erred_daemons,
        }
    }

    async fn run(&self, plans: Vec<(Arc<Daemon>, Plan)>, mut erred: Vec<DaemonId>) -> LeaseSearchResult {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut owners = HashMap::new();
        for (daemon, plan) in plans {
            let gateway = Arc::clone(&self.gateway);
            let permits = Arc::clone(&permits);
            let timeout = self.timeout;
            let daemon_id = daemon.id;
            let handle = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                query_daemon(gateway.as_ref(), &daemon, &plan, timeout).await
            });
            owners.insert(handle.id(), daemon_id);
        }

        let mut leases = Vec::new();
        let mut seen = HashSet::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, result) = match joined {
                Ok((id, result)) => (id, Ok(result)),
                Err(e) => (e.id(), Err(e)),
            };
            let Some(daemon_id) = owners.get(&task_id).copied() else {
                continue;
            };
            match result {
                Ok(Ok(found)) => {
                    for lease in found {
                        let key = (lease.daemon_id, lease.ip_address.clone(), lease.lease_type, lease.prefix_len);
                        if seen.insert(key) {
                            leases.push(lease);
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(daemon_id = %daemon_id, error = %e, "lease query failed");
                    erred.push(daemon_id);
                }
                Err(e) => {
                    warn!(daemon_id = %daemon_id, error = %e, "lease query task aborted");
                    erred.push(daemon_id);
                }
            }
        }

        leases.sort_by(|a, b| (a.daemon_id, &a.ip_address).cmp(&(b.daemon_id, &b.ip_address)));
        erred.sort();
        erred.dedup();
        LeaseSearchResult {
            leases,
            erred_daemons: erred,
        }
    }
}

async fn query_daemon(
    gateway: &dyn AgentGateway,
    daemon: &Daemon,
    plan: &Plan,
    timeout: Duration,
) -> Result<Vec<Lease>, CoreError> {
    let mut leases = Vec::new();
    for command in &plan.commands {
        let (error, responses) = gateway
            .forward_to_kea(daemon, std::slice::from_ref(command), timeout)
            .await
            .into_parts();
        if let Some(error) = error {
            return Err(error);
        }
        let response = responses.into_iter().next().ok_or_else(|| CoreError::Transport {
            daemon: daemon.to_string(),
            reason: format!("no response to {}", command.command),
        })?;
        debug!(daemon_id = %daemon.id, command = %command.command, result = response.result.as_i64(), "lease query");
        if response.result == ResponseCode::Empty {
            continue;
        }
        let response = response
            .check(&command.command, daemon.name.as_ref())
            .map_err(|e| CoreError::from_api(e, &daemon.to_string()))?;
        let Some(arguments) = response.arguments.as_ref() else {
            continue;
        };
        let mut found = leases_from_arguments(arguments)?;
        for lease in &mut found {
            lease.daemon_id = daemon.id;
        }
        if plan.declined_only {
            found.retain(Lease::is_declined);
        }
        let hit = !found.is_empty();
        leases.extend(found);
        if plan.first_hit && hit {
            break;
        }
    }
    Ok(leases)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::HostIdentifier;
    use pretty_assertions::assert_eq;

    fn lease(hw: Option<&str>, client_id: Option<&str>) -> Lease {
        serde_json::from_value(json!({
            "ip-address": "192.0.2.10",
            "hw-address": hw,
            "client-id": client_id,
        }))
        .unwrap()
    }

    fn host(ids: &[(HostIdentifierType, &str)]) -> Host {
        Host::new(
            ids.iter()
                .map(|(t, v)| HostIdentifier::parse(*t, v).unwrap())
                .collect(),
        )
    }

    #[test]
    fn classifies_search_text() {
        assert_eq!(
            LeaseQuery::classify("192.0.2.1"),
            LeaseQuery::Address("192.0.2.1".parse().unwrap())
        );
        assert_eq!(
            LeaseQuery::classify("2001:db8::1"),
            LeaseQuery::Address("2001:db8::1".parse().unwrap())
        );
        assert_eq!(
            LeaseQuery::classify("01:02:03:04:05:06"),
            LeaseQuery::Identifier {
                bytes: vec![1, 2, 3, 4, 5, 6],
                text: "01:02:03:04:05:06".to_owned(),
            }
        );
        assert_eq!(
            LeaseQuery::classify(" CAFE "),
            LeaseQuery::Identifier {
                bytes: vec![0xca, 0xfe],
                text: "CAFE".to_owned(),
            }
        );
        assert_eq!(
            LeaseQuery::classify("printer.example.org"),
            LeaseQuery::Hostname("printer.example.org".to_owned())
        );
    }

    #[test]
    fn matching_identifier_is_not_a_conflict() {
        let reserved = host(&[(HostIdentifierType::HwAddress, "010203040506")]);
        assert!(!is_conflicting(&reserved, &lease(Some("01:02:03:04:05:06"), None)));
        assert!(is_conflicting(&reserved, &lease(Some("0a:0b:0c:0d:0e:0f"), None)));
        // A matching client-id settles it even when the MAC differs.
        let both = host(&[
            (HostIdentifierType::HwAddress, "010203040506"),
            (HostIdentifierType::ClientId, "aabb"),
        ]);
        assert!(!is_conflicting(&both, &lease(Some("0a:0b:0c:0d:0e:0f"), Some("aa:bb"))));
    }

    #[test]
    fn lease_invisible_identifiers_never_conflict() {
        let reserved = host(&[(HostIdentifierType::FlexId, "0102")]);
        assert!(!is_conflicting(&reserved, &lease(Some("0a:0b:0c:0d:0e:0f"), None)));
    }

    #[test]
    fn lease_without_identifiers_conflicts() {
        let reserved = host(&[(HostIdentifierType::HwAddress, "010203040506")]);
        assert!(is_conflicting(&reserved, &lease(None, Some(""))));
    }
}
