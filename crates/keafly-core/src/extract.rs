// ── Network, host and reservation extraction ──
//
// Projects a daemon's configuration onto candidate Subnet, SharedNetwork
// and Host values. Rows that already exist (same family and prefix, same
// family and network name, same identifiers in the same scope) keep their
// identity and their other daemons' projections; the candidate only
// replaces what this daemon contributes.

use std::collections::HashMap;

use tracing::debug;

use crate::error::CoreError;
use crate::keaconfig::{SharedNetworkConfig, SubnetConfig};
use crate::model::{
    Daemon, DhcpOption, Family, Host, HostIdentifier, LocalSharedNetwork, LocalSubnet,
    SharedNetwork, Subnet,
};

/// Candidates for `Store::commit_networks_into_db`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedNetworks {
    pub networks: Vec<SharedNetwork>,
    /// Subnets outside any shared network.
    pub subnets: Vec<Subnet>,
}

struct Index<'a> {
    subnets: HashMap<(Family, &'a str), &'a Subnet>,
    networks: HashMap<(Family, &'a str), &'a SharedNetwork>,
}

impl<'a> Index<'a> {
    fn new(subnets: &'a [Subnet], networks: &'a [SharedNetwork]) -> Self {
        Self {
            subnets: subnets
                .iter()
                .map(|s| ((s.family, s.prefix.as_str()), s))
                .collect(),
            networks: networks
                .iter()
                .map(|n| ((n.family, n.name.as_str()), n))
                .collect(),
        }
    }
}

fn daemon_family(daemon: &Daemon) -> Result<Family, CoreError> {
    daemon
        .config
        .as_ref()
        .and_then(|c| c.family())
        .or_else(|| daemon.family())
        .ok_or_else(|| CoreError::validation(format!("{daemon} is not a DHCP daemon")))
}

/// Extract subnets and shared networks from the daemon's configuration.
pub fn detect_networks(
    daemon: &Daemon,
    existing_subnets: &[Subnet],
    existing_networks: &[SharedNetwork],
) -> Result<ExtractedNetworks, CoreError> {
    let Some(config) = daemon.config.as_deref() else {
        return Ok(ExtractedNetworks::default());
    };
    let family = daemon_family(daemon)?;
    let index = Index::new(existing_subnets, existing_networks);

    let networks = config
        .shared_networks()?
        .iter()
        .map(|cfg| build_network(daemon, family, cfg, &index))
        .collect::<Result<Vec<_>, _>>()?;
    let subnets = config
        .subnets()?
        .iter()
        .map(|cfg| build_subnet(daemon, family, cfg, None, &index))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        daemon_id = %daemon.id,
        networks = networks.len(),
        subnets = subnets.len(),
        "extracted networks"
    );
    Ok(ExtractedNetworks { networks, subnets })
}

fn build_network(
    daemon: &Daemon,
    family: Family,
    config: &SharedNetworkConfig,
    index: &Index<'_>,
) -> Result<SharedNetwork, CoreError> {
    let mut network = match index.networks.get(&(family, config.name.as_str())) {
        Some(existing) => (*existing).clone(),
        None => SharedNetwork::new(config.name.clone(), family),
    };

    let mut local = LocalSharedNetwork::new(daemon.id);
    local.parameters.clone_from(&config.parameters);
    local.set_options(
        config
            .option_data
            .iter()
            .map(|o| DhcpOption::from_config(o, family))
            .collect(),
    );
    network.set_local_shared_network(local);

    let subnets = config
        .subnets
        .iter()
        .map(|cfg| build_subnet(daemon, family, cfg, Some(&network), index))
        .collect::<Result<Vec<_>, _>>()?;
    network.subnets = subnets;
    Ok(network)
}

fn build_subnet(
    daemon: &Daemon,
    family: Family,
    config: &SubnetConfig,
    parent: Option<&SharedNetwork>,
    index: &Index<'_>,
) -> Result<Subnet, CoreError> {
    let candidate = Subnet::new(&config.subnet)?;
    let mut subnet = match index.subnets.get(&(family, candidate.prefix.as_str())) {
        Some(existing) => {
            let existing = (*existing).clone();
            if existing.shared_network_name.as_deref() != parent.map(|n| n.name.as_str()) {
                debug!(
                    prefix = %existing.prefix,
                    from = ?existing.shared_network_name,
                    to = ?parent.map(|n| n.name.as_str()),
                    "subnet changed parent"
                );
            }
            existing
        }
        None => candidate,
    };
    subnet.shared_network_id = parent.map(|n| n.id).filter(|id| id.is_assigned());
    subnet.shared_network_name = parent.map(|n| n.name.clone());
    subnet.client_class.clone_from(&config.client_class);

    let mut local = LocalSubnet::from_config(daemon.id, config, family)?;
    local
        .address_pools
        .sort_by_key(|p| (p.lower_bound, p.upper_bound));
    local
        .address_pools
        .dedup_by_key(|p| (p.lower_bound, p.upper_bound));
    local
        .prefix_pools
        .sort_by_key(|p| (p.prefix, p.delegated_len));
    local
        .prefix_pools
        .dedup_by_key(|p| (p.prefix, p.delegated_len));
    subnet.set_local_subnet(local);

    subnet.hosts = config
        .reservations
        .iter()
        .map(|r| {
            let mut host = Host::from_config(daemon.id, config.id, r, family)?;
            host.subnet_id = Some(subnet.id).filter(|id| id.is_assigned());
            Ok(host)
        })
        .collect::<Result<_, CoreError>>()?;
    Ok(subnet)
}

/// Extract global reservations, reusing the identity of existing global
/// hosts with the same identifiers.
pub fn detect_global_hosts(daemon: &Daemon, existing: &[Host]) -> Result<Vec<Host>, CoreError> {
    let Some(config) = daemon.config.as_deref() else {
        return Ok(Vec::new());
    };
    let family = daemon_family(daemon)?;
    let by_key: HashMap<Vec<HostIdentifier>, &Host> = existing
        .iter()
        .filter(|h| h.subnet_id.is_none())
        .map(|h| (h.identifier_key(), h))
        .collect();

    config
        .reservations()?
        .iter()
        .map(|r| {
            let mut host = Host::from_config(daemon.id, 0, r, family)?;
            if let Some(known) = by_key.get(&host.identifier_key()) {
                host.id = known.id;
            }
            Ok(host)
        })
        .collect()
}
