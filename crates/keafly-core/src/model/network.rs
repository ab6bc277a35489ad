// ── Subnet and shared network domain types ──
//
// A Subnet is the system-wide row for one prefix; each daemon serving it
// contributes a LocalSubnet carrying its local id, pools and overrides.
// Shared networks follow the same split.

use chrono::{DateTime, Utc};
use ipnet::{IpNet, Ipv6Net};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::IpAddr;

use super::daemon::Family;
use super::host::Host;
use super::ids::{DaemonId, SharedNetworkId, SubnetId};
use super::option::{DhcpOption, options_to_kea};
use crate::error::CoreError;
use crate::fingerprint::option_set_hash;
use crate::keaconfig::{PdPoolConfig, PoolConfig, SubnetConfig};
use crate::stats::BigCounter;

/// Free-form DHCP parameters kept verbatim.
pub type KeaParameters = Map<String, Value>;

/// Named statistics of a scope (`total-addresses`, `assigned-nas`, …).
pub type Stats = BTreeMap<String, BigCounter>;

/// Normalize a CIDR prefix (`192.0.2.7/24` becomes `192.0.2.0/24`).
pub fn normalize_prefix(prefix: &str) -> Result<(String, Family), CoreError> {
    let net: IpNet = prefix
        .trim()
        .parse()
        .map_err(|e| CoreError::validation(format!("invalid prefix {prefix:?}: {e}")))?;
    let family = match net {
        IpNet::V4(_) => Family::V4,
        IpNet::V6(_) => Family::V6,
    };
    Ok((net.trunc().to_string(), family))
}

fn ip_to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

// ── Pools ───────────────────────────────────────────────────────────

/// An address range handed out by a daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPool {
    pub lower_bound: IpAddr,
    pub upper_bound: IpAddr,
    #[serde(default)]
    pub pool_id: Option<i64>,
    #[serde(default)]
    pub parameters: KeaParameters,
    #[serde(default)]
    pub stats: Stats,
}

impl AddressPool {
    pub fn new(lower_bound: IpAddr, upper_bound: IpAddr) -> Self {
        Self {
            lower_bound,
            upper_bound,
            pool_id: None,
            parameters: KeaParameters::new(),
            stats: Stats::new(),
        }
    }

    /// Parse Kea's `lower-upper` or CIDR pool notation.
    pub fn parse(pool: &str) -> Result<Self, CoreError> {
        let pool = pool.trim();
        if let Some((lower, upper)) = pool.split_once('-') {
            let lower: IpAddr = lower
                .trim()
                .parse()
                .map_err(|e| CoreError::validation(format!("invalid pool {pool:?}: {e}")))?;
            let upper: IpAddr = upper
                .trim()
                .parse()
                .map_err(|e| CoreError::validation(format!("invalid pool {pool:?}: {e}")))?;
            if lower.is_ipv4() != upper.is_ipv4() || ip_to_u128(lower) > ip_to_u128(upper) {
                return Err(CoreError::validation(format!("invalid pool bounds {pool:?}")));
            }
            return Ok(Self::new(lower, upper));
        }
        let net: IpNet = pool
            .parse()
            .map_err(|e| CoreError::validation(format!("invalid pool {pool:?}: {e}")))?;
        Ok(Self::new(net.network(), net.broadcast()))
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, CoreError> {
        let mut pool = Self::parse(&config.pool)?;
        pool.pool_id = config.pool_id;
        pool.parameters.clone_from(&config.parameters);
        if !config.option_data.is_empty() {
            pool.parameters.insert(
                "option-data".into(),
                serde_json::to_value(&config.option_data).unwrap_or(Value::Null),
            );
        }
        Ok(pool)
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        ip.is_ipv4() == self.lower_bound.is_ipv4()
            && (ip_to_u128(self.lower_bound)..=ip_to_u128(self.upper_bound))
                .contains(&ip_to_u128(ip))
    }

    /// Key under which Kea reports this pool's statistics.
    pub fn stats_key(&self) -> i64 {
        self.pool_id.unwrap_or(0)
    }

    pub fn to_kea(&self) -> Value {
        let mut entry = self.parameters.clone();
        entry.insert(
            "pool".into(),
            Value::from(format!("{}-{}", self.lower_bound, self.upper_bound)),
        );
        if let Some(id) = self.pool_id {
            entry.insert("pool-id".into(), Value::from(id));
        }
        Value::Object(entry)
    }
}

/// A delegated-prefix pool (DHCPv6 only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixPool {
    pub prefix: Ipv6Net,
    pub delegated_len: u8,
    #[serde(default)]
    pub excluded_prefix: Option<Ipv6Net>,
    #[serde(default)]
    pub pool_id: Option<i64>,
    #[serde(default)]
    pub parameters: KeaParameters,
    #[serde(default)]
    pub stats: Stats,
}

impl PrefixPool {
    pub fn new(prefix: Ipv6Net, delegated_len: u8) -> Self {
        Self {
            prefix,
            delegated_len,
            excluded_prefix: None,
            pool_id: None,
            parameters: KeaParameters::new(),
            stats: Stats::new(),
        }
    }

    pub fn from_config(config: &PdPoolConfig) -> Result<Self, CoreError> {
        let prefix = Ipv6Net::new(
            config
                .prefix
                .parse()
                .map_err(|e| CoreError::validation(format!("invalid pd-pool prefix: {e}")))?,
            config.prefix_len,
        )
        .map_err(|e| CoreError::validation(format!("invalid pd-pool prefix length: {e}")))?;
        let excluded_prefix = match (&config.excluded_prefix, config.excluded_prefix_len) {
            (Some(addr), Some(len)) => Some(
                Ipv6Net::new(
                    addr.parse().map_err(|e| {
                        CoreError::validation(format!("invalid excluded prefix: {e}"))
                    })?,
                    len,
                )
                .map_err(|e| CoreError::validation(format!("invalid excluded prefix: {e}")))?,
            ),
            _ => None,
        };
        Ok(Self {
            prefix: prefix.trunc(),
            delegated_len: config.delegated_len,
            excluded_prefix,
            pool_id: config.pool_id,
            parameters: config.parameters.clone(),
            stats: Stats::new(),
        })
    }

    /// Whether a delegated prefix falls inside this pool.
    pub fn contains(&self, delegated: &Ipv6Net) -> bool {
        self.prefix.contains(delegated)
    }

    pub fn stats_key(&self) -> i64 {
        self.pool_id.unwrap_or(0)
    }

    pub fn to_kea(&self) -> Value {
        let mut entry = self.parameters.clone();
        entry.insert("prefix".into(), Value::from(self.prefix.network().to_string()));
        entry.insert("prefix-len".into(), Value::from(self.prefix.prefix_len()));
        entry.insert("delegated-len".into(), Value::from(self.delegated_len));
        if let Some(excluded) = &self.excluded_prefix {
            entry.insert(
                "excluded-prefix".into(),
                Value::from(excluded.network().to_string()),
            );
            entry.insert(
                "excluded-prefix-len".into(),
                Value::from(excluded.prefix_len()),
            );
        }
        if let Some(id) = self.pool_id {
            entry.insert("pool-id".into(), Value::from(id));
        }
        Value::Object(entry)
    }
}

// ── Subnets ─────────────────────────────────────────────────────────

/// One daemon's view of a subnet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSubnet {
    pub daemon_id: DaemonId,
    /// Subnet id as known to the daemon.
    pub local_subnet_id: i64,
    #[serde(default)]
    pub address_pools: Vec<AddressPool>,
    #[serde(default)]
    pub prefix_pools: Vec<PrefixPool>,
    #[serde(default)]
    pub parameters: KeaParameters,
    #[serde(default)]
    pub option_data: Vec<DhcpOption>,
    #[serde(default)]
    pub option_data_hash: String,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub stats_collected_at: Option<DateTime<Utc>>,
}

impl LocalSubnet {
    pub fn new(daemon_id: DaemonId, local_subnet_id: i64) -> Self {
        Self {
            daemon_id,
            local_subnet_id,
            address_pools: Vec::new(),
            prefix_pools: Vec::new(),
            parameters: KeaParameters::new(),
            option_data: Vec::new(),
            option_data_hash: String::new(),
            stats: Stats::new(),
            stats_collected_at: None,
        }
    }

    /// Project a configured subnet onto a daemon.
    pub fn from_config(
        daemon_id: DaemonId,
        config: &SubnetConfig,
        family: Family,
    ) -> Result<Self, CoreError> {
        let mut local = Self::new(daemon_id, config.id);
        local.address_pools = config
            .pools
            .iter()
            .map(AddressPool::from_config)
            .collect::<Result<_, _>>()?;
        local.prefix_pools = config
            .pd_pools
            .iter()
            .map(PrefixPool::from_config)
            .collect::<Result<_, _>>()?;
        local.parameters.clone_from(&config.parameters);
        local.set_options(
            config
                .option_data
                .iter()
                .map(|o| DhcpOption::from_config(o, family))
                .collect(),
        );
        Ok(local)
    }

    pub fn set_options(&mut self, options: Vec<DhcpOption>) {
        self.option_data_hash = option_set_hash(&options);
        self.option_data = options;
    }

    pub fn contains_address(&self, ip: IpAddr) -> bool {
        self.address_pools.iter().any(|p| p.contains(ip))
    }

    pub fn contains_prefix(&self, prefix: &Ipv6Net) -> bool {
        self.prefix_pools.iter().any(|p| p.contains(prefix))
    }
}

/// A subnet shared by every daemon that serves its prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub prefix: String,
    pub family: Family,
    #[serde(default)]
    pub shared_network_id: Option<SharedNetworkId>,
    #[serde(default)]
    pub shared_network_name: Option<String>,
    #[serde(default)]
    pub client_class: Option<String>,
    #[serde(default)]
    pub local_subnets: Vec<LocalSubnet>,
    /// Reservations declared inside this subnet (populated by extraction).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub addr_utilization: f64,
    #[serde(default)]
    pub pd_utilization: f64,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub stats_collected_at: Option<DateTime<Utc>>,
}

impl Subnet {
    /// A not-yet-persisted subnet for `prefix`.
    pub fn new(prefix: &str) -> Result<Self, CoreError> {
        let (prefix, family) = normalize_prefix(prefix)?;
        Ok(Self {
            id: SubnetId::UNASSIGNED,
            prefix,
            family,
            shared_network_id: None,
            shared_network_name: None,
            client_class: None,
            local_subnets: Vec::new(),
            hosts: Vec::new(),
            addr_utilization: 0.0,
            pd_utilization: 0.0,
            stats: Stats::new(),
            stats_collected_at: None,
        })
    }

    pub fn local_subnet(&self, daemon_id: DaemonId) -> Option<&LocalSubnet> {
        self.local_subnets.iter().find(|ls| ls.daemon_id == daemon_id)
    }

    pub fn local_subnet_mut(&mut self, daemon_id: DaemonId) -> Option<&mut LocalSubnet> {
        self.local_subnets
            .iter_mut()
            .find(|ls| ls.daemon_id == daemon_id)
    }

    pub fn daemon_ids(&self) -> Vec<DaemonId> {
        self.local_subnets.iter().map(|ls| ls.daemon_id).collect()
    }

    /// Insert or replace the LocalSubnet of `local.daemon_id`.
    pub fn set_local_subnet(&mut self, local: LocalSubnet) {
        match self.local_subnet_mut(local.daemon_id) {
            Some(existing) => *existing = local,
            None => self.local_subnets.push(local),
        }
    }

    pub fn remove_local_subnet(&mut self, daemon_id: DaemonId) -> Option<LocalSubnet> {
        let index = self
            .local_subnets
            .iter()
            .position(|ls| ls.daemon_id == daemon_id)?;
        Some(self.local_subnets.remove(index))
    }

    /// Kea body for `subnetN-add` / `subnetN-update` on one daemon.
    pub fn to_kea(&self, daemon_id: DaemonId) -> Option<Value> {
        let local = self.local_subnet(daemon_id)?;
        let mut body = local.parameters.clone();
        body.insert("id".into(), Value::from(local.local_subnet_id));
        body.insert("subnet".into(), Value::from(self.prefix.clone()));
        if !local.address_pools.is_empty() {
            body.insert(
                "pools".into(),
                Value::Array(local.address_pools.iter().map(AddressPool::to_kea).collect()),
            );
        }
        if !local.prefix_pools.is_empty() {
            body.insert(
                "pd-pools".into(),
                Value::Array(local.prefix_pools.iter().map(PrefixPool::to_kea).collect()),
            );
        }
        if !local.option_data.is_empty() {
            body.insert("option-data".into(), options_to_kea(&local.option_data));
        }
        if let Some(class) = &self.client_class {
            body.insert("client-class".into(), Value::from(class.clone()));
        }
        Some(Value::Object(body))
    }
}

// ── Shared networks ─────────────────────────────────────────────────

/// One daemon's view of a shared network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSharedNetwork {
    pub daemon_id: DaemonId,
    #[serde(default)]
    pub parameters: KeaParameters,
    #[serde(default)]
    pub option_data: Vec<DhcpOption>,
    #[serde(default)]
    pub option_data_hash: String,
}

impl LocalSharedNetwork {
    pub fn new(daemon_id: DaemonId) -> Self {
        Self {
            daemon_id,
            parameters: KeaParameters::new(),
            option_data: Vec::new(),
            option_data_hash: String::new(),
        }
    }

    pub fn set_options(&mut self, options: Vec<DhcpOption>) {
        self.option_data_hash = option_set_hash(&options);
        self.option_data = options;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedNetwork {
    pub id: SharedNetworkId,
    pub name: String,
    pub family: Family,
    #[serde(default)]
    pub local_shared_networks: Vec<LocalSharedNetwork>,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default)]
    pub addr_utilization: f64,
    #[serde(default)]
    pub pd_utilization: f64,
    #[serde(default)]
    pub stats: Stats,
}

impl SharedNetwork {
    pub fn new(name: impl Into<String>, family: Family) -> Self {
        Self {
            id: SharedNetworkId::UNASSIGNED,
            name: name.into(),
            family,
            local_shared_networks: Vec::new(),
            subnets: Vec::new(),
            addr_utilization: 0.0,
            pd_utilization: 0.0,
            stats: Stats::new(),
        }
    }

    pub fn local_shared_network(&self, daemon_id: DaemonId) -> Option<&LocalSharedNetwork> {
        self.local_shared_networks
            .iter()
            .find(|l| l.daemon_id == daemon_id)
    }

    pub fn daemon_ids(&self) -> Vec<DaemonId> {
        self.local_shared_networks
            .iter()
            .map(|l| l.daemon_id)
            .collect()
    }

    pub fn set_local_shared_network(&mut self, local: LocalSharedNetwork) {
        match self
            .local_shared_networks
            .iter_mut()
            .find(|l| l.daemon_id == local.daemon_id)
        {
            Some(existing) => *existing = local,
            None => self.local_shared_networks.push(local),
        }
    }

    /// Kea `shared-networks` entry for one daemon.
    ///
    /// With `include_subnets`, nests every subnet the daemon serves.
    pub fn to_kea(&self, daemon_id: DaemonId, include_subnets: bool) -> Option<Value> {
        let local = self.local_shared_network(daemon_id)?;
        let mut body = local.parameters.clone();
        body.insert("name".into(), Value::from(self.name.clone()));
        if !local.option_data.is_empty() {
            body.insert("option-data".into(), options_to_kea(&local.option_data));
        }
        if include_subnets {
            let subnets: Vec<Value> = self
                .subnets
                .iter()
                .filter_map(|s| s.to_kea(daemon_id))
                .collect();
            if !subnets.is_empty() {
                body.insert(
                    format!("subnet{}", self.family.suffix()),
                    Value::Array(subnets),
                );
            }
        }
        Some(Value::Object(body))
    }
}
