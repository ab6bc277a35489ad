// ── Host reservation domain types ──

use ipnet::Ipv6Net;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;

use super::daemon::Family;
use super::identifier::{HostIdentifier, HostIdentifierType};
use super::ids::{DaemonId, HostId, SubnetId};
use super::network::Subnet;
use super::option::{DhcpOption, options_to_kea};
use crate::error::CoreError;
use crate::fingerprint::option_set_hash;
use crate::keaconfig::ReservationConfig;

/// Where a LocalHost came from.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HostDataSource {
    /// Created through the control plane (`reservation-add`).
    Api,
    /// Read from the daemon's configuration file.
    Config,
}

/// A reserved address (`192.0.2.5`) or delegated prefix (`2001:db8:1::/64`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpReservation(pub String);

impl IpReservation {
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let text = text.trim();
        if text.contains('/') {
            let net: Ipv6Net = text
                .parse()
                .map_err(|e| CoreError::validation(format!("invalid prefix {text:?}: {e}")))?;
            Ok(Self(net.trunc().to_string()))
        } else {
            let ip: IpAddr = text
                .parse()
                .map_err(|e| CoreError::validation(format!("invalid address {text:?}: {e}")))?;
            Ok(Self(ip.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn address(&self) -> Option<IpAddr> {
        self.0.parse().ok()
    }

    pub fn prefix(&self) -> Option<Ipv6Net> {
        self.0.parse().ok()
    }

    pub fn is_prefix(&self) -> bool {
        self.0.contains('/')
    }
}

/// One daemon's copy of a host reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalHost {
    pub daemon_id: DaemonId,
    pub data_source: HostDataSource,
    /// Subnet id as known to the daemon; zero for global reservations.
    #[serde(default)]
    pub local_subnet_id: i64,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub next_server: Option<String>,
    #[serde(default)]
    pub client_classes: Vec<String>,
    #[serde(default)]
    pub ip_reservations: Vec<IpReservation>,
    #[serde(default)]
    pub option_data: Vec<DhcpOption>,
    #[serde(default)]
    pub option_data_hash: String,
}

impl LocalHost {
    pub fn new(daemon_id: DaemonId, data_source: HostDataSource) -> Self {
        Self {
            daemon_id,
            data_source,
            local_subnet_id: 0,
            hostname: None,
            next_server: None,
            client_classes: Vec::new(),
            ip_reservations: Vec::new(),
            option_data: Vec::new(),
            option_data_hash: String::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn set_options(&mut self, options: Vec<DhcpOption>) {
        self.option_data_hash = option_set_hash(&options);
        self.option_data = options;
    }
}

/// A host reservation, unique per identifier set within its subnet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    #[serde(default)]
    pub subnet_id: Option<SubnetId>,
    pub identifiers: Vec<HostIdentifier>,
    #[serde(default)]
    pub local_hosts: Vec<LocalHost>,
}

impl Host {
    pub fn new(identifiers: Vec<HostIdentifier>) -> Self {
        Self {
            id: HostId::UNASSIGNED,
            subnet_id: None,
            identifiers,
            local_hosts: Vec::new(),
        }
    }

    /// Build a host from a configured reservation on one daemon.
    pub fn from_config(
        daemon_id: DaemonId,
        local_subnet_id: i64,
        config: &ReservationConfig,
        family: Family,
    ) -> Result<Self, CoreError> {
        let candidates = [
            (HostIdentifierType::HwAddress, &config.hw_address),
            (HostIdentifierType::ClientId, &config.client_id),
            (HostIdentifierType::Duid, &config.duid),
            (HostIdentifierType::FlexId, &config.flex_id),
            (HostIdentifierType::CircuitId, &config.circuit_id),
        ];
        let identifiers = candidates
            .into_iter()
            .filter_map(|(kind, value)| value.as_deref().map(|v| HostIdentifier::parse(kind, v)))
            .collect::<Result<Vec<_>, _>>()?;
        if identifiers.is_empty() {
            return Err(CoreError::validation("reservation has no identifier"));
        }

        let mut local = LocalHost::new(daemon_id, HostDataSource::Config);
        local.local_subnet_id = local_subnet_id;
        local.hostname.clone_from(&config.hostname);
        local.next_server.clone_from(&config.next_server);
        local.client_classes.clone_from(&config.client_classes);
        local.ip_reservations = config
            .ip_address
            .iter()
            .chain(&config.ip_addresses)
            .chain(&config.prefixes)
            .map(|r| IpReservation::parse(r))
            .collect::<Result<_, _>>()?;
        local.set_options(
            config
                .option_data
                .iter()
                .map(|o| DhcpOption::from_config(o, family))
                .collect(),
        );

        let mut host = Self::new(identifiers);
        host.local_hosts.push(local);
        Ok(host)
    }

    pub fn local_host(&self, daemon_id: DaemonId, source: HostDataSource) -> Option<&LocalHost> {
        self.local_hosts
            .iter()
            .find(|lh| lh.daemon_id == daemon_id && lh.data_source == source)
    }

    pub fn daemon_ids(&self) -> Vec<DaemonId> {
        let mut ids: Vec<DaemonId> = Vec::new();
        for local in &self.local_hosts {
            if !ids.contains(&local.daemon_id) {
                ids.push(local.daemon_id);
            }
        }
        ids
    }

    /// Identifiers sorted into a canonical key.
    pub fn identifier_key(&self) -> Vec<HostIdentifier> {
        let mut key = self.identifiers.clone();
        key.sort();
        key
    }

    pub fn identifier(&self, id_type: HostIdentifierType) -> Option<&HostIdentifier> {
        self.identifiers.iter().find(|id| id.id_type == id_type)
    }

    pub fn has_identifier_type(&self, id_type: HostIdentifierType) -> bool {
        self.identifier(id_type).is_some()
    }

    /// Every distinct reserved address or prefix across LocalHosts.
    pub fn reservations(&self) -> Vec<IpReservation> {
        let mut all: Vec<IpReservation> = self
            .local_hosts
            .iter()
            .flat_map(|lh| lh.ip_reservations.iter().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    /// Fill each LocalHost's local subnet id from the subnet it belongs to.
    pub fn resolve_local_subnet_ids(&mut self, subnet: &Subnet) {
        self.subnet_id = Some(subnet.id);
        for local in &mut self.local_hosts {
            if let Some(ls) = subnet.local_subnet(local.daemon_id) {
                local.local_subnet_id = ls.local_subnet_id;
            }
        }
    }

    /// Kea `reservation` body for one LocalHost.
    pub fn reservation_body(&self, local: &LocalHost, family: Family) -> Result<Value, CoreError> {
        let first = self
            .identifiers
            .first()
            .ok_or_else(|| CoreError::validation("host has no identifier"))?;

        let mut body = Map::new();
        body.insert("subnet-id".into(), Value::from(local.local_subnet_id));
        body.insert(first.id_type.to_string(), Value::from(first.to_hex()));

        let (addresses, prefixes): (Vec<&IpReservation>, Vec<&IpReservation>) =
            local.ip_reservations.iter().partition(|r| !r.is_prefix());
        match family {
            Family::V4 => {
                if let Some(address) = addresses.first() {
                    body.insert("ip-address".into(), Value::from(address.as_str()));
                }
            }
            Family::V6 => {
                if !addresses.is_empty() {
                    body.insert(
                        "ip-addresses".into(),
                        Value::from(addresses.iter().map(|a| a.as_str()).collect::<Vec<_>>()),
                    );
                }
                if !prefixes.is_empty() {
                    body.insert(
                        "prefixes".into(),
                        Value::from(prefixes.iter().map(|p| p.as_str()).collect::<Vec<_>>()),
                    );
                }
            }
        }
        if let Some(hostname) = &local.hostname {
            body.insert("hostname".into(), Value::from(hostname.clone()));
        }
        if let Some(next_server) = &local.next_server {
            body.insert("next-server".into(), Value::from(next_server.clone()));
        }
        if !local.client_classes.is_empty() {
            body.insert(
                "client-classes".into(),
                Value::from(local.client_classes.clone()),
            );
        }
        if !local.option_data.is_empty() {
            body.insert("option-data".into(), options_to_kea(&local.option_data));
        }
        Ok(Value::Object(body))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::LocalSubnet;
    use serde_json::json;

    fn mac() -> HostIdentifier {
        HostIdentifier::parse(HostIdentifierType::HwAddress, "01:02:03:04:05:06").unwrap()
    }

    #[test]
    fn reservation_body_uses_plain_hex_identifier() {
        let mut host = Host::new(vec![mac()]);
        host.local_hosts
            .push(LocalHost::new(DaemonId(1), HostDataSource::Api).with_hostname("cool.example.org"));
        let body = host.reservation_body(&host.local_hosts[0], Family::V4).unwrap();
        assert_eq!(
            body,
            json!({"subnet-id": 0, "hw-address": "010203040506", "hostname": "cool.example.org"})
        );
    }

    #[test]
    fn v6_body_splits_addresses_and_prefixes() {
        let duid = HostIdentifier::parse(HostIdentifierType::Duid, "00:01:02:03").unwrap();
        let mut host = Host::new(vec![duid]);
        let mut local = LocalHost::new(DaemonId(2), HostDataSource::Api);
        local.local_subnet_id = 9;
        local.ip_reservations = vec![
            IpReservation::parse("2001:db8:1::10").unwrap(),
            IpReservation::parse("2001:db8:2::/64").unwrap(),
        ];
        host.local_hosts.push(local);
        let body = host.reservation_body(&host.local_hosts[0], Family::V6).unwrap();
        assert_eq!(
            body,
            json!({
                "subnet-id": 9,
                "duid": "00010203",
                "ip-addresses": ["2001:db8:1::10"],
                "prefixes": ["2001:db8:2::/64"]
            })
        );
    }

    #[test]
    fn builds_from_configured_reservation() {
        let config = ReservationConfig {
            hw_address: Some("AA:BB:CC:DD:EE:FF".into()),
            ip_address: Some("192.0.2.5".into()),
            hostname: Some("printer".into()),
            ..ReservationConfig::default()
        };
        let host = Host::from_config(DaemonId(4), 1, &config, Family::V4).unwrap();
        assert_eq!(host.identifiers[0].to_colon_hex(), "aa:bb:cc:dd:ee:ff");
        let local = host.local_host(DaemonId(4), HostDataSource::Config).unwrap();
        assert_eq!(local.local_subnet_id, 1);
        assert_eq!(local.ip_reservations[0].as_str(), "192.0.2.5");

        assert!(Host::from_config(DaemonId(4), 1, &ReservationConfig::default(), Family::V4).is_err());
    }

    #[test]
    fn resolves_local_subnet_ids() {
        let mut subnet = Subnet::new("192.0.2.0/24").unwrap();
        subnet.id = SubnetId(5);
        subnet.set_local_subnet(LocalSubnet::new(DaemonId(1), 11));
        let mut host = Host::new(vec![mac()]);
        host.local_hosts.push(LocalHost::new(DaemonId(1), HostDataSource::Api));
        host.resolve_local_subnet_ids(&subnet);
        assert_eq!(host.subnet_id, Some(SubnetId(5)));
        assert_eq!(host.local_hosts[0].local_subnet_id, 11);
    }
}
