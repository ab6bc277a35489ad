// ── In-memory store ──
//
// All tables sit behind one `RwLock`; every trait call takes the guard
// once, so multi-table mutations and their orphan sweeps are atomic with
// respect to other callers.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{GlobalReservationCounts, Store, StoreResult, Utilization};
use crate::error::CoreError;
use crate::ha::{ServiceMerge, merge_proposal};
use crate::model::{
    Daemon, DaemonId, Event, EventId, Family, Host, HostDataSource, HostId, Machine, MachineId,
    NewEvent, ScheduledChangeId, ScheduledConfigChange, Service, ServiceId, SharedNetwork,
    SharedNetworkId, Stats, Subnet, SubnetId,
};

#[derive(Default)]
struct Counters {
    machine: i64,
    daemon: i64,
    subnet: i64,
    network: i64,
    host: i64,
    service: i64,
    change: i64,
    event: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Subnet rows keep `hosts` empty and network rows keep `subnets` empty;
/// both are reassembled from the hosts and subnets tables on read.
#[derive(Default)]
struct Tables {
    ids: Counters,
    machines: BTreeMap<MachineId, Machine>,
    daemons: BTreeMap<DaemonId, Daemon>,
    subnets: BTreeMap<SubnetId, Subnet>,
    networks: BTreeMap<SharedNetworkId, SharedNetwork>,
    hosts: BTreeMap<HostId, Host>,
    services: BTreeMap<ServiceId, Service>,
    changes: BTreeMap<ScheduledChangeId, ScheduledConfigChange>,
    events: Vec<Event>,
    global_stats: Stats,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// ── Table helpers ───────────────────────────────────────────────────

impl Tables {
    fn network_with_subnets(&self, network: &SharedNetwork) -> SharedNetwork {
        let mut full = network.clone();
        full.subnets = self
            .subnets
            .values()
            .filter(|s| s.shared_network_id == Some(network.id))
            .cloned()
            .collect();
        full
    }

    fn insert_subnet(&mut self, mut subnet: Subnet) -> Subnet {
        subnet.id = SubnetId(next(&mut self.ids.subnet));
        subnet.hosts.clear();
        if let Some(network_id) = subnet.shared_network_id {
            subnet.shared_network_name = self.networks.get(&network_id).map(|n| n.name.clone());
        }
        self.subnets.insert(subnet.id, subnet.clone());
        subnet
    }

    fn insert_host(&mut self, mut host: Host) -> Host {
        host.id = HostId(next(&mut self.ids.host));
        self.hosts.insert(host.id, host.clone());
        host
    }

    fn find_subnet(&self, candidate: &Subnet) -> Option<SubnetId> {
        if candidate.id.is_assigned() && self.subnets.contains_key(&candidate.id) {
            return Some(candidate.id);
        }
        self.subnets
            .values()
            .find(|s| s.family == candidate.family && s.prefix == candidate.prefix)
            .map(|s| s.id)
    }

    fn find_network(&self, candidate: &SharedNetwork) -> Option<SharedNetworkId> {
        if candidate.id.is_assigned() && self.networks.contains_key(&candidate.id) {
            return Some(candidate.id);
        }
        self.networks
            .values()
            .find(|n| n.family == candidate.family && n.name == candidate.name)
            .map(|n| n.id)
    }

    fn find_host(&self, subnet_id: Option<SubnetId>, candidate: &Host) -> Option<HostId> {
        let key = candidate.identifier_key();
        self.hosts
            .values()
            .find(|h| h.subnet_id == subnet_id && h.identifier_key() == key)
            .map(|h| h.id)
    }

    /// Merge the daemon's config-sourced LocalHosts of `candidate` into the
    /// matching host row, creating it when absent.
    fn merge_config_host(
        &mut self,
        daemon_id: DaemonId,
        subnet_id: Option<SubnetId>,
        candidate: &Host,
    ) {
        let locals = candidate
            .local_hosts
            .iter()
            .filter(|lh| lh.daemon_id == daemon_id && lh.data_source == HostDataSource::Config)
            .cloned();
        match self
            .find_host(subnet_id, candidate)
            .and_then(|id| self.hosts.get_mut(&id))
        {
            Some(row) => row.local_hosts.extend(locals),
            None => {
                let mut host = candidate.clone();
                host.subnet_id = subnet_id;
                host.local_hosts = locals.collect();
                self.insert_host(host);
            }
        }
    }

    /// Attach the daemon's LocalSubnet of `candidate` to the matching row.
    /// Returns the row id and whether it was created.
    fn merge_subnet(
        &mut self,
        daemon_id: DaemonId,
        candidate: &Subnet,
        parent: Option<(SharedNetworkId, &str)>,
    ) -> (SubnetId, bool) {
        let (id, created) = match self.find_subnet(candidate) {
            Some(id) => (id, false),
            None => {
                let mut fresh = candidate.clone();
                fresh.local_subnets.clear();
                (self.insert_subnet(fresh).id, true)
            }
        };
        if let Some(row) = self.subnets.get_mut(&id) {
            row.shared_network_id = parent.map(|(nid, _)| nid);
            row.shared_network_name = parent.map(|(_, name)| name.to_owned());
            row.client_class.clone_from(&candidate.client_class);
            if let Some(local) = candidate.local_subnet(daemon_id) {
                row.set_local_subnet(local.clone());
            }
        }
        for host in &candidate.hosts {
            self.merge_config_host(daemon_id, Some(id), host);
        }
        (id, created)
    }

    fn remove_daemon_from_hosts(
        &mut self,
        daemon_id: DaemonId,
        source: Option<HostDataSource>,
        scope: impl Fn(&Host) -> bool,
    ) -> usize {
        let mut removed = 0;
        for host in self.hosts.values_mut().filter(|h| scope(h)) {
            let before = host.local_hosts.len();
            host.local_hosts.retain(|lh| {
                lh.daemon_id != daemon_id || source.is_some_and(|s| s != lh.data_source)
            });
            removed += before - host.local_hosts.len();
        }
        removed
    }

    fn remove_daemon_from_subnets(&mut self, daemon_id: DaemonId) -> usize {
        self.subnets
            .values_mut()
            .filter_map(|s| s.remove_local_subnet(daemon_id))
            .count()
    }

    fn remove_daemon_from_networks(&mut self, daemon_id: DaemonId) -> usize {
        let mut removed = 0;
        for network in self.networks.values_mut() {
            let before = network.local_shared_networks.len();
            network
                .local_shared_networks
                .retain(|l| l.daemon_id != daemon_id);
            removed += before - network.local_shared_networks.len();
        }
        removed
    }

    fn remove_daemon_from_services(&mut self, daemon_id: DaemonId) -> usize {
        let mut removed = 0;
        for service in self.services.values_mut() {
            if service.contains_daemon(daemon_id) {
                service.remove_daemon(daemon_id);
                removed += 1;
            }
        }
        removed
    }

    fn delete_subnets(&mut self, ids: &[SubnetId]) {
        for id in ids {
            self.subnets.remove(id);
        }
        self.hosts
            .retain(|_, h| h.subnet_id.is_none_or(|sid| !ids.contains(&sid)));
    }

    fn sweep_subnets(&mut self) -> usize {
        let orphans: Vec<SubnetId> = self
            .subnets
            .values()
            .filter(|s| s.local_subnets.is_empty())
            .map(|s| s.id)
            .collect();
        self.delete_subnets(&orphans);
        orphans.len()
    }

    fn sweep_hosts(&mut self) -> usize {
        let before = self.hosts.len();
        self.hosts.retain(|_, h| !h.local_hosts.is_empty());
        before - self.hosts.len()
    }

    fn sweep_networks(&mut self) -> usize {
        let orphans: Vec<SharedNetworkId> = self
            .networks
            .values()
            .filter(|n| n.local_shared_networks.is_empty())
            .map(|n| n.id)
            .collect();
        for id in &orphans {
            self.detach_network(*id);
        }
        orphans.len()
    }

    fn sweep_services(&mut self) -> usize {
        let before = self.services.len();
        self.services.retain(|_, s| !s.is_empty());
        before - self.services.len()
    }

    fn sweep_all(&mut self) {
        let subnets = self.sweep_subnets();
        let hosts = self.sweep_hosts();
        let networks = self.sweep_networks();
        let services = self.sweep_services();
        if subnets + hosts + networks + services > 0 {
            debug!(subnets, hosts, networks, services, "swept orphaned rows");
        }
    }

    fn detach_network(&mut self, id: SharedNetworkId) {
        self.networks.remove(&id);
        for subnet in self
            .subnets
            .values_mut()
            .filter(|s| s.shared_network_id == Some(id))
        {
            subnet.shared_network_id = None;
            subnet.shared_network_name = None;
        }
    }

    fn upsert_network_subnets(&mut self, network: &SharedNetwork) {
        let mut kept = Vec::with_capacity(network.subnets.len());
        for candidate in &network.subnets {
            let mut subnet = candidate.clone();
            subnet.shared_network_id = Some(network.id);
            subnet.shared_network_name = Some(network.name.clone());
            subnet.hosts.clear();
            let id = match self.find_subnet(&subnet) {
                Some(id) => {
                    subnet.id = id;
                    self.subnets.insert(id, subnet);
                    id
                }
                None => self.insert_subnet(subnet).id,
            };
            kept.push(id);
        }
        for subnet in self.subnets.values_mut().filter(|s| {
            s.shared_network_id == Some(network.id) && !kept.contains(&s.id)
        }) {
            subnet.shared_network_id = None;
            subnet.shared_network_name = None;
        }
    }
}

fn missing(entity_type: &'static str, id: impl ToString) -> CoreError {
    CoreError::not_found(entity_type, id)
}

// ── Store implementation ────────────────────────────────────────────

#[async_trait]
impl Store for MemoryStore {
    async fn add_machine(&self, mut machine: Machine) -> StoreResult<Machine> {
        let mut t = self.tables.write().await;
        machine.id = MachineId(next(&mut t.ids.machine));
        t.machines.insert(machine.id, machine.clone());
        Ok(machine)
    }

    async fn get_machines(&self) -> StoreResult<Vec<Machine>> {
        Ok(self.tables.read().await.machines.values().cloned().collect())
    }

    async fn add_daemon(&self, mut daemon: Daemon) -> StoreResult<Daemon> {
        let mut t = self.tables.write().await;
        if !t.machines.contains_key(&daemon.machine_id) {
            return Err(missing("machine", daemon.machine_id));
        }
        daemon.id = DaemonId(next(&mut t.ids.daemon));
        t.daemons.insert(daemon.id, daemon.clone());
        Ok(daemon)
    }

    async fn update_daemon(&self, daemon: &Daemon) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let row = t
            .daemons
            .get_mut(&daemon.id)
            .ok_or_else(|| missing("daemon", daemon.id))?;
        *row = daemon.clone();
        Ok(())
    }

    async fn get_daemon_by_id(&self, id: DaemonId) -> StoreResult<Option<Daemon>> {
        Ok(self.tables.read().await.daemons.get(&id).cloned())
    }

    async fn get_daemons(&self) -> StoreResult<Vec<Daemon>> {
        Ok(self.tables.read().await.daemons.values().cloned().collect())
    }

    async fn get_dhcp_daemons(&self) -> StoreResult<Vec<Daemon>> {
        Ok(self
            .tables
            .read()
            .await
            .daemons
            .values()
            .filter(|d| d.name.is_dhcp())
            .cloned()
            .collect())
    }

    // ── Subnets ──────────────────────────────────────────────────────

    async fn get_subnet(&self, id: SubnetId) -> StoreResult<Option<Subnet>> {
        Ok(self.tables.read().await.subnets.get(&id).cloned())
    }

    async fn get_subnets_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Subnet>> {
        let (prefix, family) = crate::model::normalize_prefix(prefix)?;
        Ok(self
            .tables
            .read()
            .await
            .subnets
            .values()
            .filter(|s| s.family == family && s.prefix == prefix)
            .cloned()
            .collect())
    }

    async fn add_subnet(&self, subnet: Subnet) -> StoreResult<Subnet> {
        let mut t = self.tables.write().await;
        if t.find_subnet(&Subnet {
            id: SubnetId::UNASSIGNED,
            ..subnet.clone()
        })
        .is_some()
        {
            return Err(CoreError::validation(format!(
                "subnet {} already exists",
                subnet.prefix
            )));
        }
        Ok(t.insert_subnet(subnet))
    }

    async fn update_subnet(&self, subnet: &Subnet) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if !t.subnets.contains_key(&subnet.id) {
            return Err(missing("subnet", subnet.id));
        }
        let mut row = subnet.clone();
        row.hosts.clear();
        row.shared_network_name = row
            .shared_network_id
            .and_then(|id| t.networks.get(&id))
            .map(|n| n.name.clone());
        t.subnets.insert(subnet.id, row);
        t.sweep_all();
        Ok(())
    }

    async fn delete_subnet(&self, id: SubnetId) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if !t.subnets.contains_key(&id) {
            return Err(missing("subnet", id));
        }
        t.delete_subnets(&[id]);
        Ok(())
    }

    async fn get_all_subnets(&self, family: Option<Family>) -> StoreResult<Vec<Subnet>> {
        Ok(self
            .tables
            .read()
            .await
            .subnets
            .values()
            .filter(|s| family.is_none_or(|f| s.family == f))
            .cloned()
            .collect())
    }

    async fn get_subnets_with_local_subnets(&self) -> StoreResult<Vec<Subnet>> {
        Ok(self
            .tables
            .read()
            .await
            .subnets
            .values()
            .filter(|s| !s.local_subnets.is_empty())
            .cloned()
            .collect())
    }

    async fn get_daemon_local_subnets(&self, daemon_id: DaemonId) -> StoreResult<Vec<Subnet>> {
        Ok(self
            .tables
            .read()
            .await
            .subnets
            .values()
            .filter(|s| s.local_subnet(daemon_id).is_some())
            .cloned()
            .collect())
    }

    // ── Shared networks ──────────────────────────────────────────────

    async fn get_shared_network(&self, id: SharedNetworkId) -> StoreResult<Option<SharedNetwork>> {
        let t = self.tables.read().await;
        Ok(t.networks.get(&id).map(|n| t.network_with_subnets(n)))
    }

    async fn get_all_shared_networks(
        &self,
        family: Option<Family>,
    ) -> StoreResult<Vec<SharedNetwork>> {
        let t = self.tables.read().await;
        Ok(t.networks
            .values()
            .filter(|n| family.is_none_or(|f| n.family == f))
            .map(|n| t.network_with_subnets(n))
            .collect())
    }

    async fn add_shared_network(&self, network: SharedNetwork) -> StoreResult<SharedNetwork> {
        let mut t = self.tables.write().await;
        if t.find_network(&SharedNetwork {
            id: SharedNetworkId::UNASSIGNED,
            subnets: Vec::new(),
            ..network.clone()
        })
        .is_some()
        {
            return Err(CoreError::validation(format!(
                "shared network {} already exists",
                network.name
            )));
        }
        let mut row = network.clone();
        row.id = SharedNetworkId(next(&mut t.ids.network));
        row.subnets.clear();
        t.networks.insert(row.id, row.clone());
        let nested = SharedNetwork {
            subnets: network.subnets,
            ..row.clone()
        };
        t.upsert_network_subnets(&nested);
        Ok(t.network_with_subnets(&row))
    }

    async fn update_shared_network(&self, network: &SharedNetwork) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if !t.networks.contains_key(&network.id) {
            return Err(missing("shared network", network.id));
        }
        let mut row = network.clone();
        row.subnets.clear();
        t.networks.insert(network.id, row);
        t.upsert_network_subnets(network);
        t.sweep_all();
        Ok(())
    }

    async fn delete_shared_network(&self, id: SharedNetworkId) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if !t.networks.contains_key(&id) {
            return Err(missing("shared network", id));
        }
        t.detach_network(id);
        Ok(())
    }

    async fn delete_shared_network_with_subnets(&self, id: SharedNetworkId) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.networks.remove(&id).is_none() {
            return Err(missing("shared network", id));
        }
        let members: Vec<SubnetId> = t
            .subnets
            .values()
            .filter(|s| s.shared_network_id == Some(id))
            .map(|s| s.id)
            .collect();
        t.delete_subnets(&members);
        Ok(())
    }

    // ── Config commits ───────────────────────────────────────────────

    async fn commit_networks_into_db(
        &self,
        daemon_id: DaemonId,
        networks: Vec<SharedNetwork>,
        subnets: Vec<Subnet>,
    ) -> StoreResult<Vec<Subnet>> {
        let mut t = self.tables.write().await;
        t.remove_daemon_from_subnets(daemon_id);
        t.remove_daemon_from_networks(daemon_id);
        t.remove_daemon_from_hosts(daemon_id, Some(HostDataSource::Config), |h| {
            h.subnet_id.is_some()
        });

        let mut added = Vec::new();
        for candidate in &networks {
            let network_id = match t.find_network(candidate) {
                Some(id) => id,
                None => {
                    let mut row = candidate.clone();
                    row.id = SharedNetworkId(next(&mut t.ids.network));
                    row.local_shared_networks.clear();
                    row.subnets.clear();
                    t.networks.insert(row.id, row.clone());
                    row.id
                }
            };
            if let (Some(row), Some(local)) = (
                t.networks.get_mut(&network_id),
                candidate.local_shared_network(daemon_id),
            ) {
                row.set_local_shared_network(local.clone());
            }
            for subnet in &candidate.subnets {
                let (id, created) =
                    t.merge_subnet(daemon_id, subnet, Some((network_id, &candidate.name)));
                if created {
                    added.push(id);
                }
            }
        }
        for subnet in &subnets {
            let (id, created) = t.merge_subnet(daemon_id, subnet, None);
            if created {
                added.push(id);
            }
        }
        t.sweep_all();

        debug!(
            daemon_id = %daemon_id,
            networks = networks.len(),
            subnets = subnets.len(),
            added = added.len(),
            "committed networks"
        );
        Ok(added
            .iter()
            .filter_map(|id| t.subnets.get(id).cloned())
            .collect())
    }

    async fn commit_global_hosts_into_db(
        &self,
        daemon_id: DaemonId,
        hosts: Vec<Host>,
    ) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.remove_daemon_from_hosts(daemon_id, Some(HostDataSource::Config), |h| {
            h.subnet_id.is_none()
        });
        for host in &hosts {
            t.merge_config_host(daemon_id, None, host);
        }
        t.sweep_hosts();
        Ok(())
    }

    async fn commit_services_into_db(
        &self,
        daemon_id: DaemonId,
        services: Vec<Service>,
    ) -> StoreResult<Vec<Service>> {
        let mut t = self.tables.write().await;
        t.remove_daemon_from_services(daemon_id);
        for proposal in services {
            let existing = t
                .services
                .values()
                .find(|s| s.ha_type == proposal.ha_type && s.relationship == proposal.relationship)
                .cloned();
            match merge_proposal(existing.as_ref(), proposal, daemon_id) {
                ServiceMerge::Join(service) => {
                    t.services.insert(service.id, service);
                }
                ServiceMerge::Create(mut service) => {
                    service.id = ServiceId(next(&mut t.ids.service));
                    t.services.insert(service.id, service);
                }
                ServiceMerge::Replace { old, mut service } => {
                    t.services.remove(&old);
                    service.id = ServiceId(next(&mut t.ids.service));
                    t.services.insert(service.id, service);
                }
            }
        }
        t.sweep_services();
        Ok(t.services
            .values()
            .filter(|s| s.contains_daemon(daemon_id))
            .cloned()
            .collect())
    }

    async fn delete_daemon_from_hosts(
        &self,
        daemon_id: DaemonId,
        source: Option<HostDataSource>,
    ) -> StoreResult<usize> {
        let mut t = self.tables.write().await;
        Ok(t.remove_daemon_from_hosts(daemon_id, source, |_| true))
    }

    async fn delete_daemon_from_subnets(&self, daemon_id: DaemonId) -> StoreResult<usize> {
        Ok(self.tables.write().await.remove_daemon_from_subnets(daemon_id))
    }

    async fn delete_daemon_from_shared_networks(&self, daemon_id: DaemonId) -> StoreResult<usize> {
        Ok(self.tables.write().await.remove_daemon_from_networks(daemon_id))
    }

    async fn delete_daemon_from_services(&self, daemon_id: DaemonId) -> StoreResult<usize> {
        Ok(self.tables.write().await.remove_daemon_from_services(daemon_id))
    }

    async fn delete_orphaned_hosts(&self) -> StoreResult<usize> {
        Ok(self.tables.write().await.sweep_hosts())
    }

    async fn delete_orphaned_subnets(&self) -> StoreResult<usize> {
        Ok(self.tables.write().await.sweep_subnets())
    }

    async fn delete_orphaned_shared_networks(&self) -> StoreResult<usize> {
        Ok(self.tables.write().await.sweep_networks())
    }

    async fn delete_orphaned_services(&self) -> StoreResult<usize> {
        Ok(self.tables.write().await.sweep_services())
    }

    // ── Hosts ────────────────────────────────────────────────────────

    async fn get_host(&self, id: HostId) -> StoreResult<Option<Host>> {
        Ok(self.tables.read().await.hosts.get(&id).cloned())
    }

    async fn add_host(&self, host: Host) -> StoreResult<Host> {
        let mut t = self.tables.write().await;
        if let Some(subnet_id) = host.subnet_id {
            if !t.subnets.contains_key(&subnet_id) {
                return Err(missing("subnet", subnet_id));
            }
        }
        Ok(t.insert_host(host))
    }

    async fn update_host(&self, host: &Host) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let row = t
            .hosts
            .get_mut(&host.id)
            .ok_or_else(|| missing("host", host.id))?;
        *row = host.clone();
        t.sweep_hosts();
        Ok(())
    }

    async fn delete_host(&self, id: HostId) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .hosts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("host", id))
    }

    async fn get_hosts_by_daemon(
        &self,
        daemon_id: DaemonId,
        source: Option<HostDataSource>,
    ) -> StoreResult<Vec<Host>> {
        Ok(self
            .tables
            .read()
            .await
            .hosts
            .values()
            .filter(|h| {
                h.local_hosts.iter().any(|lh| {
                    lh.daemon_id == daemon_id && source.is_none_or(|s| s == lh.data_source)
                })
            })
            .cloned()
            .collect())
    }

    // ── HA services ──────────────────────────────────────────────────

    async fn get_services_by_daemon(&self, daemon_id: DaemonId) -> StoreResult<Vec<Service>> {
        Ok(self
            .tables
            .read()
            .await
            .services
            .values()
            .filter(|s| s.contains_daemon(daemon_id))
            .cloned()
            .collect())
    }

    async fn get_all_services(&self) -> StoreResult<Vec<Service>> {
        Ok(self.tables.read().await.services.values().cloned().collect())
    }

    async fn update_service(&self, service: &Service) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let row = t
            .services
            .get_mut(&service.id)
            .ok_or_else(|| missing("service", service.id))?;
        *row = service.clone();
        Ok(())
    }

    // ── Scheduled config changes ─────────────────────────────────────

    async fn add_scheduled_config_change(
        &self,
        mut change: ScheduledConfigChange,
    ) -> StoreResult<ScheduledConfigChange> {
        let mut t = self.tables.write().await;
        change.id = ScheduledChangeId(next(&mut t.ids.change));
        t.changes.insert(change.id, change.clone());
        Ok(change)
    }

    async fn get_due_config_changes(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ScheduledConfigChange>> {
        let mut due: Vec<ScheduledConfigChange> = self
            .tables
            .read()
            .await
            .changes
            .values()
            .filter(|c| c.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|c| (c.deadline_at, c.id));
        Ok(due)
    }

    async fn get_scheduled_config_changes(&self) -> StoreResult<Vec<ScheduledConfigChange>> {
        Ok(self.tables.read().await.changes.values().cloned().collect())
    }

    async fn mark_scheduled_config_change_executed(
        &self,
        id: ScheduledChangeId,
        error: Option<String>,
    ) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let row = t
            .changes
            .get_mut(&id)
            .ok_or_else(|| missing("scheduled config change", id))?;
        row.executed = true;
        row.error = error;
        Ok(())
    }

    async fn delete_scheduled_config_change(&self, id: ScheduledChangeId) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .changes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("scheduled config change", id))
    }

    // ── Statistics ───────────────────────────────────────────────────

    async fn count_out_of_pool_address_reservations(&self) -> StoreResult<HashMap<SubnetId, u64>> {
        let t = self.tables.read().await;
        let mut counts = HashMap::new();
        for host in t.hosts.values() {
            let Some(subnet) = host.subnet_id.and_then(|id| t.subnets.get(&id)) else {
                continue;
            };
            let outside = host
                .reservations()
                .iter()
                .filter_map(|r| r.address())
                .filter(|ip| !subnet.local_subnets.iter().any(|ls| ls.contains_address(*ip)))
                .count() as u64;
            if outside > 0 {
                *counts.entry(subnet.id).or_insert(0) += outside;
            }
        }
        Ok(counts)
    }

    async fn count_out_of_pool_prefix_reservations(&self) -> StoreResult<HashMap<SubnetId, u64>> {
        let t = self.tables.read().await;
        let mut counts = HashMap::new();
        for host in t.hosts.values() {
            let Some(subnet) = host.subnet_id.and_then(|id| t.subnets.get(&id)) else {
                continue;
            };
            let outside = host
                .reservations()
                .iter()
                .filter_map(|r| r.prefix())
                .filter(|p| !subnet.local_subnets.iter().any(|ls| ls.contains_prefix(p)))
                .count() as u64;
            if outside > 0 {
                *counts.entry(subnet.id).or_insert(0) += outside;
            }
        }
        Ok(counts)
    }

    async fn count_global_reservations(&self) -> StoreResult<GlobalReservationCounts> {
        let t = self.tables.read().await;
        let mut counts = GlobalReservationCounts::default();
        for host in t.hosts.values().filter(|h| h.subnet_id.is_none()) {
            for reservation in host.reservations() {
                if reservation.is_prefix() {
                    counts.pds += 1;
                } else if reservation.address().is_some_and(|ip| ip.is_ipv4()) {
                    counts.addresses += 1;
                } else {
                    counts.nas += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn get_passive_ha_daemon_ids(&self) -> StoreResult<Vec<DaemonId>> {
        let t = self.tables.read().await;
        let mut roles: BTreeMap<DaemonId, bool> = BTreeMap::new();
        for service in t.services.values() {
            for daemon_id in service.daemon_ids() {
                let passive = service.role_of(daemon_id).is_some_and(|r| r.is_passive());
                roles
                    .entry(daemon_id)
                    .and_modify(|all_passive| *all_passive &= passive)
                    .or_insert(passive);
            }
        }
        Ok(roles
            .into_iter()
            .filter_map(|(id, passive)| passive.then_some(id))
            .collect())
    }

    async fn set_subnet_stats(&self, subnet: &Subnet) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let row = t
            .subnets
            .get_mut(&subnet.id)
            .ok_or_else(|| missing("subnet", subnet.id))?;
        for local in &subnet.local_subnets {
            let Some(stored) = row.local_subnet_mut(local.daemon_id) else {
                continue;
            };
            stored.stats.clone_from(&local.stats);
            stored.stats_collected_at = local.stats_collected_at;
            for pool in &local.address_pools {
                if let Some(p) = stored.address_pools.iter_mut().find(|p| {
                    p.lower_bound == pool.lower_bound && p.upper_bound == pool.upper_bound
                }) {
                    p.stats.clone_from(&pool.stats);
                }
            }
            for pool in &local.prefix_pools {
                if let Some(p) = stored.prefix_pools.iter_mut().find(|p| {
                    p.prefix == pool.prefix && p.delegated_len == pool.delegated_len
                }) {
                    p.stats.clone_from(&pool.stats);
                }
            }
        }
        row.addr_utilization = subnet.addr_utilization;
        row.pd_utilization = subnet.pd_utilization;
        row.stats.clone_from(&subnet.stats);
        row.stats_collected_at = subnet.stats_collected_at;
        Ok(())
    }

    async fn update_statistics_in_shared_network(
        &self,
        id: SharedNetworkId,
        utilization: Utilization,
    ) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let row = t
            .networks
            .get_mut(&id)
            .ok_or_else(|| missing("shared network", id))?;
        row.addr_utilization = utilization.addr_utilization;
        row.pd_utilization = utilization.pd_utilization;
        row.stats = utilization.stats;
        Ok(())
    }

    async fn set_global_stats(&self, stats: Stats) -> StoreResult<()> {
        self.tables.write().await.global_stats = stats;
        Ok(())
    }

    async fn get_global_stats(&self) -> StoreResult<Stats> {
        Ok(self.tables.read().await.global_stats.clone())
    }

    // ── Events ───────────────────────────────────────────────────────

    async fn add_event(&self, event: NewEvent) -> StoreResult<Event> {
        let mut t = self.tables.write().await;
        let event = event.into_event(EventId(next(&mut t.ids.event)), Utc::now());
        t.events.push(event.clone());
        Ok(event)
    }

    async fn get_events(&self, limit: usize) -> StoreResult<Vec<Event>> {
        Ok(self
            .tables
            .read()
            .await
            .events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
