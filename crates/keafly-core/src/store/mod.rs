// ── Persistent store contract ──
//
// Every component reads and writes the fleet model through `Store`.
// Implementations must apply each multi-table call (commits, orphan
// sweeps, deletes with cascades) atomically.

mod memory;

pub use memory::MemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::{
    Daemon, DaemonId, Event, Family, Host, HostDataSource, HostId, Machine, NewEvent,
    ScheduledChangeId, ScheduledConfigChange, Service, SharedNetwork, SharedNetworkId, Stats,
    Subnet, SubnetId,
};

pub type StoreResult<T> = Result<T, CoreError>;

/// Reservation counts outside any subnet, per statistic family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalReservationCounts {
    /// IPv4 address reservations.
    pub addresses: u64,
    /// IPv6 address reservations.
    pub nas: u64,
    /// IPv6 prefix reservations.
    pub pds: u64,
}

/// Utilization figures computed for a subnet or shared network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Utilization {
    pub addr_utilization: f64,
    pub pd_utilization: f64,
    pub stats: Stats,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── Machines and daemons ─────────────────────────────────────────

    async fn add_machine(&self, machine: Machine) -> StoreResult<Machine>;
    async fn get_machines(&self) -> StoreResult<Vec<Machine>>;
    async fn add_daemon(&self, daemon: Daemon) -> StoreResult<Daemon>;
    async fn update_daemon(&self, daemon: &Daemon) -> StoreResult<()>;
    async fn get_daemon_by_id(&self, id: DaemonId) -> StoreResult<Option<Daemon>>;
    async fn get_daemons(&self) -> StoreResult<Vec<Daemon>>;
    async fn get_dhcp_daemons(&self) -> StoreResult<Vec<Daemon>>;

    // ── Subnets ──────────────────────────────────────────────────────

    async fn get_subnet(&self, id: SubnetId) -> StoreResult<Option<Subnet>>;
    async fn get_subnets_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Subnet>>;
    async fn add_subnet(&self, subnet: Subnet) -> StoreResult<Subnet>;
    async fn update_subnet(&self, subnet: &Subnet) -> StoreResult<()>;
    async fn delete_subnet(&self, id: SubnetId) -> StoreResult<()>;
    /// All subnets, optionally restricted to one family.
    async fn get_all_subnets(&self, family: Option<Family>) -> StoreResult<Vec<Subnet>>;
    /// Subnets served by at least one daemon.
    async fn get_subnets_with_local_subnets(&self) -> StoreResult<Vec<Subnet>>;
    async fn get_daemon_local_subnets(&self, daemon_id: DaemonId) -> StoreResult<Vec<Subnet>>;

    // ── Shared networks ──────────────────────────────────────────────

    /// The network with its member subnets.
    async fn get_shared_network(&self, id: SharedNetworkId) -> StoreResult<Option<SharedNetwork>>;
    async fn get_all_shared_networks(&self, family: Option<Family>)
    -> StoreResult<Vec<SharedNetwork>>;
    /// Insert the network and any nested subnets not yet persisted.
    async fn add_shared_network(&self, network: SharedNetwork) -> StoreResult<SharedNetwork>;
    /// Replace the network row; nested subnets are upserted and subnets
    /// that left the network are detached to the global scope.
    async fn update_shared_network(&self, network: &SharedNetwork) -> StoreResult<()>;
    /// Delete the network, detaching its subnets.
    async fn delete_shared_network(&self, id: SharedNetworkId) -> StoreResult<()>;
    /// Delete the network together with its subnets and their hosts.
    async fn delete_shared_network_with_subnets(&self, id: SharedNetworkId) -> StoreResult<()>;

    // ── Config commits ───────────────────────────────────────────────

    /// Replace everything `daemon_id` contributes to subnets and shared
    /// networks (including config-sourced subnet reservations) with the
    /// given candidates, then sweep orphans. Returns the subnets that did
    /// not exist before.
    async fn commit_networks_into_db(
        &self,
        daemon_id: DaemonId,
        networks: Vec<SharedNetwork>,
        subnets: Vec<Subnet>,
    ) -> StoreResult<Vec<Subnet>>;

    /// Replace the daemon's config-sourced global reservations.
    async fn commit_global_hosts_into_db(
        &self,
        daemon_id: DaemonId,
        hosts: Vec<Host>,
    ) -> StoreResult<()>;

    /// Replace the daemon's HA memberships with the given proposals.
    async fn commit_services_into_db(
        &self,
        daemon_id: DaemonId,
        services: Vec<Service>,
    ) -> StoreResult<Vec<Service>>;

    async fn delete_daemon_from_hosts(
        &self,
        daemon_id: DaemonId,
        source: Option<HostDataSource>,
    ) -> StoreResult<usize>;
    async fn delete_daemon_from_subnets(&self, daemon_id: DaemonId) -> StoreResult<usize>;
    async fn delete_daemon_from_shared_networks(&self, daemon_id: DaemonId) -> StoreResult<usize>;
    async fn delete_daemon_from_services(&self, daemon_id: DaemonId) -> StoreResult<usize>;
    async fn delete_orphaned_hosts(&self) -> StoreResult<usize>;
    async fn delete_orphaned_subnets(&self) -> StoreResult<usize>;
    async fn delete_orphaned_shared_networks(&self) -> StoreResult<usize>;
    async fn delete_orphaned_services(&self) -> StoreResult<usize>;

    // ── Hosts ────────────────────────────────────────────────────────

    async fn get_host(&self, id: HostId) -> StoreResult<Option<Host>>;
    async fn add_host(&self, host: Host) -> StoreResult<Host>;
    async fn update_host(&self, host: &Host) -> StoreResult<()>;
    async fn delete_host(&self, id: HostId) -> StoreResult<()>;
    async fn get_hosts_by_daemon(
        &self,
        daemon_id: DaemonId,
        source: Option<HostDataSource>,
    ) -> StoreResult<Vec<Host>>;

    // ── HA services ──────────────────────────────────────────────────

    async fn get_services_by_daemon(&self, daemon_id: DaemonId) -> StoreResult<Vec<Service>>;
    async fn get_all_services(&self) -> StoreResult<Vec<Service>>;
    async fn update_service(&self, service: &Service) -> StoreResult<()>;

    // ── Scheduled config changes ─────────────────────────────────────

    async fn add_scheduled_config_change(
        &self,
        change: ScheduledConfigChange,
    ) -> StoreResult<ScheduledConfigChange>;
    /// Unexecuted changes whose deadline has passed, oldest deadline first.
    async fn get_due_config_changes(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ScheduledConfigChange>>;
    async fn get_scheduled_config_changes(&self) -> StoreResult<Vec<ScheduledConfigChange>>;
    async fn mark_scheduled_config_change_executed(
        &self,
        id: ScheduledChangeId,
        error: Option<String>,
    ) -> StoreResult<()>;
    async fn delete_scheduled_config_change(&self, id: ScheduledChangeId) -> StoreResult<()>;

    // ── Statistics ───────────────────────────────────────────────────

    /// Per subnet, address reservations lying outside every address pool.
    async fn count_out_of_pool_address_reservations(&self) -> StoreResult<HashMap<SubnetId, u64>>;
    /// Per subnet, prefix reservations lying outside every prefix pool.
    async fn count_out_of_pool_prefix_reservations(&self) -> StoreResult<HashMap<SubnetId, u64>>;
    async fn count_global_reservations(&self) -> StoreResult<GlobalReservationCounts>;
    /// Daemons that are standby or backup in some relationship and active
    /// in none.
    async fn get_passive_ha_daemon_ids(&self) -> StoreResult<Vec<DaemonId>>;
    /// Store the statistics carried by `subnet` (local subnet and pool
    /// counters, utilization) without touching its configuration.
    async fn set_subnet_stats(&self, subnet: &Subnet) -> StoreResult<()>;
    async fn update_statistics_in_shared_network(
        &self,
        id: SharedNetworkId,
        utilization: Utilization,
    ) -> StoreResult<()>;
    async fn set_global_stats(&self, stats: Stats) -> StoreResult<()>;
    async fn get_global_stats(&self) -> StoreResult<Stats>;

    // ── Events ───────────────────────────────────────────────────────

    async fn add_event(&self, event: NewEvent) -> StoreResult<Event>;
    /// Most recent events first.
    async fn get_events(&self, limit: usize) -> StoreResult<Vec<Event>>;
}
