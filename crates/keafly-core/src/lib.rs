//! Control plane core for fleets of Kea DHCP servers.
//!
//! This crate owns the domain model and every piece of business logic of
//! the keafly workspace:
//!
//! - **[`ControlPlane`]**: Central facade: enrolls the configured fleet,
//!   spawns the state puller, the statistics puller and the scheduled
//!   change due-scanner, and vends the engines below.
//!
//! - **[`ConfigModule`]**: Configuration transactions. Begin / Apply /
//!   Commit over a [`TransactionContext`], per-daemon locking through the
//!   [`DaemonLocker`], and scheduling of applied contexts for later commit.
//!
//! - **[`LeaseAggregator`]**: Parallel lease queries across every daemon
//!   with the lease_cmds hook, version-gated declined-lease enumeration and
//!   host reservation conflict detection.
//!
//! - **Reconciliation** ([`reconcile`], [`extract`], [`ha`]): Turns the
//!   version/config/status of a daemon into snapshots, events, subnets,
//!   shared networks, global reservations and HA services.
//!
//! - **Statistics** ([`stats`]): Big counters and utilization folding
//!   over subnets, shared networks and the global scope.
//!
//! - **[`Store`]**: The persistence contract, with [`MemoryStore`] as the
//!   in-process implementation.

pub mod config;
pub mod config_tx;
pub mod controller;
pub mod error;
pub mod events;
pub mod extract;
pub mod fingerprint;
pub mod gateway;
pub mod ha;
pub mod keaconfig;
pub mod leases;
pub mod locker;
pub mod model;
pub mod puller;
pub mod reconcile;
pub mod registry;
pub mod stats;
pub mod store;
pub mod version;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControlPlaneConfig, LockPolicy, MachineConfig};
pub use config_tx::{
    AnnotatedCommand, ConfigModule, ConfigUpdate, DueChangesReport, Recipe, TransactionContext,
    TransactionState,
};
pub use controller::ControlPlane;
pub use error::CoreError;
pub use events::EventCenter;
pub use gateway::{AgentGateway, GatewayResult, HttpAgentGateway};
pub use keaconfig::KeaConfig;
pub use leases::{HostLease, HostLeases, LeaseAggregator, LeaseQuery, LeaseSearchResult};
pub use locker::{DaemonLockGuard, DaemonLocker};
pub use puller::{StatePullReport, StatePuller, StatsPullReport, StatsPuller};
pub use registry::DaemonRegistry;
pub use stats::{BigCounter, StatisticsCounter};
pub use store::{MemoryStore, Store};
pub use version::KeaVersion;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Fleet
    AccessPoint, Daemon, DaemonId, DaemonName, Family, Machine, MachineId,
    // Networks
    AddressPool, LocalSharedNetwork, LocalSubnet, PrefixPool, SharedNetwork, SharedNetworkId,
    Subnet, SubnetId,
    // Hosts
    Host, HostDataSource, HostId, HostIdentifier, HostIdentifierType, LocalHost,
    // HA, leases, events
    Event, EventLevel, HaMode, Lease, Service,
    // Scheduling
    Operation, ScheduledChangeId, ScheduledConfigChange, UserId,
};
