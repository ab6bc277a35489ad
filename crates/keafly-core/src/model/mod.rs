// ── Domain model ──
//
// Canonical representation of the monitored Kea fleet. Per-daemon
// projections (LocalSubnet, LocalHost, LocalSharedNetwork) reference their
// daemon by `DaemonId` only; daemons themselves live in the store and the
// daemon registry.

pub mod daemon;
pub mod event;
pub mod host;
pub mod identifier;
pub mod ids;
pub mod lease;
pub mod network;
pub mod option;
pub mod schedule;
pub mod service;

// ── Re-exports ──────────────────────────────────────────────────────

// Identity
pub use ids::{
    DaemonId, EventId, HostId, MachineId, ScheduledChangeId, ServiceId, SharedNetworkId, SubnetId,
    UserId,
};

// Fleet
pub use daemon::{AccessPoint, AccessPointType, Daemon, DaemonName, Family, LogTarget, Machine};

// Networks
pub use network::{
    AddressPool, KeaParameters, LocalSharedNetwork, LocalSubnet, PrefixPool, SharedNetwork, Stats,
    Subnet, normalize_prefix,
};
pub use option::{DhcpOption, options_to_kea};

// Hosts
pub use host::{Host, HostDataSource, IpReservation, LocalHost};
pub use identifier::{HostIdentifier, HostIdentifierType, format_hex, is_hex_identifier, parse_hex};

// HA
pub use service::{HaMode, HaPeer, HaRole, PeerStatus, Service};

// Leases
pub use lease::{LEASE_STATE_DECLINED, Lease, LeaseType, leases_from_arguments};

// Events
pub use event::{Event, EventLevel, NewEvent};

// Scheduling
pub use schedule::{Operation, PersistedConfigUpdate, ScheduledConfigChange};
