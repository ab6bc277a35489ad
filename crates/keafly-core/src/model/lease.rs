// ── Leases ──
//
// Leases are never persisted; they are read straight out of lease_cmds
// responses and tagged with the daemon that returned them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::DaemonId;

/// Lease state code Kea uses for declined addresses.
pub const LEASE_STATE_DECLINED: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum LeaseType {
    #[serde(rename = "IA_NA")]
    #[strum(serialize = "IA_NA")]
    IaNa,
    #[serde(rename = "IA_PD")]
    #[strum(serialize = "IA_PD")]
    IaPd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Lease {
    /// Daemon that reported the lease; not part of Kea's payload.
    #[serde(default, skip_serializing_if = "is_unassigned")]
    pub daemon_id: DaemonId,
    pub ip_address: String,
    /// IPv6 only; v4 leases carry no type.
    #[serde(default, rename = "type")]
    pub lease_type: Option<LeaseType>,
    #[serde(default)]
    pub state: i64,
    #[serde(default)]
    pub subnet_id: i64,
    #[serde(default)]
    pub hw_address: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub duid: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub cltt: i64,
    #[serde(default)]
    pub valid_lft: i64,
    #[serde(default)]
    pub preferred_lft: Option<i64>,
    #[serde(default)]
    pub prefix_len: Option<u8>,
    #[serde(default)]
    pub iaid: Option<u32>,
    #[serde(default)]
    pub fqdn_fwd: Option<bool>,
    #[serde(default)]
    pub fqdn_rev: Option<bool>,
    #[serde(default)]
    pub user_context: Option<Value>,
}

fn is_unassigned(id: &DaemonId) -> bool {
    !id.is_assigned()
}

impl Lease {
    pub fn is_declined(&self) -> bool {
        self.state == LEASE_STATE_DECLINED
    }

    /// Expiration as unix seconds.
    pub fn expires_at(&self) -> i64 {
        self.cltt + self.valid_lft
    }
}

/// Extract leases from a lease command's `arguments`.
///
/// `lease4-get` returns the lease itself; the multi-lease commands wrap
/// them in `{"leases": [...]}`.
pub fn leases_from_arguments(arguments: &Value) -> Result<Vec<Lease>, serde_json::Error> {
    match arguments.get("leases") {
        Some(list) => Vec::<Lease>::deserialize(list),
        None if arguments.get("ip-address").is_some() => {
            Lease::deserialize(arguments).map(|lease| vec![lease])
        }
        None => Ok(Vec::new()),
    }
}
