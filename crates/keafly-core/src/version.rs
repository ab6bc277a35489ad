// ── Kea version gating ──
//
// Every protocol choice that depends on the daemon release goes through
// this module. Versions are parsed leniently: Kea reports strings such as
// `2.6.1` or `2.7.0-git`, so only the leading `x.y.z` triple is compared.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed Kea release number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeaVersion(Version);

impl KeaVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// Parse the leading `x.y.z` of a version string.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(v) = Version::parse(raw) {
            return Some(Self(Version::new(v.major, v.minor, v.patch)));
        }
        let head: String = raw
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = head.split('.').filter(|p| !p.is_empty());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        Some(Self::new(major, minor, patch))
    }

    pub fn semver(&self) -> &Version {
        &self.0
    }
}

impl fmt::Display for KeaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Thresholds ──────────────────────────────────────────────────────

/// First release that re-counts statistics after subnet commands
/// without a `config-reload`.
pub const STATS_RECOUNT_WITHOUT_RELOAD: KeaVersion = KeaVersion::new(2, 6, 0);

/// First release that rejects client identifiers shorter than three bytes.
pub const MIN_IDENTIFIER_LENGTH_ENFORCED: KeaVersion = KeaVersion::new(2, 3, 8);

/// Last release in which declined leases are found by an empty identifier.
pub const LAST_EMPTY_IDENTIFIER_DECLINED: KeaVersion = KeaVersion::new(3, 1, 0);

/// First release offering `leaseN-get-by-state`.
pub const LEASE_GET_BY_STATE: KeaVersion = KeaVersion::new(3, 1, 5);

/// First release reporting HA state in the `ha-servers` form.
pub const HA_SERVERS_STATUS: KeaVersion = KeaVersion::new(1, 7, 8);

/// Shortest identifier (in bytes) sent as such to daemons enforcing
/// [`MIN_IDENTIFIER_LENGTH_ENFORCED`].
pub const MIN_IDENTIFIER_BYTES: usize = 3;

// ── Policies ────────────────────────────────────────────────────────

/// Whether a daemon must be reloaded after subnet changes.
///
/// Unknown versions are assumed current and need no reload.
pub fn needs_reload_after_subnet_change(version: Option<&KeaVersion>) -> bool {
    version.is_some_and(|v| *v < STATS_RECOUNT_WITHOUT_RELOAD)
}

/// Whether a daemon rejects identifiers of `len` bytes.
///
/// Unknown versions are treated as the latest release.
pub fn rejects_short_identifier(version: Option<&KeaVersion>, len: usize) -> bool {
    len < MIN_IDENTIFIER_BYTES && version.is_none_or(|v| *v >= MIN_IDENTIFIER_LENGTH_ENFORCED)
}

/// How declined leases are enumerated on a given daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclinedLeaseQuery {
    /// `leaseN-get-by-state {state: 1}`.
    ByState,
    /// Empty hw-address / DUID query; `duid` is the DUID text to send.
    ByEmptyIdentifier { duid: &'static str },
    /// The release offers no way to enumerate declined leases.
    Unsupported,
}

/// Select the declined-lease query for a daemon release.
///
/// Unknown versions are unsupported because the 3.1.1 to 3.1.4 gap
/// cannot be ruled out.
pub fn declined_lease_query(version: Option<&KeaVersion>) -> DeclinedLeaseQuery {
    let Some(v) = version else {
        return DeclinedLeaseQuery::Unsupported;
    };
    if *v >= LEASE_GET_BY_STATE {
        DeclinedLeaseQuery::ByState
    } else if *v > LAST_EMPTY_IDENTIFIER_DECLINED {
        DeclinedLeaseQuery::Unsupported
    } else if *v >= MIN_IDENTIFIER_LENGTH_ENFORCED {
        DeclinedLeaseQuery::ByEmptyIdentifier { duid: "00:00:00" }
    } else {
        DeclinedLeaseQuery::ByEmptyIdentifier { duid: "0" }
    }
}
