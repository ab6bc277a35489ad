// ── statistic-get-all parsing ──
//
// Kea reports every statistic as `name: [[value, timestamp], …]`, newest
// sample first. Scoped names look like `subnet[3].assigned-addresses`,
// `subnet[3].pool[0].total-addresses` or `subnet[3].pd-pool[1].total-pds`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::BigCounter;
use crate::model::{DaemonId, Stats, Subnet};

/// Counters of one local subnet and its pools, keyed by Kea's pool id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubnetStatistics {
    pub stats: Stats,
    pub pools: BTreeMap<i64, Stats>,
    pub pd_pools: BTreeMap<i64, Stats>,
}

/// Everything one daemon reported, keyed by local subnet id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonStatistics {
    pub subnets: BTreeMap<i64, SubnetStatistics>,
    pub global: Stats,
}

enum Scope {
    Subnet(i64),
    Pool(i64, i64),
    PdPool(i64, i64),
}

/// `prefix[N]rest` → `(N, rest)`.
fn indexed<'a>(text: &'a str, prefix: &str) -> Option<(i64, &'a str)> {
    let rest = text.strip_prefix(prefix)?.strip_prefix('[')?;
    let (index, rest) = rest.split_once(']')?;
    Some((index.parse().ok()?, rest))
}

fn parse_name(name: &str) -> Option<(Option<Scope>, &str)> {
    let Some((subnet, rest)) = indexed(name, "subnet") else {
        return Some((None, name));
    };
    let rest = rest.strip_prefix('.')?;
    if let Some((pool, stat)) = indexed(rest, "pool") {
        return Some((Some(Scope::Pool(subnet, pool)), stat.strip_prefix('.')?));
    }
    if let Some((pool, stat)) = indexed(rest, "pd-pool") {
        return Some((Some(Scope::PdPool(subnet, pool)), stat.strip_prefix('.')?));
    }
    Some((Some(Scope::Subnet(subnet)), rest))
}

/// Newest sample of a statistic.
fn latest(samples: &Value) -> Option<BigCounter> {
    match samples {
        Value::Array(list) => match list.first()? {
            Value::Array(sample) => BigCounter::from_json(sample.first()?),
            other => BigCounter::from_json(other),
        },
        other => BigCounter::from_json(other),
    }
}

/// Parse the `arguments` object of a `statistic-get-all` response.
///
/// Malformed names and non-integral samples are skipped.
pub fn parse_statistics(arguments: &Value) -> DaemonStatistics {
    let mut parsed = DaemonStatistics::default();
    let Some(entries) = arguments.as_object() else {
        return parsed;
    };

    for (name, samples) in entries {
        let Some(value) = latest(samples) else {
            continue;
        };
        let Some((scope, stat)) = parse_name(name) else {
            continue;
        };
        let stat = stat.to_owned();
        match scope {
            None => {
                parsed.global.insert(stat, value);
            }
            Some(Scope::Subnet(id)) => {
                parsed.subnets.entry(id).or_default().stats.insert(stat, value);
            }
            Some(Scope::Pool(id, pool)) => {
                parsed
                    .subnets
                    .entry(id)
                    .or_default()
                    .pools
                    .entry(pool)
                    .or_default()
                    .insert(stat, value);
            }
            Some(Scope::PdPool(id, pool)) => {
                parsed
                    .subnets
                    .entry(id)
                    .or_default()
                    .pd_pools
                    .entry(pool)
                    .or_default()
                    .insert(stat, value);
            }
        }
    }
    parsed
}

impl DaemonStatistics {
    /// Copy the counters of `daemon_id`'s local subnet into `subnet`.
    ///
    /// Returns `false` when the daemon does not serve the subnet or
    /// reported nothing for it.
    pub fn apply_to(&self, daemon_id: DaemonId, subnet: &mut Subnet, now: DateTime<Utc>) -> bool {
        let Some(local) = subnet.local_subnet_mut(daemon_id) else {
            return false;
        };
        let Some(reported) = self.subnets.get(&local.local_subnet_id) else {
            return false;
        };
        local.stats.clone_from(&reported.stats);
        for pool in &mut local.address_pools {
            pool.stats = reported.pools.get(&pool.stats_key()).cloned().unwrap_or_default();
        }
        for pool in &mut local.prefix_pools {
            pool.stats = reported
                .pd_pools
                .get(&pool.stats_key())
                .cloned()
                .unwrap_or_default();
        }
        local.stats_collected_at = Some(now);
        true
    }
}
