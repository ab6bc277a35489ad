// ── Utilization statistics ──
//
// Folds per-daemon counters reported by Kea into per-subnet,
// per-shared-network and global figures. Counters from passive HA
// daemons are skipped, pools sharing a stats key inside one local subnet
// are counted once, and out-of-pool reservations are added back to the
// totals Kea reports.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info};

use super::BigCounter;
use crate::error::CoreError;
use crate::model::{DaemonId, Family, LocalSubnet, SharedNetworkId, Stats, Subnet, SubnetId};
use crate::store::{GlobalReservationCounts, Store, Utilization};

// ── Statistic names ─────────────────────────────────────────────────

pub const TOTAL_ADDRESSES: &str = "total-addresses";
pub const ASSIGNED_ADDRESSES: &str = "assigned-addresses";
pub const DECLINED_ADDRESSES: &str = "declined-addresses";
pub const TOTAL_NAS: &str = "total-nas";
pub const ASSIGNED_NAS: &str = "assigned-nas";
pub const DECLINED_NAS: &str = "declined-nas";
pub const TOTAL_PDS: &str = "total-pds";
pub const ASSIGNED_PDS: &str = "assigned-pds";

const V4_ADDRESS_STATS: [&str; 3] = [TOTAL_ADDRESSES, ASSIGNED_ADDRESSES, DECLINED_ADDRESSES];
const V6_ADDRESS_STATS: [&str; 3] = [TOTAL_NAS, ASSIGNED_NAS, DECLINED_NAS];
const V6_PREFIX_STATS: [&str; 2] = [TOTAL_PDS, ASSIGNED_PDS];

/// `total-addresses` becomes `total-out-of-pool-addresses`.
pub fn out_of_pool_name(stat: &str) -> String {
    match stat.split_once('-') {
        Some((head, tail)) => format!("{head}-out-of-pool-{tail}"),
        None => format!("{stat}-out-of-pool"),
    }
}

fn address_stats(family: Family) -> &'static [&'static str] {
    match family {
        Family::V4 => &V4_ADDRESS_STATS,
        Family::V6 => &V6_ADDRESS_STATS,
    }
}

/// Every counter read from a local subnet of `family`.
fn reported_stats(family: Family) -> Vec<&'static str> {
    match family {
        Family::V4 => V4_ADDRESS_STATS.to_vec(),
        Family::V6 => V6_ADDRESS_STATS.iter().chain(&V6_PREFIX_STATS).copied().collect(),
    }
}

fn value(stats: &Stats, name: &str) -> BigCounter {
    stats.get(name).cloned().unwrap_or_default()
}

fn accumulate(target: &mut Stats, name: &str, amount: &BigCounter) {
    target.entry(name.to_owned()).or_default().add(amount);
}

fn merge_into(target: &mut Stats, source: &Stats) {
    for (name, amount) in source {
        accumulate(target, name, amount);
    }
}

/// Address and prefix utilization of a scope holding `stats`.
pub fn utilization_of(family: Family, stats: &Stats) -> (f64, f64) {
    let (total, assigned) = match family {
        Family::V4 => (TOTAL_ADDRESSES, ASSIGNED_ADDRESSES),
        Family::V6 => (TOTAL_NAS, ASSIGNED_NAS),
    };
    let addr = value(stats, assigned).divide_safe_by(&value(stats, total));
    let pd = match family {
        Family::V4 => 0.0,
        Family::V6 => value(stats, ASSIGNED_PDS).divide_safe_by(&value(stats, TOTAL_PDS)),
    };
    (addr, pd)
}

// ── Counter ─────────────────────────────────────────────────────────

/// Accumulates subnet statistics into shared-network and global sums.
#[derive(Debug, Default)]
pub struct StatisticsCounter {
    excluded_daemons: HashSet<DaemonId>,
    out_of_pool_addresses: HashMap<SubnetId, u64>,
    out_of_pool_prefixes: HashMap<SubnetId, u64>,
    global_reservations: GlobalReservationCounts,
    networks: BTreeMap<SharedNetworkId, (Family, Stats)>,
    global: Stats,
}

impl StatisticsCounter {
    /// A counter ignoring everything reported by `excluded_daemons`.
    pub fn new(excluded_daemons: impl IntoIterator<Item = DaemonId>) -> Self {
        Self {
            excluded_daemons: excluded_daemons.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_out_of_pool_reservations(
        mut self,
        addresses: HashMap<SubnetId, u64>,
        prefixes: HashMap<SubnetId, u64>,
    ) -> Self {
        self.out_of_pool_addresses = addresses;
        self.out_of_pool_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn with_global_reservations(mut self, counts: GlobalReservationCounts) -> Self {
        self.global_reservations = counts;
        self
    }

    fn counted<'a>(&'a self, subnet: &'a Subnet) -> impl Iterator<Item = &'a LocalSubnet> {
        subnet
            .local_subnets
            .iter()
            .filter(|local| !self.excluded_daemons.contains(&local.daemon_id))
    }

    /// Compute one subnet's figures and fold them into the running sums.
    pub fn add(&mut self, subnet: &Subnet) -> Utilization {
        let family = subnet.family;
        let mut reported = Stats::new();
        let mut in_pools = Stats::new();
        let mut counted = 0usize;

        for local in self.counted(subnet) {
            counted += 1;
            for name in reported_stats(family) {
                accumulate(&mut reported, name, &value(&local.stats, name));
            }

            let mut seen = HashSet::new();
            for pool in &local.address_pools {
                if seen.insert(pool.stats_key()) {
                    for name in address_stats(family) {
                        accumulate(&mut in_pools, name, &value(&pool.stats, name));
                    }
                }
            }
            let mut seen = HashSet::new();
            for pool in &local.prefix_pools {
                if seen.insert(pool.stats_key()) {
                    for name in V6_PREFIX_STATS {
                        accumulate(&mut in_pools, name, &value(&pool.stats, name));
                    }
                }
            }
        }

        if counted == 0 {
            return Utilization::default();
        }

        let mut stats = reported;
        let total_name = address_stats(family)[0];
        if let Some(extra) = self.out_of_pool_addresses.get(&subnet.id) {
            stats.entry(total_name.to_owned()).or_default().add_u64(*extra);
        }
        let prefix_extra = self
            .out_of_pool_prefixes
            .get(&subnet.id)
            .filter(|_| family == Family::V6);
        if let Some(extra) = prefix_extra {
            stats.entry(TOTAL_PDS.to_owned()).or_default().add_u64(*extra);
        }

        for name in reported_stats(family) {
            let mut outside = value(&stats, name);
            outside.subtract(&value(&in_pools, name));
            stats.insert(out_of_pool_name(name), outside);
        }

        if let Some(network_id) = subnet.shared_network_id {
            let entry = self
                .networks
                .entry(network_id)
                .or_insert_with(|| (family, Stats::new()));
            merge_into(&mut entry.1, &stats);
        }
        merge_into(&mut self.global, &stats);

        let (addr_utilization, pd_utilization) = utilization_of(family, &stats);
        Utilization {
            addr_utilization,
            pd_utilization,
            stats,
        }
    }

    /// Sums per shared network of every subnet added so far.
    pub fn shared_networks(&self) -> BTreeMap<SharedNetworkId, Utilization> {
        self.networks
            .iter()
            .map(|(id, (family, stats))| {
                let (addr_utilization, pd_utilization) = utilization_of(*family, stats);
                (
                    *id,
                    Utilization {
                        addr_utilization,
                        pd_utilization,
                        stats: stats.clone(),
                    },
                )
            })
            .collect()
    }

    /// Fleet-wide sums, global reservations included in the totals.
    pub fn global_stats(&self) -> Stats {
        let mut global = self.global.clone();
        let reservations = [
            (TOTAL_ADDRESSES, self.global_reservations.addresses),
            (TOTAL_NAS, self.global_reservations.nas),
            (TOTAL_PDS, self.global_reservations.pds),
        ];
        for (name, count) in reservations {
            if count > 0 {
                global.entry(name.to_owned()).or_default().add_u64(count);
            }
        }
        global
    }
}

// ── Recount ─────────────────────────────────────────────────────────

/// Number of scopes whose statistics were rewritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecountSummary {
    pub subnets: usize,
    pub shared_networks: usize,
}

/// Recompute utilization from the counters currently in the store and
/// persist it for every subnet, shared network and the global scope.
pub async fn recount(store: &dyn Store) -> Result<RecountSummary, CoreError> {
    let passive = store.get_passive_ha_daemon_ids().await?;
    let mut counter = StatisticsCounter::new(passive)
        .with_out_of_pool_reservations(
            store.count_out_of_pool_address_reservations().await?,
            store.count_out_of_pool_prefix_reservations().await?,
        )
        .with_global_reservations(store.count_global_reservations().await?);

    let now = Utc::now();
    let subnets = store.get_subnets_with_local_subnets().await?;
    for mut subnet in subnets.iter().cloned() {
        let utilization = counter.add(&subnet);
        subnet.addr_utilization = utilization.addr_utilization;
        subnet.pd_utilization = utilization.pd_utilization;
        subnet.stats = utilization.stats;
        subnet.stats_collected_at = Some(now);
        store.set_subnet_stats(&subnet).await?;
    }

    let networks = counter.shared_networks();
    for (id, utilization) in &networks {
        store
            .update_statistics_in_shared_network(*id, utilization.clone())
            .await?;
    }
    store.set_global_stats(counter.global_stats()).await?;

    debug!(subnets = subnets.len(), networks = networks.len(), "stored utilization");
    info!("statistics recounted");
    Ok(RecountSummary {
        subnets: subnets.len(),
        shared_networks: networks.len(),
    })
}
