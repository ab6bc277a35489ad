//! Lease statistics: big counters, utilization folding and the Kea
//! `statistic-get-all` reply parser.

mod counter;
mod kea;
mod statistics;

pub use counter::{BigCounter, NativeCount};
pub use kea::{DaemonStatistics, SubnetStatistics, parse_statistics};
pub use statistics::{
    ASSIGNED_ADDRESSES, ASSIGNED_NAS, ASSIGNED_PDS, DECLINED_ADDRESSES, DECLINED_NAS,
    RecountSummary, StatisticsCounter, TOTAL_ADDRESSES, TOTAL_NAS, TOTAL_PDS, out_of_pool_name,
    recount, utilization_of,
};
