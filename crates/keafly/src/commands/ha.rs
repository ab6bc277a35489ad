//! `ha`: HA relationships and the last known state of their servers.

use chrono::{DateTime, Utc};
use tabled::Tabled;

use keafly_core::model::PeerStatus;
use keafly_core::{DaemonId, Service};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Relationship")]
    name: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Primary")]
    primary: String,
    #[tabled(rename = "Secondary")]
    secondary: String,
    #[tabled(rename = "Backups")]
    backups: usize,
    #[tabled(rename = "Last failover")]
    failover: String,
}

fn server(id: Option<DaemonId>, status: &PeerStatus) -> String {
    match id {
        Some(id) => format!(
            "{id} ({})",
            status.last_state.as_deref().unwrap_or("unknown")
        ),
        None => "-".into(),
    }
}

fn last_failover(service: &Service) -> String {
    [
        service.primary_status.failover_at,
        service.secondary_status.failover_at,
    ]
    .into_iter()
    .flatten()
    .max()
    .map_or_else(|| "-".into(), |t: DateTime<Utc>| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn service_row(s: &Service) -> ServiceRow {
    ServiceRow {
        id: s.id.get(),
        name: s.name(),
        mode: s.mode.to_string(),
        primary: server(s.primary_id, &s.primary_status),
        secondary: server(s.secondary_id, &s.secondary_status),
        backups: s.backup_ids.len(),
        failover: last_failover(s),
    }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let plane = super::open(global, false).await?;
    super::pull_state(&plane, global).await?;

    let services = plane.store().get_all_services().await?;
    let out = output::render_list(global.output, &services, service_row, Service::name)?;
    output::print_output(&out, global.quiet);
    plane.shutdown().await;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use keafly_core::{DaemonName, HaMode};

    #[test]
    fn row_shows_server_states() {
        let mut service = Service::new(DaemonName::Dhcp4, "server1", HaMode::HotStandby);
        service.primary_id = Some(DaemonId(1));
        service.primary_status.last_state = Some("hot-standby".into());
        service.secondary_id = Some(DaemonId(2));

        let row = service_row(&service);
        assert_eq!(row.name, "dhcp4/server1");
        assert_eq!(row.mode, "hot-standby");
        assert_eq!(row.primary, "1 (hot-standby)");
        assert_eq!(row.secondary, "2 (unknown)");
        assert_eq!(row.failover, "-");
    }
}
