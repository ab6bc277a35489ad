//! `pull`: refresh every daemon once and list what answered.

use serde::Serialize;
use tabled::Tabled;

use keafly_core::Daemon;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Clone, Serialize, Tabled)]
struct DaemonRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Daemon")]
    name: String,
    #[tabled(rename = "Agent")]
    agent: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Active")]
    active: bool,
    #[tabled(rename = "Uptime")]
    uptime: i64,
    #[tabled(rename = "Config")]
    config_hash: String,
}

impl From<&Daemon> for DaemonRow {
    fn from(d: &Daemon) -> Self {
        Self {
            id: d.id.get(),
            name: d.name.to_string(),
            agent: d
                .control_access_point()
                .map_or_else(|| "-".into(), |ap| format!("{}:{}", ap.address, ap.port)),
            version: output::or_dash(d.version.as_deref()),
            active: d.active,
            uptime: d.uptime,
            config_hash: d
                .config_hash
                .as_deref()
                .map_or_else(|| "-".into(), |h| h.chars().take(12).collect()),
        }
    }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let plane = super::open(global, false).await?;
    super::pull_state(&plane, global).await?;

    let mut daemons: Vec<DaemonRow> = plane
        .registry()
        .snapshot()
        .iter()
        .map(|d| DaemonRow::from(&**d))
        .collect();
    daemons.sort_by_key(|d| d.id);

    let out = output::render_list(global.output, &daemons, DaemonRow::clone, |d| d.id.to_string())?;
    output::print_output(&out, global.quiet);
    plane.shutdown().await;
    Ok(())
}
