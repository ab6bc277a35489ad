//! Command dispatch: bridges CLI args -> control plane -> output formatting.

pub mod config_cmd;
pub mod ha;
pub mod leases;
pub mod pull;
pub mod scheduled;
pub mod serve;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use keafly_config::Config;
use keafly_core::{ControlPlane, HttpAgentGateway, MemoryStore, Store};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Load the configuration file named by `--config`, or the default one.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let config = match &global.config {
        Some(path) => keafly_config::load_config_from(path)?,
        None => keafly_config::load_config()?,
    };
    Ok(config)
}

/// Build and start a control plane for the active profile.
///
/// One-shot commands get no background tasks; `serve` keeps the
/// configured intervals.
pub async fn open(global: &GlobalOpts, background: bool) -> Result<ControlPlane, CliError> {
    let cfg = load_config(global)?;
    let profile = keafly_config::active_profile_name(global.profile.as_deref(), &cfg);
    let mut config = keafly_config::profile_to_control_plane_config(&cfg, &profile)?;
    if !background {
        config.state_pull_interval = Duration::ZERO;
        config.stats_pull_interval = Duration::ZERO;
        config.due_scan_interval = Duration::ZERO;
    }
    tracing::debug!(profile = %profile, machines = config.machines.len(), "opening control plane");

    let gateway = Arc::new(HttpAgentGateway::new(config.transport.clone()));
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let plane = ControlPlane::new(config, store, gateway);
    plane.start().await?;
    Ok(plane)
}

/// Refresh every daemon once, warning about the ones that did not answer.
pub async fn pull_state(plane: &ControlPlane, global: &GlobalOpts) -> Result<(), CliError> {
    let report = plane.pull_state().await?;
    crate::output::print_erred(&report.unreachable, global.quiet);
    for (daemon_id, err) in &report.errors {
        tracing::warn!(daemon_id = %daemon_id, error = %err, "state pull failed");
    }
    Ok(())
}

/// Dispatch a command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Pull => pull::handle(global).await,
        Command::Leases(args) => leases::handle(args, global).await,
        Command::Stats(args) => stats::handle(args, global).await,
        Command::Ha => ha::handle(global).await,
        Command::Scheduled => scheduled::handle(global).await,
        Command::Serve => serve::handle(global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(args) => {
            use clap::CommandFactory;

            let mut cmd = crate::cli::Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "keafly", &mut std::io::stdout());
            Ok(())
        }
    }
}
