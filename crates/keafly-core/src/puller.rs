// ── Pullers ──
//
// Periodic work driven by the control plane: the state puller refreshes
// every monitored daemon and folds configuration changes into the store,
// the statistics puller collects lease counters and recomputes
// utilization.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keafly_api::KeaCommand;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::events::EventCenter;
use crate::extract::{detect_global_hosts, detect_networks};
use crate::gateway::AgentGateway;
use crate::ha::{apply_ha_status, detect_services};
use crate::model::{Daemon, DaemonId, NewEvent};
use crate::reconcile::refresh;
use crate::registry::DaemonRegistry;
use crate::stats::{RecountSummary, parse_statistics, recount};
use crate::store::Store;

// ── State puller ────────────────────────────────────────────────────

/// Result of pulling one daemon.
#[derive(Debug, Default, PartialEq)]
pub struct DaemonPull {
    pub reachable: bool,
    pub config_changed: bool,
    /// Subnets that appeared in the store because of this pull.
    pub new_subnets: usize,
    pub events: usize,
}

#[derive(Debug, Default)]
pub struct StatePullReport {
    pub pulled: usize,
    pub unreachable: Vec<DaemonId>,
    pub errors: Vec<(DaemonId, CoreError)>,
}

pub struct StatePuller {
    store: Arc<dyn Store>,
    gateway: Arc<dyn AgentGateway>,
    registry: Arc<DaemonRegistry>,
    events: Arc<EventCenter>,
    timeout: Duration,
}

impl StatePuller {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn AgentGateway>,
        registry: Arc<DaemonRegistry>,
        events: Arc<EventCenter>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            registry,
            events,
            timeout,
        }
    }

    /// Pull every monitored daemon known to the store.
    pub async fn pull_all(&self, now: DateTime<Utc>) -> Result<StatePullReport, CoreError> {
        let mut report = StatePullReport::default();
        for daemon in self.store.get_daemons().await? {
            if !daemon.monitored {
                continue;
            }
            let id = daemon.id;
            match self.pull_daemon(&daemon, now).await {
                Ok(pull) => {
                    report.pulled += 1;
                    if !pull.reachable {
                        report.unreachable.push(id);
                    }
                }
                Err(e) => {
                    warn!(daemon_id = %id, error = %e, "state pull failed");
                    report.errors.push((id, e));
                }
            }
        }
        debug!(pulled = report.pulled, unreachable = report.unreachable.len(), "state pull finished");
        Ok(report)
    }

    /// Refresh one daemon and persist everything derived from it.
    ///
    /// The new config hash is stored only once its networks, hosts and
    /// services are committed; on failure the old hash stays so the next
    /// pull retries. Events produced by the refresh are always emitted.
    pub async fn pull_daemon(&self, daemon: &Daemon, now: DateTime<Utc>) -> Result<DaemonPull, CoreError> {
        let outcome = refresh(self.gateway.as_ref(), daemon, self.timeout, now).await;
        let mut fresh = outcome.daemon;
        let mut pull = DaemonPull {
            reachable: outcome.error.is_none(),
            config_changed: outcome.change.is_config_changed,
            ..DaemonPull::default()
        };
        if let Some(e) = &outcome.error {
            debug!(daemon_id = %daemon.id, error = %e, "daemon unreachable");
        }

        let mut commit_error = None;
        if pull.reachable && pull.config_changed && fresh.name.is_dhcp() {
            match self.commit_config(&fresh).await {
                Ok(added) => pull.new_subnets = added,
                Err(e) => {
                    warn!(daemon_id = %daemon.id, error = %e, "configuration not committed, keeping previous hash");
                    fresh.config_hash.clone_from(&daemon.config_hash);
                    commit_error = Some(e);
                }
            }
        }

        self.store.update_daemon(&fresh).await?;
        self.registry.upsert(fresh.clone());

        pull.events = outcome.change.events.len();
        self.events.emit_all(outcome.change.events).await;

        if let Some(e) = commit_error {
            return Err(e);
        }
        if let Some(status) = &outcome.ha_status {
            self.apply_ha(&fresh, status, now).await?;
        }
        Ok(pull)
    }

    async fn commit_config(&self, daemon: &Daemon) -> Result<usize, CoreError> {
        let family = daemon.family();
        let subnets = self.store.get_all_subnets(family).await?;
        let networks = self.store.get_all_shared_networks(family).await?;
        let extracted = detect_networks(daemon, &subnets, &networks)?;
        let known_hosts = self.store.get_hosts_by_daemon(daemon.id, None).await?;
        let hosts = detect_global_hosts(daemon, &known_hosts)?;

        // A broken HA block leaves the daemon usable outside HA.
        let services = match detect_services(daemon) {
            Ok(services) => services,
            Err(e) => {
                warn!(daemon_id = %daemon.id, error = %e, "HA detection failed, daemon treated as non-HA");
                self.events
                    .emit(
                        NewEvent::warning(format!("HA configuration of {daemon} ignored"))
                            .for_daemon(daemon.id, daemon.machine_id)
                            .with_details(e.to_string()),
                    )
                    .await;
                Vec::new()
            }
        };

        let added = self
            .store
            .commit_networks_into_db(daemon.id, extracted.networks, extracted.subnets)
            .await?;
        self.store.commit_global_hosts_into_db(daemon.id, hosts).await?;
        self.store.commit_services_into_db(daemon.id, services).await?;
        if !added.is_empty() {
            self.events
                .emit(
                    NewEvent::info(format!("found {} new subnets on {daemon}", added.len()))
                        .for_daemon(daemon.id, daemon.machine_id),
                )
                .await;
        }
        info!(daemon_id = %daemon.id, new_subnets = added.len(), "configuration committed");
        Ok(added.len())
    }

    async fn apply_ha(&self, daemon: &Daemon, status: &serde_json::Value, now: DateTime<Utc>) -> Result<(), CoreError> {
        let mut services = self.store.get_services_by_daemon(daemon.id).await?;
        let changed = apply_ha_status(&mut services, daemon.id, status, now)?;
        for service in services.iter().filter(|s| changed.contains(&s.id)) {
            self.store.update_service(service).await?;
        }
        Ok(())
    }
}

// ── Statistics puller ───────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StatsPullReport {
    pub daemons: usize,
    pub subnets: usize,
    pub recount: RecountSummary,
    pub errors: Vec<(DaemonId, CoreError)>,
}

pub struct StatsPuller {
    store: Arc<dyn Store>,
    gateway: Arc<dyn AgentGateway>,
    registry: Arc<DaemonRegistry>,
    timeout: Duration,
}

impl StatsPuller {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn AgentGateway>,
        registry: Arc<DaemonRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            registry,
            timeout,
        }
    }

    /// Collect counters from every active DHCP daemon, then recompute
    /// utilization for the whole fleet.
    pub async fn pull(&self, now: DateTime<Utc>) -> Result<StatsPullReport, CoreError> {
        let mut report = StatsPullReport::default();
        let daemons = self.registry.snapshot();
        for daemon in daemons.iter().filter(|d| d.active && d.monitored && d.name.is_dhcp()) {
            match self.pull_daemon(daemon, now).await {
                Ok(subnets) => {
                    report.daemons += 1;
                    report.subnets += subnets;
                }
                Err(e) => {
                    warn!(daemon_id = %daemon.id, error = %e, "statistics pull failed");
                    report.errors.push((daemon.id, e));
                }
            }
        }
        report.recount = recount(self.store.as_ref()).await?;
        debug!(
            daemons = report.daemons,
            subnets = report.recount.subnets,
            shared_networks = report.recount.shared_networks,
            "statistics pull finished"
        );
        Ok(report)
    }

    async fn pull_daemon(&self, daemon: &Daemon, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let command = KeaCommand::new("statistic-get-all", daemon.name.as_ref()).with_arguments(json!({}));
        let (error, responses) = self
            .gateway
            .forward_to_kea(daemon, std::slice::from_ref(&command), self.timeout)
            .await
            .into_parts();
        if let Some(error) = error {
            return Err(error);
        }
        let response = responses
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::Transport {
                daemon: daemon.to_string(),
                reason: "no response to statistic-get-all".to_owned(),
            })?
            .check(&command.command, daemon.name.as_ref())
            .map_err(|e| CoreError::from_api(e, &daemon.to_string()))?;
        let Some(arguments) = response.arguments.as_ref() else {
            return Ok(0);
        };
        let parsed = parse_statistics(arguments);

        let mut updated = 0;
        for mut subnet in self.store.get_daemon_local_subnets(daemon.id).await? {
            if parsed.apply_to(daemon.id, &mut subnet, now) {
                self.store.set_subnet_stats(&subnet).await?;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
