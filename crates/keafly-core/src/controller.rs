// ── Control plane ──
//
// Long-lived facade over the whole core: owns the store, the gateway, the
// daemon registry and locker, and the background tasks (state puller,
// statistics puller, scheduled change due-scanner). Consumers reach the
// transaction engine and the lease aggregator through it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControlPlaneConfig;
use crate::config_tx::{ConfigModule, DueChangesReport};
use crate::error::CoreError;
use crate::events::EventCenter;
use crate::gateway::AgentGateway;
use crate::leases::LeaseAggregator;
use crate::locker::DaemonLocker;
use crate::model::{AccessPoint, Daemon, Event, Machine, MachineId};
use crate::puller::{StatePullReport, StatePuller, StatsPullReport, StatsPuller};
use crate::registry::DaemonRegistry;
use crate::store::Store;

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControlPlaneInner>`.
#[derive(Clone)]
pub struct ControlPlane {
    inner: Arc<ControlPlaneInner>,
}

struct ControlPlaneInner {
    config: ControlPlaneConfig,
    store: Arc<dyn Store>,
    gateway: Arc<dyn AgentGateway>,
    registry: Arc<DaemonRegistry>,
    events: Arc<EventCenter>,
    config_module: ConfigModule,
    leases: LeaseAggregator,
    state_puller: StatePuller,
    stats_puller: StatsPuller,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ControlPlane {
    /// Build the control plane. Does not contact any daemon; call
    /// [`start()`](Self::start) to enroll the fleet and spawn the pullers.
    pub fn new(config: ControlPlaneConfig, store: Arc<dyn Store>, gateway: Arc<dyn AgentGateway>) -> Self {
        let registry = Arc::new(DaemonRegistry::new());
        let locker = Arc::new(DaemonLocker::new());
        let events = Arc::new(EventCenter::new(Arc::clone(&store)));

        let config_module = ConfigModule::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&registry),
            locker,
            Arc::clone(&events),
        )
        .with_command_timeout(config.command_timeout)
        .with_lock_policy(config.lock_policy);
        let leases = LeaseAggregator::new(Arc::clone(&registry), Arc::clone(&gateway), config.command_timeout)
            .with_concurrency(config.lease_concurrency);
        let state_puller = StatePuller::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&registry),
            Arc::clone(&events),
            config.refresh_timeout,
        );
        let stats_puller = StatsPuller::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&registry),
            config.command_timeout,
        );

        Self {
            inner: Arc::new(ControlPlaneInner {
                config,
                store,
                gateway,
                registry,
                events,
                config_module,
                leases,
                state_puller,
                stats_puller,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub fn registry(&self) -> &Arc<DaemonRegistry> {
        &self.inner.registry
    }

    /// The configuration transaction engine.
    pub fn config_module(&self) -> &ConfigModule {
        &self.inner.config_module
    }

    pub fn leases(&self) -> &LeaseAggregator {
        &self.inner.leases
    }

    pub fn events(&self) -> broadcast::Receiver<Arc<Event>> {
        self.inner.events.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Enroll the configured fleet, load known daemons into the
    /// registry and spawn the background tasks.
    pub async fn start(&self) -> Result<(), CoreError> {
        let enrolled = self.enroll().await?;
        for daemon in self.inner.store.get_daemons().await? {
            self.inner.registry.upsert(daemon);
        }

        let config = &self.inner.config;
        let mut handles = self.inner.task_handles.lock().await;
        if !config.state_pull_interval.is_zero() {
            handles.push(tokio::spawn(periodic(
                self.clone(),
                config.state_pull_interval,
                Task::StatePull,
            )));
        }
        if !config.stats_pull_interval.is_zero() {
            handles.push(tokio::spawn(periodic(
                self.clone(),
                config.stats_pull_interval,
                Task::StatsPull,
            )));
        }
        if !config.due_scan_interval.is_zero() {
            handles.push(tokio::spawn(periodic(
                self.clone(),
                config.due_scan_interval,
                Task::DueScan,
            )));
        }
        info!(
            daemons = self.inner.registry.len(),
            enrolled,
            tasks = handles.len(),
            "control plane started"
        );
        Ok(())
    }

    /// Cancel the background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        debug!("control plane stopped");
    }

    /// Add configured machines and daemons the store does not know yet.
    /// Returns the number of daemons added.
    pub async fn enroll(&self) -> Result<usize, CoreError> {
        let store = &self.inner.store;
        let mut machines = store.get_machines().await?;
        let daemons = store.get_daemons().await?;
        let mut added = 0;

        for wanted in &self.inner.config.machines {
            let machine = match machines
                .iter()
                .find(|m| m.address == wanted.address && m.agent_port == wanted.agent_port)
            {
                Some(known) => known.clone(),
                None => {
                    let stored = store
                        .add_machine(Machine {
                            id: MachineId::UNASSIGNED,
                            address: wanted.address.clone(),
                            agent_port: wanted.agent_port,
                            name: wanted.name.clone(),
                        })
                        .await?;
                    info!(machine_id = %stored.id, address = %stored.address, "machine enrolled");
                    machines.push(stored.clone());
                    stored
                }
            };

            if let Some(transport) = &wanted.transport {
                self.inner.gateway.configure_machine(machine.id, transport.clone());
            }
            for name in &wanted.daemons {
                if daemons.iter().any(|d| d.machine_id == machine.id && d.name == *name) {
                    continue;
                }
                let mut access_point = AccessPoint::control(&wanted.address, wanted.agent_port);
                access_point.scheme.clone_from(&wanted.scheme);
                let daemon = store.add_daemon(Daemon::new(machine.id, *name, access_point)).await?;
                debug!(daemon_id = %daemon.id, name = %daemon.name, "daemon enrolled");
                added += 1;
            }
        }
        Ok(added)
    }

    // ── One-shot passes ──────────────────────────────────────────────

    pub async fn pull_state(&self) -> Result<StatePullReport, CoreError> {
        self.inner.state_puller.pull_all(Utc::now()).await
    }

    pub async fn pull_statistics(&self) -> Result<StatsPullReport, CoreError> {
        self.inner.stats_puller.pull(Utc::now()).await
    }

    pub async fn commit_due_changes(&self) -> Result<DueChangesReport, CoreError> {
        self.inner.config_module.commit_due_changes(Utc::now()).await
    }
}

// ── Background tasks ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, strum::Display)]
#[strum(serialize_all = "kebab-case")]
enum Task {
    StatePull,
    StatsPull,
    DueScan,
}

async fn periodic(plane: ControlPlane, every: Duration, task: Task) {
    let cancel = plane.inner.cancel.clone();
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let result = match task {
                    Task::StatePull => plane.pull_state().await.map(|_| ()),
                    Task::StatsPull => plane.pull_statistics().await.map(|_| ()),
                    Task::DueScan => plane.commit_due_changes().await.map(|_| ()),
                };
                if let Err(e) = result {
                    warn!(task = %task, error = %e, "periodic task failed");
                }
            }
        }
    }
    debug!(task = %task, "periodic task stopped");
}
