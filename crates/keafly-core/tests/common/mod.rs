// Shared fixtures: a gateway that records every command and answers from
// a closure, plus daemon and engine builders.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keafly_api::{KeaCommand, KeaResponse, ResponseCode};
use serde_json::{Value, json};

use keafly_core::gateway::{AgentGateway, GatewayResult};
use keafly_core::{
    AccessPoint, ConfigModule, Daemon, DaemonId, DaemonLocker, DaemonName, DaemonRegistry,
    EventCenter, KeaConfig, MachineId, MemoryStore, Store,
};

type Responder = Box<dyn Fn(&Daemon, &KeaCommand) -> KeaResponse + Send + Sync>;

pub struct FakeGateway {
    calls: Mutex<Vec<(DaemonId, KeaCommand)>>,
    responder: Responder,
}

impl FakeGateway {
    pub fn new(responder: impl Fn(&Daemon, &KeaCommand) -> KeaResponse + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        })
    }

    /// Answers every command with success and no arguments.
    pub fn ok() -> Arc<Self> {
        Self::new(|_, _| KeaResponse::success(None))
    }

    pub fn failing(text: &'static str) -> Arc<Self> {
        Self::new(move |_, _| KeaResponse::failure(ResponseCode::Error, text))
    }

    pub fn calls(&self) -> Vec<(DaemonId, KeaCommand)> {
        self.calls.lock().unwrap().clone()
    }

    /// `(daemon id, command name)` of every recorded call, in order.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.calls()
            .into_iter()
            .map(|(id, c)| (id.get(), c.command))
            .collect()
    }
}

#[async_trait]
impl AgentGateway for FakeGateway {
    async fn forward_to_kea(&self, daemon: &Daemon, commands: &[KeaCommand], _timeout: Duration) -> GatewayResult {
        let mut responses = Vec::with_capacity(commands.len());
        for command in commands {
            self.calls.lock().unwrap().push((daemon.id, command.clone()));
            responses.push((self.responder)(daemon, command));
        }
        GatewayResult::new(responses)
    }
}

// ── Daemons ─────────────────────────────────────────────────────────

pub fn daemon(id: i64, name: DaemonName, version: &str) -> Daemon {
    let mut daemon = Daemon::new(
        MachineId(1),
        name,
        AccessPoint::control(format!("10.0.0.{id}"), 8000),
    );
    daemon.id = DaemonId(id);
    daemon.version = Some(version.to_owned());
    daemon.active = true;
    daemon
}

/// A DHCP daemon loading the lease_cmds hook.
pub fn lease_daemon(id: i64, name: DaemonName, version: &str) -> Daemon {
    let mut daemon = daemon(id, name, version);
    let mut body = serde_json::Map::new();
    body.insert(
        "hooks-libraries".into(),
        json!([{"library": "/usr/lib/kea/hooks/libdhcp_lease_cmds.so"}]),
    );
    daemon.config = Some(Arc::new(KeaConfig::with_root(name, body)));
    daemon
}

pub fn dhcp4(id: i64, version: &str) -> Daemon {
    daemon(id, DaemonName::Dhcp4, version)
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub registry: Arc<DaemonRegistry>,
    pub locker: Arc<DaemonLocker>,
    pub module: ConfigModule,
}

impl Harness {
    pub fn new(gateway: Arc<FakeGateway>, daemons: Vec<Daemon>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(DaemonRegistry::new());
        for daemon in daemons {
            registry.upsert(daemon);
        }
        let locker = Arc::new(DaemonLocker::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let module = ConfigModule::new(
            Arc::clone(&dyn_store),
            gateway.clone(),
            Arc::clone(&registry),
            Arc::clone(&locker),
            Arc::new(EventCenter::new(dyn_store)),
        );
        Self {
            store,
            gateway,
            registry,
            locker,
            module,
        }
    }
}

pub fn arguments(command: &KeaCommand) -> Value {
    command.arguments.clone().unwrap_or(Value::Null)
}
