// ── Agent gateway ──
//
// The seam between the control plane and the Kea control agents. Core
// components hand a daemon and an ordered batch of commands to an
// `AgentGateway`; the HTTP implementation forwards them one request at a
// time through `keafly_api::KeaClient`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use keafly_api::{KeaClient, KeaCommand, KeaResponse, TransportConfig};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{Daemon, MachineId};

/// Responses to a forwarded batch, in command order.
///
/// A transport failure stops the batch: `responses` then holds only the
/// answers received before it.
#[derive(Debug, Default)]
pub struct GatewayResult {
    error: Option<CoreError>,
    responses: Vec<KeaResponse>,
}

impl GatewayResult {
    pub fn new(responses: Vec<KeaResponse>) -> Self {
        Self {
            error: None,
            responses,
        }
    }

    pub fn failed(error: CoreError, responses: Vec<KeaResponse>) -> Self {
        Self {
            error: Some(error),
            responses,
        }
    }

    /// Transport-level error, if the batch did not complete.
    pub fn first_error(&self) -> Option<&CoreError> {
        self.error.as_ref()
    }

    pub fn responses(&self) -> &[KeaResponse] {
        &self.responses
    }

    pub fn response(&self, index: usize) -> Option<&KeaResponse> {
        self.responses.get(index)
    }

    pub fn into_parts(self) -> (Option<CoreError>, Vec<KeaResponse>) {
        (self.error, self.responses)
    }
}

#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Send `commands` to `daemon` in order, all under one deadline.
    async fn forward_to_kea(
        &self,
        daemon: &Daemon,
        commands: &[KeaCommand],
        timeout: Duration,
    ) -> GatewayResult;

    /// Use dedicated transport settings for one machine. Gateways without
    /// per-machine transports ignore this.
    fn configure_machine(&self, _machine_id: MachineId, _transport: TransportConfig) {}
}

// ── HTTP implementation ─────────────────────────────────────────────

/// Forwards commands over HTTP to each daemon's control access point.
pub struct HttpAgentGateway {
    default_transport: TransportConfig,
    machine_transports: DashMap<MachineId, TransportConfig>,
    clients: DashMap<String, Arc<KeaClient>>,
}

impl HttpAgentGateway {
    pub fn new(default_transport: TransportConfig) -> Self {
        Self {
            default_transport,
            machine_transports: DashMap::new(),
            clients: DashMap::new(),
        }
    }

    /// Use dedicated transport settings (credentials, TLS) for one machine.
    pub fn set_machine_transport(&self, machine_id: MachineId, transport: TransportConfig) {
        self.machine_transports.insert(machine_id, transport);
        self.clients
            .retain(|key, _| !key.starts_with(&format!("{machine_id}|")));
    }

    fn client_for(&self, daemon: &Daemon) -> Result<Arc<KeaClient>, CoreError> {
        let ap = daemon.control_access_point().ok_or_else(|| {
            CoreError::validation(format!("{daemon} has no control access point"))
        })?;
        let key = format!("{}|{}://{}:{}", daemon.machine_id, ap.scheme, ap.address, ap.port);
        if let Some(client) = self.clients.get(&key) {
            return Ok(Arc::clone(client.value()));
        }

        let transport = self
            .machine_transports
            .get(&daemon.machine_id)
            .map_or_else(|| self.default_transport.clone(), |t| t.value().clone());
        let client = KeaClient::for_access_point(&ap.scheme, &ap.address, ap.port, &transport)
            .map(Arc::new)
            .map_err(|e| CoreError::from_api(e, &daemon.to_string()))?;
        self.clients.insert(key, Arc::clone(&client));
        Ok(client)
    }
}

#[async_trait]
impl AgentGateway for HttpAgentGateway {
    fn configure_machine(&self, machine_id: MachineId, transport: TransportConfig) {
        self.set_machine_transport(machine_id, transport);
    }

    async fn forward_to_kea(
        &self,
        daemon: &Daemon,
        commands: &[KeaCommand],
        timeout: Duration,
    ) -> GatewayResult {
        let client = match self.client_for(daemon) {
            Ok(client) => client,
            Err(e) => return GatewayResult::failed(e, Vec::new()),
        };
        let deadline = Instant::now() + timeout;
        let mut responses = Vec::with_capacity(commands.len());

        for command in commands {
            debug!(daemon_id = %daemon.id, command = %command.command, "forwarding command");
            let outcome = match timeout_at(deadline, client.send_one(command)).await {
                Ok(result) => result.map_err(|e| CoreError::from_api(e, &daemon.to_string())),
                Err(_) => Err(CoreError::Transport {
                    daemon: daemon.to_string(),
                    reason: format!("timed out after {}ms", timeout.as_millis()),
                }),
            };
            match outcome {
                Ok(response) => responses.push(response),
                Err(e) => {
                    warn!(daemon_id = %daemon.id, command = %command.command, error = %e, "command not delivered");
                    return GatewayResult::failed(e, responses);
                }
            }
        }
        GatewayResult::new(responses)
    }
}
