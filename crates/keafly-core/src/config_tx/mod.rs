//! Configuration transactions.
//!
//! Every change to a daemon's configuration runs as Begin → Apply →
//! Commit on a [`TransactionContext`]:
//!
//! - **Begin** loads the before-image and locks the daemons it touches.
//!   Adds load and lock nothing.
//! - **Apply** takes the edited entity, computes the after-image and the
//!   ordered, daemon-annotated command list. It never suspends.
//! - **Commit** sends the commands in order, stops at the first failure,
//!   and writes the after-image to the store only when every command
//!   succeeded. Locks are released on every exit path.
//!
//! A context that has been applied but not committed can instead be
//! scheduled; the due-scanner commits it later from its persisted recipe.

mod commands;
mod context;
mod recipe;
mod schedule;

pub use context::{ConfigUpdate, TransactionContext, TransactionState};
pub use recipe::{
    AnnotatedCommand, DaemonConfigImage, GlobalParametersRecipe, HostRecipe, Recipe,
    SharedNetworkRecipe, SubnetRecipe,
};
pub use schedule::DueChangesReport;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::LockPolicy;
use crate::error::CoreError;
use crate::events::EventCenter;
use crate::gateway::AgentGateway;
use crate::locker::DaemonLocker;
use crate::model::{
    Daemon, DaemonId, Host, HostDataSource, HostId, NewEvent, Operation, SharedNetwork,
    SharedNetworkId, Subnet, SubnetId, UserId,
};
use crate::registry::DaemonRegistry;
use crate::store::Store;

/// Per-command deadline used when none is configured.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// The transaction engine.
pub struct ConfigModule {
    store: Arc<dyn Store>,
    gateway: Arc<dyn AgentGateway>,
    registry: Arc<DaemonRegistry>,
    locker: Arc<DaemonLocker>,
    events: Arc<EventCenter>,
    command_timeout: Duration,
    lock_policy: LockPolicy,
}

impl ConfigModule {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn AgentGateway>,
        registry: Arc<DaemonRegistry>,
        locker: Arc<DaemonLocker>,
        events: Arc<EventCenter>,
    ) -> Self {
        Self {
            store,
            gateway,
            registry,
            locker,
            events,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            lock_policy: LockPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn locker(&self) -> &Arc<DaemonLocker> {
        &self.locker
    }

    fn lock_into(&self, ctx: &mut TransactionContext, daemon_ids: &[DaemonId]) -> Result<(), CoreError> {
        let missing = ctx.unlocked(daemon_ids);
        if !missing.is_empty() {
            ctx.add_lock(self.locker.lock(&missing)?);
        }
        ctx.add_daemons(daemon_ids);
        Ok(())
    }

    fn begin_locked(
        &self,
        user_id: Option<UserId>,
        update: ConfigUpdate,
        daemon_ids: &[DaemonId],
    ) -> Result<TransactionContext, CoreError> {
        let mut ctx = TransactionContext::new(user_id, update);
        self.lock_into(&mut ctx, daemon_ids)?;
        if let Some(update) = ctx.state.updates.last_mut() {
            update.daemon_ids = daemon_ids.to_vec();
        }
        Ok(ctx)
    }

    // ── Hosts ────────────────────────────────────────────────────────

    pub fn begin_host_add(&self, user_id: Option<UserId>) -> TransactionContext {
        TransactionContext::new(
            user_id,
            ConfigUpdate::new(Operation::KeaHostAdd, Recipe::Host(HostRecipe::default())),
        )
    }

    pub async fn begin_host_update(
        &self,
        user_id: Option<UserId>,
        host_id: HostId,
    ) -> Result<TransactionContext, CoreError> {
        let host = self.load_host(host_id).await?;
        let daemon_ids = host.daemon_ids();
        let recipe = Recipe::Host(HostRecipe {
            host_before: Some(host),
            ..HostRecipe::default()
        });
        self.begin_locked(
            user_id,
            ConfigUpdate::new(Operation::KeaHostUpdate, recipe),
            &daemon_ids,
        )
    }

    pub async fn begin_host_delete(
        &self,
        user_id: Option<UserId>,
        host_id: HostId,
    ) -> Result<TransactionContext, CoreError> {
        let host = self.load_host(host_id).await?;
        let daemon_ids = host.daemon_ids();
        let recipe = Recipe::Host(HostRecipe {
            host_before: Some(host),
            ..HostRecipe::default()
        });
        self.begin_locked(
            user_id,
            ConfigUpdate::new(Operation::KeaHostDelete, recipe),
            &daemon_ids,
        )
    }

    async fn load_host(&self, id: HostId) -> Result<Host, CoreError> {
        self.store
            .get_host(id)
            .await?
            .ok_or_else(|| CoreError::not_found("host", id))
    }

    /// Validate `host` and compute the reservation-add commands.
    pub fn apply_host_add(&self, ctx: &mut TransactionContext, mut host: Host) -> Result<(), CoreError> {
        if host.identifiers.is_empty() {
            return Err(CoreError::validation("host must have at least one identifier"));
        }
        host.id = HostId::UNASSIGNED;
        for local in &mut host.local_hosts {
            local.data_source = HostDataSource::Api;
        }
        let commands = commands::host_add(&self.registry, &host)?;
        let daemon_ids = host.daemon_ids();

        let update = ctx.update_mut(Operation::KeaHostAdd)?;
        update.daemon_ids.clone_from(&daemon_ids);
        update.recipe = Recipe::Host(HostRecipe {
            host_before: None,
            host_after: Some(host),
            commands,
            added_host_id: None,
        });
        ctx.add_daemons(&daemon_ids);
        Ok(())
    }

    /// Replace the API-managed copies of the host; configuration-file
    /// copies carry over from the before-image untouched.
    pub fn apply_host_update(&self, ctx: &mut TransactionContext, mut host: Host) -> Result<(), CoreError> {
        let before = match &ctx.update_mut(Operation::KeaHostUpdate)?.recipe {
            Recipe::Host(HostRecipe {
                host_before: Some(before),
                ..
            }) => before.clone(),
            _ => return Err(CoreError::validation("host update has no before-image")),
        };
        if host.identifiers.is_empty() {
            return Err(CoreError::validation("host must have at least one identifier"));
        }
        host.id = before.id;
        host.local_hosts.retain(|l| l.data_source == HostDataSource::Api);
        host.local_hosts.extend(
            before
                .local_hosts
                .iter()
                .filter(|l| l.data_source == HostDataSource::Config)
                .cloned(),
        );

        let commands = commands::host_update(&self.registry, &before, &host)?;
        let daemon_ids = host.daemon_ids();
        self.lock_into(ctx, &daemon_ids)?;

        let update = ctx.update_mut(Operation::KeaHostUpdate)?;
        for id in &daemon_ids {
            if !update.daemon_ids.contains(id) {
                update.daemon_ids.push(*id);
            }
        }
        update.recipe = Recipe::Host(HostRecipe {
            host_before: Some(before),
            host_after: Some(host),
            commands,
            added_host_id: None,
        });
        Ok(())
    }

    pub fn apply_host_delete(&self, ctx: &mut TransactionContext) -> Result<(), CoreError> {
        let update = ctx.update_mut(Operation::KeaHostDelete)?;
        let Recipe::Host(recipe) = &mut update.recipe else {
            return Err(CoreError::validation("host delete carries no host recipe"));
        };
        let before = recipe
            .host_before
            .as_ref()
            .ok_or_else(|| CoreError::validation("host delete has no before-image"))?;
        recipe.commands = commands::host_delete(&self.registry, before)?;
        Ok(())
    }

    // ── Subnets ──────────────────────────────────────────────────────

    pub fn begin_subnet_add(&self, user_id: Option<UserId>) -> TransactionContext {
        TransactionContext::new(
            user_id,
            ConfigUpdate::new(Operation::KeaSubnetAdd, Recipe::Subnet(SubnetRecipe::default())),
        )
    }

    pub async fn begin_subnet_update(
        &self,
        user_id: Option<UserId>,
        subnet_id: SubnetId,
    ) -> Result<TransactionContext, CoreError> {
        let subnet = self.load_subnet(subnet_id).await?;
        let daemon_ids = subnet.daemon_ids();
        let recipe = Recipe::Subnet(SubnetRecipe {
            subnet_before: Some(subnet),
            ..SubnetRecipe::default()
        });
        self.begin_locked(
            user_id,
            ConfigUpdate::new(Operation::KeaSubnetUpdate, recipe),
            &daemon_ids,
        )
    }

    pub async fn begin_subnet_delete(
        &self,
        user_id: Option<UserId>,
        subnet_id: SubnetId,
    ) -> Result<TransactionContext, CoreError> {
        let subnet = self.load_subnet(subnet_id).await?;
        let daemon_ids = subnet.daemon_ids();
        let recipe = Recipe::Subnet(SubnetRecipe {
            subnet_before: Some(subnet),
            ..SubnetRecipe::default()
        });
        self.begin_locked(
            user_id,
            ConfigUpdate::new(Operation::KeaSubnetDelete, recipe),
            &daemon_ids,
        )
    }

    async fn load_subnet(&self, id: SubnetId) -> Result<Subnet, CoreError> {
        self.store
            .get_subnet(id)
            .await?
            .ok_or_else(|| CoreError::not_found("subnet", id))
    }

    pub fn apply_subnet_add(&self, ctx: &mut TransactionContext, mut subnet: Subnet) -> Result<(), CoreError> {
        if subnet.local_subnets.is_empty() {
            return Err(CoreError::validation(format!(
                "subnet {} is not assigned to any daemon",
                subnet.prefix
            )));
        }
        subnet.id = SubnetId::UNASSIGNED;
        let commands = commands::subnet_add(&self.registry, &subnet)?;
        let daemon_ids = subnet.daemon_ids();

        let update = ctx.update_mut(Operation::KeaSubnetAdd)?;
        update.daemon_ids.clone_from(&daemon_ids);
        update.recipe = Recipe::Subnet(SubnetRecipe {
            subnet_before: None,
            subnet_after: Some(subnet),
            commands,
            added_subnet_id: None,
        });
        ctx.add_daemons(&daemon_ids);
        Ok(())
    }

    /// Diff the subnet per daemon: update where it stays, add where it
    /// is new, delete where it is gone.
    pub fn apply_subnet_update(&self, ctx: &mut TransactionContext, mut subnet: Subnet) -> Result<(), CoreError> {
        let before = match &ctx.update_mut(Operation::KeaSubnetUpdate)?.recipe {
            Recipe::Subnet(SubnetRecipe {
                subnet_before: Some(before),
                ..
            }) => before.clone(),
            _ => return Err(CoreError::validation("subnet update has no before-image")),
        };
        if subnet.prefix != before.prefix || subnet.family != before.family {
            return Err(CoreError::validation(format!(
                "subnet prefix cannot change from {} to {}",
                before.prefix, subnet.prefix
            )));
        }
        subnet.id = before.id;
        let commands = commands::subnet_update(&self.registry, &before, &subnet)?;
        let daemon_ids = subnet.daemon_ids();
        self.lock_into(ctx, &daemon_ids)?;

        let update = ctx.update_mut(Operation::KeaSubnetUpdate)?;
        for id in &daemon_ids {
            if !update.daemon_ids.contains(id) {
                update.daemon_ids.push(*id);
            }
        }
        update.recipe = Recipe::Subnet(SubnetRecipe {
            subnet_before: Some(before),
            subnet_after: Some(subnet),
            commands,
            added_subnet_id: None,
        });
        Ok(())
    }

    pub fn apply_subnet_delete(&self, ctx: &mut TransactionContext) -> Result<(), CoreError> {
        let update = ctx.update_mut(Operation::KeaSubnetDelete)?;
        let Recipe::Subnet(recipe) = &mut update.recipe else {
            return Err(CoreError::validation("subnet delete carries no subnet recipe"));
        };
        let before = recipe
            .subnet_before
            .as_ref()
            .ok_or_else(|| CoreError::validation("subnet delete has no before-image"))?;
        recipe.commands = commands::subnet_delete(&self.registry, before)?;
        Ok(())
    }

    // ── Shared networks ──────────────────────────────────────────────

    pub fn begin_shared_network_add(&self, user_id: Option<UserId>) -> TransactionContext {
        TransactionContext::new(
            user_id,
            ConfigUpdate::new(
                Operation::KeaSharedNetworkAdd,
                Recipe::SharedNetwork(SharedNetworkRecipe::default()),
            ),
        )
    }

    pub async fn begin_shared_network_update(
        &self,
        user_id: Option<UserId>,
        network_id: SharedNetworkId,
    ) -> Result<TransactionContext, CoreError> {
        let network = self.load_shared_network(network_id).await?;
        let daemon_ids = network.daemon_ids();
        let recipe = Recipe::SharedNetwork(SharedNetworkRecipe {
            shared_network_before: Some(network),
            ..SharedNetworkRecipe::default()
        });
        self.begin_locked(
            user_id,
            ConfigUpdate::new(Operation::KeaSharedNetworkUpdate, recipe),
            &daemon_ids,
        )
    }

    pub async fn begin_shared_network_delete(
        &self,
        user_id: Option<UserId>,
        network_id: SharedNetworkId,
    ) -> Result<TransactionContext, CoreError> {
        let network = self.load_shared_network(network_id).await?;
        let daemon_ids = network.daemon_ids();
        let recipe = Recipe::SharedNetwork(SharedNetworkRecipe {
            shared_network_before: Some(network),
            ..SharedNetworkRecipe::default()
        });
        self.begin_locked(
            user_id,
            ConfigUpdate::new(Operation::KeaSharedNetworkDelete, recipe),
            &daemon_ids,
        )
    }

    async fn load_shared_network(&self, id: SharedNetworkId) -> Result<SharedNetwork, CoreError> {
        self.store
            .get_shared_network(id)
            .await?
            .ok_or_else(|| CoreError::not_found("shared network", id))
    }

    pub fn apply_shared_network_add(
        &self,
        ctx: &mut TransactionContext,
        mut network: SharedNetwork,
    ) -> Result<(), CoreError> {
        if network.local_shared_networks.is_empty() {
            return Err(CoreError::validation(format!(
                "shared network {} is not assigned to any daemon",
                network.name
            )));
        }
        network.id = SharedNetworkId::UNASSIGNED;
        for subnet in &mut network.subnets {
            subnet.shared_network_name = Some(network.name.clone());
        }
        let commands = commands::shared_network_add(&self.registry, &network)?;
        let daemon_ids = network.daemon_ids();

        let update = ctx.update_mut(Operation::KeaSharedNetworkAdd)?;
        update.daemon_ids.clone_from(&daemon_ids);
        update.recipe = Recipe::SharedNetwork(SharedNetworkRecipe {
            shared_network_before: None,
            shared_network_after: Some(network),
            commands,
            added_shared_network_id: None,
        });
        ctx.add_daemons(&daemon_ids);
        Ok(())
    }

    pub fn apply_shared_network_update(
        &self,
        ctx: &mut TransactionContext,
        mut network: SharedNetwork,
    ) -> Result<(), CoreError> {
        let before = match &ctx.update_mut(Operation::KeaSharedNetworkUpdate)?.recipe {
            Recipe::SharedNetwork(SharedNetworkRecipe {
                shared_network_before: Some(before),
                ..
            }) => before.clone(),
            _ => {
                return Err(CoreError::validation(
                    "shared network update has no before-image",
                ));
            }
        };
        network.id = before.id;
        for subnet in &mut network.subnets {
            subnet.shared_network_id = Some(before.id);
            subnet.shared_network_name = Some(network.name.clone());
        }
        let commands = commands::shared_network_update(&self.registry, &before, &network)?;
        let daemon_ids = network.daemon_ids();
        self.lock_into(ctx, &daemon_ids)?;

        let update = ctx.update_mut(Operation::KeaSharedNetworkUpdate)?;
        for id in &daemon_ids {
            if !update.daemon_ids.contains(id) {
                update.daemon_ids.push(*id);
            }
        }
        update.recipe = Recipe::SharedNetwork(SharedNetworkRecipe {
            shared_network_before: Some(before),
            shared_network_after: Some(network),
            commands,
            added_shared_network_id: None,
        });
        Ok(())
    }

    pub fn apply_shared_network_delete(&self, ctx: &mut TransactionContext) -> Result<(), CoreError> {
        let update = ctx.update_mut(Operation::KeaSharedNetworkDelete)?;
        let Recipe::SharedNetwork(recipe) = &mut update.recipe else {
            return Err(CoreError::validation(
                "shared network delete carries no shared network recipe",
            ));
        };
        let before = recipe
            .shared_network_before
            .as_ref()
            .ok_or_else(|| CoreError::validation("shared network delete has no before-image"))?;
        recipe.commands = commands::shared_network_delete(&self.registry, before)?;
        Ok(())
    }

    // ── Global parameters ────────────────────────────────────────────

    /// Lock the daemons and capture their current configurations.
    pub async fn begin_global_parameters_update(
        &self,
        user_id: Option<UserId>,
        daemon_ids: &[DaemonId],
    ) -> Result<TransactionContext, CoreError> {
        if daemon_ids.is_empty() {
            return Err(CoreError::validation("no daemons selected"));
        }
        let mut configs_before = Vec::with_capacity(daemon_ids.len());
        for id in daemon_ids {
            let daemon = self
                .store
                .get_daemon_by_id(*id)
                .await?
                .ok_or_else(|| CoreError::not_found("daemon", id))?;
            let config = daemon.config.as_deref().cloned().ok_or_else(|| {
                CoreError::validation(format!("{daemon} has no known configuration"))
            })?;
            configs_before.push(DaemonConfigImage {
                daemon_id: *id,
                config,
            });
        }
        let recipe = Recipe::GlobalParameters(GlobalParametersRecipe {
            configs_before,
            ..GlobalParametersRecipe::default()
        });
        self.begin_locked(
            user_id,
            ConfigUpdate::new(Operation::KeaGlobalParametersUpdate, recipe),
            daemon_ids,
        )
    }

    /// `partials` holds, per daemon, only the parameters being changed.
    pub fn apply_global_parameters_update(
        &self,
        ctx: &mut TransactionContext,
        partials: &BTreeMap<DaemonId, Map<String, Value>>,
    ) -> Result<(), CoreError> {
        let update = ctx.update_mut(Operation::KeaGlobalParametersUpdate)?;
        let order = update.daemon_ids.clone();
        let Recipe::GlobalParameters(recipe) = &mut update.recipe else {
            return Err(CoreError::validation(
                "global parameters update carries no parameters recipe",
            ));
        };
        if let Some(stray) = partials.keys().find(|id| !order.contains(id)) {
            return Err(CoreError::validation(format!(
                "daemon {stray} was not selected for this transaction"
            )));
        }

        recipe.commands = commands::global_parameters_update(&self.registry, partials, &order)?;
        recipe.configs_after = recipe
            .configs_before
            .iter()
            .filter_map(|image| {
                partials.get(&image.daemon_id).map(|partial| DaemonConfigImage {
                    daemon_id: image.daemon_id,
                    config: image.config.merged(partial),
                })
            })
            .collect();
        Ok(())
    }

    // ── Commit ───────────────────────────────────────────────────────

    /// Send every command and persist the after-images.
    ///
    /// On failure nothing is persisted; commands already accepted by a
    /// daemon stay in effect there. Locks are released either way.
    pub async fn commit(&self, ctx: TransactionContext) -> Result<TransactionState, CoreError> {
        let (mut state, locks) = ctx.into_parts();
        let result = self.commit_state(&mut state).await;
        drop(locks);
        result.map(|()| state)
    }

    async fn commit_state(&self, state: &mut TransactionState) -> Result<(), CoreError> {
        if !state.has_commands() {
            debug!("nothing to commit");
            return Ok(());
        }
        for update in &state.updates {
            self.dispatch(update.recipe.commands()).await?;
        }
        for update in &mut state.updates {
            if update.recipe.commands().is_empty() {
                continue;
            }
            self.persist(update).await?;
            info!(
                operation = %update.operation,
                daemons = ?update.daemon_ids,
                scheduled = state.scheduled,
                "transaction committed"
            );
        }
        Ok(())
    }

    async fn daemon_for(&self, id: DaemonId) -> Result<Arc<Daemon>, CoreError> {
        if let Some(daemon) = self.registry.get(id) {
            return Ok(daemon);
        }
        self.store
            .get_daemon_by_id(id)
            .await?
            .map(Arc::new)
            .ok_or_else(|| CoreError::not_found("daemon", id))
    }

    async fn dispatch(&self, commands: &[AnnotatedCommand]) -> Result<(), CoreError> {
        for annotated in commands {
            let daemon = self.daemon_for(annotated.daemon_id).await?;
            let command = &annotated.command;
            let result = self
                .gateway
                .forward_to_kea(&daemon, std::slice::from_ref(command), self.command_timeout)
                .await;
            let (error, responses) = result.into_parts();
            if let Some(error) = error {
                return Err(error);
            }
            let response = responses.into_iter().next().ok_or_else(|| CoreError::Transport {
                daemon: daemon.to_string(),
                reason: format!("no response to {}", command.command),
            })?;
            response
                .check(&command.command, daemon.name.as_ref())
                .map_err(|e| CoreError::from_api(e, &daemon.to_string()))?;
            debug!(daemon_id = %daemon.id, command = %command.command, "command accepted");
        }
        Ok(())
    }

    async fn persist(&self, update: &mut ConfigUpdate) -> Result<(), CoreError> {
        let operation = update.operation;
        let kind = update.recipe.kind();
        let missing = |what: &str| CoreError::Internal(format!("{operation} recipe has no {what}"));

        let event = match (&mut update.recipe, operation) {
            (Recipe::Host(r), Operation::KeaHostAdd) => {
                let after = r.host_after.clone().ok_or_else(|| missing("after-image"))?;
                let added = self.store.add_host(after).await?;
                r.added_host_id = Some(added.id);
                r.host_after = Some(added);
                None
            }
            (Recipe::Host(r), Operation::KeaHostUpdate) => {
                let after = r.host_after.as_ref().ok_or_else(|| missing("after-image"))?;
                self.store.update_host(after).await?;
                None
            }
            (Recipe::Host(r), Operation::KeaHostDelete) => {
                let before = r.host_before.as_ref().ok_or_else(|| missing("before-image"))?;
                self.store.delete_host(before.id).await?;
                None
            }
            (Recipe::Subnet(r), Operation::KeaSubnetAdd) => {
                let after = r.subnet_after.clone().ok_or_else(|| missing("after-image"))?;
                let added = self.store.add_subnet(after).await?;
                let event = NewEvent::info(format!("added subnet {}", added.prefix)).for_subnet(added.id);
                r.added_subnet_id = Some(added.id);
                r.subnet_after = Some(added);
                Some(event)
            }
            (Recipe::Subnet(r), Operation::KeaSubnetUpdate) => {
                let after = r.subnet_after.as_ref().ok_or_else(|| missing("after-image"))?;
                self.store.update_subnet(after).await?;
                None
            }
            (Recipe::Subnet(r), Operation::KeaSubnetDelete) => {
                let before = r.subnet_before.as_ref().ok_or_else(|| missing("before-image"))?;
                self.store.delete_subnet(before.id).await?;
                Some(NewEvent::info(format!("deleted subnet {}", before.prefix)))
            }
            (Recipe::SharedNetwork(r), Operation::KeaSharedNetworkAdd) => {
                let after = r
                    .shared_network_after
                    .clone()
                    .ok_or_else(|| missing("after-image"))?;
                let added = self.store.add_shared_network(after).await?;
                r.added_shared_network_id = Some(added.id);
                r.shared_network_after = Some(added);
                None
            }
            (Recipe::SharedNetwork(r), Operation::KeaSharedNetworkUpdate) => {
                let after = r
                    .shared_network_after
                    .as_ref()
                    .ok_or_else(|| missing("after-image"))?;
                self.store.update_shared_network(after).await?;
                None
            }
            (Recipe::SharedNetwork(r), Operation::KeaSharedNetworkDelete) => {
                let before = r
                    .shared_network_before
                    .as_ref()
                    .ok_or_else(|| missing("before-image"))?;
                self.store.delete_shared_network_with_subnets(before.id).await?;
                Some(NewEvent::info(format!("deleted shared network {}", before.name)))
            }
            (Recipe::GlobalParameters(r), Operation::KeaGlobalParametersUpdate) => {
                for image in &r.configs_after {
                    self.store_config(image).await?;
                }
                None
            }
            _ => {
                return Err(CoreError::Internal(format!(
                    "{operation} cannot be committed with a {kind} recipe"
                )));
            }
        };

        if let Some(event) = event {
            self.events.emit(event).await;
        }
        Ok(())
    }

    async fn store_config(&self, image: &DaemonConfigImage) -> Result<(), CoreError> {
        let mut daemon = self
            .store
            .get_daemon_by_id(image.daemon_id)
            .await?
            .ok_or_else(|| CoreError::not_found("daemon", image.daemon_id))?;
        daemon.config_hash = Some(image.config.hash());
        daemon.config = Some(Arc::new(image.config.clone()));
        self.store.update_daemon(&daemon).await?;
        self.registry.upsert(daemon);
        Ok(())
    }
}
