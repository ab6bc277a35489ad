// ── Command list generation ──
//
// Pure functions from before/after images to the ordered command list of
// one update. Daemon names and versions come from the registry; nothing
// here touches the store or the network.
//
// Ordering contracts:
//   hosts            deletes (before-image) precede adds (after-image)
//   subnets          updates, adds, deletes, then config-write, then
//                    config-reload for daemons older than 2.6.0
//   shared networks  mutations, then config-write, then config-reload
//   global params    config-set followed by config-write, per daemon

use std::collections::BTreeMap;
use std::sync::Arc;

use keafly_api::KeaCommand;
use serde_json::{Map, Value, json};

use super::recipe::AnnotatedCommand;
use crate::error::CoreError;
use crate::model::{Daemon, DaemonId, Family, Host, HostDataSource, SharedNetwork, Subnet};
use crate::registry::DaemonRegistry;
use crate::version::needs_reload_after_subnet_change;

const SUBNETS_KEEP: &str = "keep";
const SUBNETS_DELETE: &str = "delete";

struct CommandBuilder<'a> {
    registry: &'a DaemonRegistry,
    family: Family,
    commands: Vec<AnnotatedCommand>,
}

impl<'a> CommandBuilder<'a> {
    fn new(registry: &'a DaemonRegistry, family: Family) -> Self {
        Self {
            registry,
            family,
            commands: Vec::new(),
        }
    }

    fn daemon(&self, id: DaemonId) -> Result<Arc<Daemon>, CoreError> {
        let daemon = self
            .registry
            .get(id)
            .ok_or_else(|| CoreError::validation(format!("unknown daemon {id}")))?;
        if daemon.family() != Some(self.family) {
            return Err(CoreError::validation(format!(
                "{daemon} cannot serve {} configuration",
                self.family
            )));
        }
        Ok(daemon)
    }

    /// `subnet4-add`, `network6-del`, …
    fn scoped(&self, scope: &str, action: &str) -> String {
        format!("{scope}{}-{action}", self.family.suffix())
    }

    fn push(&mut self, daemon_id: DaemonId, name: String, arguments: Option<Value>) -> Result<(), CoreError> {
        let daemon = self.daemon(daemon_id)?;
        let mut command = KeaCommand::new(name, daemon.name.as_ref());
        command.arguments = arguments;
        self.commands.push(AnnotatedCommand::new(daemon_id, command));
        Ok(())
    }

    fn config_writes(&mut self, daemons: &[DaemonId]) -> Result<(), CoreError> {
        for id in daemons {
            self.push(*id, "config-write".to_owned(), None)?;
        }
        Ok(())
    }

    /// `config-reload` for every daemon among `daemons` older than 2.6.0.
    fn config_reloads(&mut self, daemons: &[DaemonId]) -> Result<(), CoreError> {
        for id in daemons {
            let daemon = self.daemon(*id)?;
            if needs_reload_after_subnet_change(daemon.kea_version().as_ref()) {
                self.push(*id, "config-reload".to_owned(), None)?;
            }
        }
        Ok(())
    }

    fn subnet_body(&self, subnet: &Subnet, daemon_id: DaemonId) -> Result<Value, CoreError> {
        let body = subnet.to_kea(daemon_id).ok_or_else(|| {
            CoreError::validation(format!(
                "subnet {} has no configuration for daemon {daemon_id}",
                subnet.prefix
            ))
        })?;
        let mut arguments = Map::new();
        arguments.insert(format!("subnet{}", self.family.suffix()), json!([body]));
        Ok(Value::Object(arguments))
    }

    fn add_subnet(&mut self, subnet: &Subnet, daemon_id: DaemonId) -> Result<(), CoreError> {
        let arguments = self.subnet_body(subnet, daemon_id)?;
        let name = self.scoped("subnet", "add");
        self.push(daemon_id, name, Some(arguments))
    }

    fn attach_subnet(
        &mut self,
        network: &str,
        subnet: &Subnet,
        daemon_id: DaemonId,
    ) -> Result<(), CoreError> {
        let local_id = local_subnet_id(subnet, daemon_id)?;
        let name = self.scoped("network", "subnet-add");
        self.push(daemon_id, name, Some(json!({"name": network, "id": local_id})))
    }

    fn delete_network(&mut self, name: &str, daemon_id: DaemonId, action: &str) -> Result<(), CoreError> {
        let command = self.scoped("network", "del");
        self.push(
            daemon_id,
            command,
            Some(json!({"name": name, "subnets-action": action})),
        )
    }

    fn add_network(
        &mut self,
        network: &SharedNetwork,
        daemon_id: DaemonId,
        include_subnets: bool,
    ) -> Result<(), CoreError> {
        let body = network.to_kea(daemon_id, include_subnets).ok_or_else(|| {
            CoreError::validation(format!(
                "shared network {} has no configuration for daemon {daemon_id}",
                network.name
            ))
        })?;
        let name = self.scoped("network", "add");
        self.push(daemon_id, name, Some(json!({"shared-networks": [body]})))
    }

    fn finish(self) -> Vec<AnnotatedCommand> {
        self.commands
    }
}

fn local_subnet_id(subnet: &Subnet, daemon_id: DaemonId) -> Result<i64, CoreError> {
    subnet
        .local_subnet(daemon_id)
        .map(|ls| ls.local_subnet_id)
        .ok_or_else(|| {
            CoreError::validation(format!(
                "subnet {} is not served by daemon {daemon_id}",
                subnet.prefix
            ))
        })
}

/// `after` first, then the ids only in `before`; duplicates removed.
fn union(after: &[DaemonId], before: &[DaemonId]) -> Vec<DaemonId> {
    let mut all: Vec<DaemonId> = Vec::new();
    for id in after.iter().chain(before) {
        if !all.contains(id) {
            all.push(*id);
        }
    }
    all
}

// ── Hosts ───────────────────────────────────────────────────────────

fn host_family(host: &Host, registry: &DaemonRegistry) -> Result<Family, CoreError> {
    let first = host
        .local_hosts
        .first()
        .ok_or_else(|| CoreError::validation("host is not assigned to any daemon"))?;
    registry
        .get(first.daemon_id)
        .and_then(|d| d.family())
        .ok_or_else(|| CoreError::validation(format!("unknown DHCP daemon {}", first.daemon_id)))
}

fn reservation_del_arguments(host: &Host, local_subnet_id: i64) -> Result<Value, CoreError> {
    let first = host
        .identifiers
        .first()
        .ok_or_else(|| CoreError::validation("host has no identifier"))?;
    Ok(json!({
        "subnet-id": local_subnet_id,
        "identifier-type": first.id_type.to_string(),
        "identifier": first.to_colon_hex(),
    }))
}

fn push_reservation_adds(
    builder: &mut CommandBuilder<'_>,
    host: &Host,
    source: Option<HostDataSource>,
) -> Result<(), CoreError> {
    for local in &host.local_hosts {
        if source.is_some_and(|s| s != local.data_source) {
            continue;
        }
        let body = host.reservation_body(local, builder.family)?;
        builder.push(
            local.daemon_id,
            "reservation-add".to_owned(),
            Some(json!({ "reservation": body })),
        )?;
    }
    Ok(())
}

fn push_reservation_dels(
    builder: &mut CommandBuilder<'_>,
    host: &Host,
    source: Option<HostDataSource>,
) -> Result<(), CoreError> {
    let mut sent: Vec<(DaemonId, i64)> = Vec::new();
    for local in &host.local_hosts {
        if source.is_some_and(|s| s != local.data_source) {
            continue;
        }
        let key = (local.daemon_id, local.local_subnet_id);
        if sent.contains(&key) {
            continue;
        }
        sent.push(key);
        let arguments = reservation_del_arguments(host, local.local_subnet_id)?;
        builder.push(local.daemon_id, "reservation-del".to_owned(), Some(arguments))?;
    }
    Ok(())
}

pub(crate) fn host_add(registry: &DaemonRegistry, host: &Host) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut builder = CommandBuilder::new(registry, host_family(host, registry)?);
    push_reservation_adds(&mut builder, host, None)?;
    Ok(builder.finish())
}

pub(crate) fn host_update(
    registry: &DaemonRegistry,
    before: &Host,
    after: &Host,
) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut builder = CommandBuilder::new(registry, host_family(after, registry)?);
    push_reservation_dels(&mut builder, before, Some(HostDataSource::Api))?;
    push_reservation_adds(&mut builder, after, Some(HostDataSource::Api))?;
    Ok(builder.finish())
}

pub(crate) fn host_delete(registry: &DaemonRegistry, before: &Host) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut builder = CommandBuilder::new(registry, host_family(before, registry)?);
    push_reservation_dels(&mut builder, before, None)?;
    Ok(builder.finish())
}

// ── Subnets ─────────────────────────────────────────────────────────

pub(crate) fn subnet_add(registry: &DaemonRegistry, subnet: &Subnet) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut builder = CommandBuilder::new(registry, subnet.family);
    let daemons = subnet.daemon_ids();
    for id in &daemons {
        builder.add_subnet(subnet, *id)?;
        if let Some(network) = &subnet.shared_network_name {
            builder.attach_subnet(network, subnet, *id)?;
        }
    }
    builder.config_writes(&daemons)?;
    builder.config_reloads(&daemons)?;
    Ok(builder.finish())
}

pub(crate) fn subnet_update(
    registry: &DaemonRegistry,
    before: &Subnet,
    after: &Subnet,
) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut builder = CommandBuilder::new(registry, after.family);
    let before_ids = before.daemon_ids();
    let after_ids = after.daemon_ids();

    for id in after_ids.iter().filter(|id| before_ids.contains(id)) {
        let arguments = builder.subnet_body(after, *id)?;
        let name = builder.scoped("subnet", "update");
        builder.push(*id, name, Some(arguments))?;
    }
    for id in after_ids.iter().filter(|id| !before_ids.contains(id)) {
        builder.add_subnet(after, *id)?;
        if let Some(network) = &after.shared_network_name {
            builder.attach_subnet(network, after, *id)?;
        }
    }
    for id in before_ids.iter().filter(|id| !after_ids.contains(id)) {
        let local_id = local_subnet_id(before, *id)?;
        let name = builder.scoped("subnet", "del");
        builder.push(*id, name, Some(json!({"id": local_id})))?;
    }

    let affected = union(&after_ids, &before_ids);
    builder.config_writes(&affected)?;
    builder.config_reloads(&affected)?;
    Ok(builder.finish())
}

pub(crate) fn subnet_delete(registry: &DaemonRegistry, before: &Subnet) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut builder = CommandBuilder::new(registry, before.family);
    let daemons = before.daemon_ids();
    for id in &daemons {
        let local_id = local_subnet_id(before, *id)?;
        if let Some(network) = &before.shared_network_name {
            let name = builder.scoped("network", "subnet-del");
            builder.push(*id, name, Some(json!({"name": network, "id": local_id})))?;
        }
        let name = builder.scoped("subnet", "del");
        builder.push(*id, name, Some(json!({"id": local_id})))?;
    }
    builder.config_writes(&daemons)?;
    Ok(builder.finish())
}

// ── Shared networks ─────────────────────────────────────────────────

pub(crate) fn shared_network_add(
    registry: &DaemonRegistry,
    network: &SharedNetwork,
) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut builder = CommandBuilder::new(registry, network.family);
    let daemons = network.daemon_ids();
    for id in &daemons {
        builder.add_network(network, *id, true)?;
    }
    builder.config_writes(&daemons)?;
    builder.config_reloads(&daemons)?;
    Ok(builder.finish())
}

/// Re-attach the after-image's subnets on one daemon. Subnets the daemon
/// already served inside the network were kept by the preceding delete;
/// the others are created first.
fn attach_network_subnets(
    builder: &mut CommandBuilder<'_>,
    before: Option<&SharedNetwork>,
    after: &SharedNetwork,
    daemon_id: DaemonId,
) -> Result<(), CoreError> {
    for subnet in &after.subnets {
        if subnet.local_subnet(daemon_id).is_none() {
            continue;
        }
        let kept = before.is_some_and(|b| {
            b.subnets
                .iter()
                .any(|s| s.prefix == subnet.prefix && s.local_subnet(daemon_id).is_some())
        });
        if !kept {
            builder.add_subnet(subnet, daemon_id)?;
        }
        builder.attach_subnet(&after.name, subnet, daemon_id)?;
    }
    Ok(())
}

pub(crate) fn shared_network_update(
    registry: &DaemonRegistry,
    before: &SharedNetwork,
    after: &SharedNetwork,
) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut builder = CommandBuilder::new(registry, after.family);
    let before_ids = before.daemon_ids();
    let after_ids = after.daemon_ids();

    for id in after_ids.iter().filter(|id| before_ids.contains(id)) {
        builder.delete_network(&before.name, *id, SUBNETS_KEEP)?;
        builder.add_network(after, *id, false)?;
        attach_network_subnets(&mut builder, Some(before), after, *id)?;
    }
    for id in after_ids.iter().filter(|id| !before_ids.contains(id)) {
        builder.add_network(after, *id, false)?;
        attach_network_subnets(&mut builder, None, after, *id)?;
    }
    let removed: Vec<DaemonId> = before_ids
        .iter()
        .copied()
        .filter(|id| !after_ids.contains(id))
        .collect();
    for id in &removed {
        builder.delete_network(&before.name, *id, SUBNETS_DELETE)?;
    }

    let affected = union(&after_ids, &before_ids);
    builder.config_writes(&affected)?;
    let reloaded: Vec<DaemonId> = affected
        .into_iter()
        .filter(|id| !removed.contains(id))
        .collect();
    builder.config_reloads(&reloaded)?;
    Ok(builder.finish())
}

pub(crate) fn shared_network_delete(
    registry: &DaemonRegistry,
    before: &SharedNetwork,
) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut builder = CommandBuilder::new(registry, before.family);
    let daemons = before.daemon_ids();
    for id in &daemons {
        builder.delete_network(&before.name, *id, SUBNETS_DELETE)?;
    }
    builder.config_writes(&daemons)?;
    Ok(builder.finish())
}

// ── Global parameters ───────────────────────────────────────────────

pub(crate) fn global_parameters_update(
    registry: &DaemonRegistry,
    partials: &BTreeMap<DaemonId, Map<String, Value>>,
    order: &[DaemonId],
) -> Result<Vec<AnnotatedCommand>, CoreError> {
    let mut commands = Vec::new();
    for id in order {
        let Some(partial) = partials.get(id) else {
            continue;
        };
        let daemon = registry
            .get(*id)
            .ok_or_else(|| CoreError::validation(format!("unknown daemon {id}")))?;
        let family = daemon
            .family()
            .ok_or_else(|| CoreError::validation(format!("{daemon} is not a DHCP daemon")))?;
        let mut builder = CommandBuilder::new(registry, family);
        let mut root = Map::new();
        root.insert(
            daemon.name.config_root().to_owned(),
            Value::Object(partial.clone()),
        );
        builder.push(*id, "config-set".to_owned(), Some(Value::Object(root)))?;
        builder.config_writes(&[*id])?;
        commands.extend(builder.finish());
    }
    Ok(commands)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{
        AccessPoint, DaemonName, HostIdentifier, HostIdentifierType, LocalHost, LocalSharedNetwork,
        LocalSubnet, MachineId,
    };
    use pretty_assertions::assert_eq;

    fn registry(daemons: &[(i64, DaemonName, &str)]) -> DaemonRegistry {
        let registry = DaemonRegistry::new();
        for (id, name, version) in daemons {
            let mut daemon = Daemon::new(MachineId(*id), *name, AccessPoint::control("127.0.0.1", 8000));
            daemon.id = DaemonId(*id);
            daemon.version = Some((*version).to_owned());
            registry.upsert(daemon);
        }
        registry
    }

    fn names(commands: &[AnnotatedCommand]) -> Vec<(i64, String)> {
        commands
            .iter()
            .map(|c| (c.daemon_id.get(), c.command.command.clone()))
            .collect()
    }

    fn host(daemons: &[i64], source: HostDataSource) -> Host {
        let mut host = Host::new(vec![HostIdentifier::parse(HostIdentifierType::HwAddress, "010203040506").unwrap()]);
        for id in daemons {
            host.local_hosts.push(LocalHost::new(DaemonId(*id), source).with_hostname("cool.example.org"));
        }
        host
    }

    #[test]
    fn host_update_deletes_before_adding_and_skips_config_hosts() {
        let reg = registry(&[(1, DaemonName::Dhcp4, "2.6.0"), (2, DaemonName::Dhcp4, "2.6.0")]);
        let mut before = host(&[1], HostDataSource::Api);
        before.local_hosts.push(LocalHost::new(DaemonId(2), HostDataSource::Config));
        let after = host(&[1, 2], HostDataSource::Api);

        let commands = host_update(&reg, &before, &after).unwrap();
        assert_eq!(
            names(&commands),
            vec![
                (1, "reservation-del".to_owned()),
                (1, "reservation-add".to_owned()),
                (2, "reservation-add".to_owned()),
            ]
        );
        assert_eq!(
            commands[0].command.arguments,
            Some(json!({"subnet-id": 0, "identifier-type": "hw-address", "identifier": "01:02:03:04:05:06"}))
        );
    }

    #[test]
    fn unknown_or_mismatched_daemons_are_rejected() {
        let reg = registry(&[(1, DaemonName::Dhcp6, "2.6.0")]);
        assert!(host_add(&reg, &host(&[1], HostDataSource::Api)).is_ok());
        assert!(host_add(&reg, &host(&[9], HostDataSource::Api)).is_err());

        let mut subnet = Subnet::new("192.0.2.0/24").unwrap();
        subnet.set_local_subnet(LocalSubnet::new(DaemonId(1), 1));
        assert!(subnet_add(&reg, &subnet).is_err());
    }

    #[test]
    fn subnet_add_in_network_attaches_and_reloads_old_daemons() {
        let reg = registry(&[(1, DaemonName::Dhcp4, "2.4.1"), (2, DaemonName::Dhcp4, "2.6.1")]);
        let mut subnet = Subnet::new("192.0.2.0/24").unwrap();
        subnet.shared_network_name = Some("frog".into());
        subnet.set_local_subnet(LocalSubnet::new(DaemonId(1), 5));
        subnet.set_local_subnet(LocalSubnet::new(DaemonId(2), 5));

        let commands = subnet_add(&reg, &subnet).unwrap();
        assert_eq!(
            names(&commands),
            vec![
                (1, "subnet4-add".to_owned()),
                (1, "network4-subnet-add".to_owned()),
                (2, "subnet4-add".to_owned()),
                (2, "network4-subnet-add".to_owned()),
                (1, "config-write".to_owned()),
                (2, "config-write".to_owned()),
                (1, "config-reload".to_owned()),
            ]
        );
        assert_eq!(
            commands[0].command.arguments,
            Some(json!({"subnet4": [{"id": 5, "subnet": "192.0.2.0/24"}]}))
        );
        assert_eq!(commands[1].command.arguments, Some(json!({"name": "frog", "id": 5})));
    }

    #[test]
    fn subnet_delete_detaches_first() {
        let reg = registry(&[(1, DaemonName::Dhcp6, "2.6.1")]);
        let mut subnet = Subnet::new("2001:db8:1::/64").unwrap();
        subnet.shared_network_name = Some("frog".into());
        subnet.set_local_subnet(LocalSubnet::new(DaemonId(1), 3));

        let commands = subnet_delete(&reg, &subnet).unwrap();
        assert_eq!(
            names(&commands),
            vec![
                (1, "network6-subnet-del".to_owned()),
                (1, "subnet6-del".to_owned()),
                (1, "config-write".to_owned()),
            ]
        );
        assert_eq!(commands[1].command.arguments, Some(json!({"id": 3})));
    }

    #[test]
    fn shared_network_update_redistributes() {
        let reg = registry(&[
            (1, DaemonName::Dhcp4, "2.4.0"),
            (2, DaemonName::Dhcp4, "2.4.0"),
            (3, DaemonName::Dhcp4, "2.4.0"),
        ]);
        let mut subnet = Subnet::new("192.0.2.0/24").unwrap();
        subnet.set_local_subnet(LocalSubnet::new(DaemonId(1), 7));

        let mut before = SharedNetwork::new("frog", Family::V4);
        before.set_local_shared_network(LocalSharedNetwork::new(DaemonId(1)));
        before.set_local_shared_network(LocalSharedNetwork::new(DaemonId(2)));
        before.subnets.push(subnet.clone());

        let mut after = SharedNetwork::new("toad", Family::V4);
        after.set_local_shared_network(LocalSharedNetwork::new(DaemonId(1)));
        after.set_local_shared_network(LocalSharedNetwork::new(DaemonId(3)));
        let mut moved = subnet;
        moved.set_local_subnet(LocalSubnet::new(DaemonId(3), 7));
        after.subnets.push(moved);

        let commands = shared_network_update(&reg, &before, &after).unwrap();
        assert_eq!(
            names(&commands),
            vec![
                (1, "network4-del".to_owned()),
                (1, "network4-add".to_owned()),
                (1, "network4-subnet-add".to_owned()),
                (3, "network4-add".to_owned()),
                (3, "subnet4-add".to_owned()),
                (3, "network4-subnet-add".to_owned()),
                (2, "network4-del".to_owned()),
                (1, "config-write".to_owned()),
                (3, "config-write".to_owned()),
                (2, "config-write".to_owned()),
                (1, "config-reload".to_owned()),
                (3, "config-reload".to_owned()),
            ]
        );
        assert_eq!(
            commands[0].command.arguments,
            Some(json!({"name": "frog", "subnets-action": "keep"}))
        );
        assert_eq!(commands[1].command.arguments, Some(json!({"shared-networks": [{"name": "toad"}]})));
        assert_eq!(
            commands[6].command.arguments,
            Some(json!({"name": "frog", "subnets-action": "delete"}))
        );
    }

    #[test]
    fn global_parameters_are_rooted_per_daemon() {
        let reg = registry(&[(1, DaemonName::Dhcp4, "2.6.0"), (2, DaemonName::Dhcp6, "2.6.0")]);
        let mut partials = BTreeMap::new();
        partials.insert(DaemonId(2), json!({"preferred-lifetime": 3000}).as_object().unwrap().clone());
        partials.insert(DaemonId(1), json!({"valid-lifetime": 4000}).as_object().unwrap().clone());

        let commands = global_parameters_update(&reg, &partials, &[DaemonId(2), DaemonId(1)]).unwrap();
        assert_eq!(
            names(&commands),
            vec![
                (2, "config-set".to_owned()),
                (2, "config-write".to_owned()),
                (1, "config-set".to_owned()),
                (1, "config-write".to_owned()),
            ]
        );
        assert_eq!(commands[0].command.service, vec!["dhcp6".to_owned()]);
        assert_eq!(
            commands[2].command.arguments,
            Some(json!({"Dhcp4": {"valid-lifetime": 4000}}))
        );
    }
}
