#![allow(clippy::unwrap_used)]
// End-to-end transaction scenarios against the in-memory store and a
// recording gateway.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{FakeGateway, Harness, arguments, dhcp4};
use keafly_core::{
    CoreError, DaemonId, Family, Host, HostDataSource, HostIdentifier, HostIdentifierType,
    LocalHost, LocalSharedNetwork, LocalSubnet, SharedNetwork, Store, Subnet, TransactionContext,
    UserId,
};

fn cool_host(daemons: &[i64]) -> Host {
    let mut host = Host::new(vec![
        HostIdentifier::parse(HostIdentifierType::HwAddress, "010203040506").unwrap(),
    ]);
    for id in daemons {
        host.local_hosts
            .push(LocalHost::new(DaemonId(*id), HostDataSource::Api).with_hostname("cool.example.org"));
    }
    host
}

fn subnet_on(prefix: &str, daemons: &[i64]) -> Subnet {
    let mut subnet = Subnet::new(prefix).unwrap();
    for id in daemons {
        subnet.set_local_subnet(LocalSubnet::new(DaemonId(*id), 7));
    }
    subnet
}

// ── Hosts ───────────────────────────────────────────────────────────

#[tokio::test]
async fn host_add_sends_one_reservation_per_daemon() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1"), dhcp4(2, "2.6.1")]);

    let mut ctx = h.module.begin_host_add(Some(UserId(1)));
    h.module.apply_host_add(&mut ctx, cool_host(&[1, 2])).unwrap();

    let commands = ctx.state().updates[0].recipe.commands().to_vec();
    assert_eq!(commands.len(), 2);
    let expected = json!({"reservation": {
        "subnet-id": 0,
        "hw-address": "010203040506",
        "hostname": "cool.example.org"
    }});
    for (command, daemon) in commands.iter().zip([1, 2]) {
        assert_eq!(command.daemon_id, DaemonId(daemon));
        assert_eq!(command.command.command, "reservation-add");
        assert_eq!(command.command.service, vec!["dhcp4".to_owned()]);
        assert_eq!(arguments(&command.command), expected);
    }

    let state = h.module.commit(ctx).await.unwrap();
    assert_eq!(h.gateway.sent().len(), 2);
    let keafly_core::Recipe::Host(recipe) = &state.updates[0].recipe else {
        panic!("host recipe expected");
    };
    let id = recipe.added_host_id.unwrap();
    let stored = h.store.get_host(id).await.unwrap().unwrap();
    assert_eq!(stored.local_hosts.len(), 2);
}

#[tokio::test]
async fn kea_error_aborts_commit_without_persisting() {
    let h = Harness::new(FakeGateway::failing("error is error"), vec![dhcp4(1, "2.6.1")]);

    let mut ctx = h.module.begin_host_add(Some(UserId(1)));
    h.module.apply_host_add(&mut ctx, cool_host(&[1])).unwrap();
    let err = h.module.commit(ctx).await.unwrap_err();

    let text = err.to_string();
    assert!(text.contains("reservation-add command to dhcp4 failed"), "{text}");
    assert!(
        text.contains("non-success response result from Kea: 1, text: error is error"),
        "{text}"
    );
    assert_eq!(h.gateway.calls().len(), 1);
    assert!(h.store.get_host(keafly_core::HostId(1)).await.unwrap().is_none());
    assert!(!h.locker.is_locked(DaemonId(1)));
}

#[tokio::test]
async fn host_update_keeps_config_copies() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1"), dhcp4(2, "2.6.1")]);
    let mut host = cool_host(&[1]);
    host.local_hosts.push(LocalHost::new(DaemonId(2), HostDataSource::Config));
    let stored = h.store.add_host(host).await.unwrap();

    let mut ctx = h.module.begin_host_update(Some(UserId(1)), stored.id).await.unwrap();
    assert!(ctx.holds_lock(DaemonId(1)));
    assert!(ctx.holds_lock(DaemonId(2)));

    let mut edited = cool_host(&[1]);
    edited.local_hosts[0].hostname = Some("renamed.example.org".into());
    h.module.apply_host_update(&mut ctx, edited).unwrap();
    h.module.commit(ctx).await.unwrap();

    assert_eq!(
        h.gateway.sent(),
        vec![(1, "reservation-del".to_owned()), (1, "reservation-add".to_owned())]
    );
    let after = h.store.get_host(stored.id).await.unwrap().unwrap();
    assert_eq!(after.local_hosts.len(), 2);
    assert!(after.local_host(DaemonId(2), HostDataSource::Config).is_some());
    assert_eq!(
        after.local_host(DaemonId(1), HostDataSource::Api).unwrap().hostname.as_deref(),
        Some("renamed.example.org")
    );
}

#[tokio::test]
async fn begin_fails_on_locked_daemon() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1")]);
    let stored = h.store.add_host(cool_host(&[1])).await.unwrap();

    let _held = h.module.begin_host_delete(Some(UserId(1)), stored.id).await.unwrap();
    let err = h.module.begin_host_delete(Some(UserId(2)), stored.id).await.unwrap_err();
    assert!(matches!(err, CoreError::LockContention { .. }));
}

#[tokio::test]
async fn missing_entity_is_not_found() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1")]);
    let err = h
        .module
        .begin_subnet_update(None, keafly_core::SubnetId(42))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

// ── Subnets ─────────────────────────────────────────────────────────

#[tokio::test]
async fn subnet_update_redistributes_across_daemons() {
    let h = Harness::new(
        FakeGateway::ok(),
        vec![
            dhcp4(1, "2.6.0"),
            dhcp4(2, "2.5.8"),
            dhcp4(3, "2.6.1"),
            dhcp4(4, "2.7.0"),
        ],
    );
    let stored = h.store.add_subnet(subnet_on("192.0.2.0/24", &[1, 2, 3])).await.unwrap();

    let mut ctx = h.module.begin_subnet_update(Some(UserId(1)), stored.id).await.unwrap();
    let mut edited = stored.clone();
    edited.remove_local_subnet(DaemonId(3));
    edited.set_local_subnet(LocalSubnet::new(DaemonId(4), 7));
    h.module.apply_subnet_update(&mut ctx, edited).unwrap();
    assert!(ctx.holds_lock(DaemonId(4)));

    let sent: Vec<(i64, String)> = ctx.state().updates[0]
        .recipe
        .commands()
        .iter()
        .map(|c| (c.daemon_id.get(), c.command.command.clone()))
        .collect();
    let expected: Vec<(i64, String)> = [
        (1, "subnet4-update"),
        (2, "subnet4-update"),
        (4, "subnet4-add"),
        (3, "subnet4-del"),
        (1, "config-write"),
        (2, "config-write"),
        (4, "config-write"),
        (3, "config-write"),
        (2, "config-reload"),
    ]
    .into_iter()
    .map(|(d, c)| (d, c.to_owned()))
    .collect();
    assert_eq!(sent, expected);

    h.module.commit(ctx).await.unwrap();
    assert_eq!(h.gateway.sent(), expected);
    let after = h.store.get_subnet(stored.id).await.unwrap().unwrap();
    assert_eq!(after.daemon_ids(), vec![DaemonId(1), DaemonId(2), DaemonId(4)]);
    for id in 1..=4 {
        assert!(!h.locker.is_locked(DaemonId(id)));
    }
}

#[tokio::test]
async fn subnet_add_rejects_unknown_daemon() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1")]);
    let mut ctx = h.module.begin_subnet_add(None);
    let err = h
        .module
        .apply_subnet_add(&mut ctx, subnet_on("192.0.2.0/24", &[9]))
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

// ── Shared networks ─────────────────────────────────────────────────

#[tokio::test]
async fn shared_network_delete_removes_subnets_too() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1"), dhcp4(2, "2.6.1")]);
    let mut network = SharedNetwork::new("frog", Family::V4);
    network.set_local_shared_network(LocalSharedNetwork::new(DaemonId(1)));
    network.set_local_shared_network(LocalSharedNetwork::new(DaemonId(2)));
    network.subnets.push(subnet_on("192.0.2.0/24", &[1, 2]));
    let stored = h.store.add_shared_network(network).await.unwrap();

    let mut ctx = h
        .module
        .begin_shared_network_delete(Some(UserId(1)), stored.id)
        .await
        .unwrap();
    h.module.apply_shared_network_delete(&mut ctx).unwrap();
    let commands = ctx.state().updates[0].recipe.commands().to_vec();
    assert_eq!(
        arguments(&commands[0].command),
        json!({"name": "frog", "subnets-action": "delete"})
    );
    h.module.commit(ctx).await.unwrap();

    assert_eq!(
        h.gateway.sent(),
        vec![
            (1, "network4-del".to_owned()),
            (2, "network4-del".to_owned()),
            (1, "config-write".to_owned()),
            (2, "config-write".to_owned()),
        ]
    );
    assert!(h.store.get_shared_network(stored.id).await.unwrap().is_none());
    assert!(h.store.get_all_subnets(None).await.unwrap().is_empty());
}

fn frog_on(daemons: &[i64]) -> SharedNetwork {
    let mut network = SharedNetwork::new("frog", Family::V4);
    for id in daemons {
        network.set_local_shared_network(LocalSharedNetwork::new(DaemonId(*id)));
    }
    network.subnets.push(subnet_on("192.0.2.0/24", daemons));
    network
}

#[tokio::test]
async fn shared_network_add_nests_subnets_and_persists() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1"), dhcp4(2, "2.5.8")]);

    let mut ctx = h.module.begin_shared_network_add(Some(UserId(1)));
    h.module.apply_shared_network_add(&mut ctx, frog_on(&[1, 2])).unwrap();
    let commands = ctx.state().updates[0].recipe.commands().to_vec();
    let expected_body = json!({"shared-networks": [{
        "name": "frog",
        "subnet4": [{"id": 7, "subnet": "192.0.2.0/24"}]
    }]});
    assert_eq!(arguments(&commands[0].command), expected_body);
    assert_eq!(arguments(&commands[1].command), expected_body);

    let state = h.module.commit(ctx).await.unwrap();
    assert_eq!(
        h.gateway.sent(),
        vec![
            (1, "network4-add".to_owned()),
            (2, "network4-add".to_owned()),
            (1, "config-write".to_owned()),
            (2, "config-write".to_owned()),
            (2, "config-reload".to_owned()),
        ]
    );

    let keafly_core::Recipe::SharedNetwork(recipe) = &state.updates[0].recipe else {
        panic!("shared network recipe expected");
    };
    let id = recipe.added_shared_network_id.unwrap();
    let stored = h.store.get_shared_network(id).await.unwrap().unwrap();
    assert_eq!(stored.name, "frog");
    assert_eq!(stored.daemon_ids(), vec![DaemonId(1), DaemonId(2)]);
    assert_eq!(stored.subnets.len(), 1);
    assert_eq!(stored.subnets[0].prefix, "192.0.2.0/24");
    assert_eq!(stored.subnets[0].shared_network_name.as_deref(), Some("frog"));
    assert_eq!(stored.subnets[0].daemon_ids(), vec![DaemonId(1), DaemonId(2)]);
}

#[tokio::test]
async fn shared_network_update_extends_to_new_daemon() {
    let h = Harness::new(
        FakeGateway::ok(),
        vec![dhcp4(1, "2.6.1"), dhcp4(2, "2.6.1"), dhcp4(3, "2.6.1")],
    );
    let stored = h.store.add_shared_network(frog_on(&[1, 2])).await.unwrap();

    let mut ctx = h
        .module
        .begin_shared_network_update(Some(UserId(1)), stored.id)
        .await
        .unwrap();
    let mut edited = h.store.get_shared_network(stored.id).await.unwrap().unwrap();
    edited.set_local_shared_network(LocalSharedNetwork::new(DaemonId(3)));
    edited.subnets.push(subnet_on("198.51.100.0/24", &[3]));
    h.module.apply_shared_network_update(&mut ctx, edited).unwrap();
    assert!(ctx.holds_lock(DaemonId(3)));

    let commands = ctx.state().updates[0].recipe.commands().to_vec();
    assert_eq!(
        arguments(&commands[0].command),
        json!({"name": "frog", "subnets-action": "keep"})
    );
    assert_eq!(
        arguments(&commands[1].command),
        json!({"shared-networks": [{"name": "frog"}]})
    );
    assert_eq!(arguments(&commands[2].command), json!({"name": "frog", "id": 7}));
    h.module.commit(ctx).await.unwrap();

    assert_eq!(
        h.gateway.sent(),
        vec![
            (1, "network4-del".to_owned()),
            (1, "network4-add".to_owned()),
            (1, "network4-subnet-add".to_owned()),
            (2, "network4-del".to_owned()),
            (2, "network4-add".to_owned()),
            (2, "network4-subnet-add".to_owned()),
            (3, "network4-add".to_owned()),
            (3, "subnet4-add".to_owned()),
            (3, "network4-subnet-add".to_owned()),
            (1, "config-write".to_owned()),
            (2, "config-write".to_owned()),
            (3, "config-write".to_owned()),
        ]
    );

    let after = h.store.get_shared_network(stored.id).await.unwrap().unwrap();
    assert_eq!(after.daemon_ids(), vec![DaemonId(1), DaemonId(2), DaemonId(3)]);
    let mut prefixes: Vec<&str> = after.subnets.iter().map(|s| s.prefix.as_str()).collect();
    prefixes.sort_unstable();
    assert_eq!(prefixes, vec!["192.0.2.0/24", "198.51.100.0/24"]);
    for id in 1..=3 {
        assert!(!h.locker.is_locked(DaemonId(id)));
    }
}

// ── Global parameters ───────────────────────────────────────────────

#[tokio::test]
async fn global_parameters_merge_into_stored_config() {
    let mut daemon = dhcp4(1, "2.6.1");
    daemon.config = Some(std::sync::Arc::new(
        keafly_core::KeaConfig::new(json!({"Dhcp4": {"valid-lifetime": 3600, "renew-timer": 900}})).unwrap(),
    ));
    let h = Harness::new(FakeGateway::ok(), vec![daemon.clone()]);
    h.store
        .add_machine(keafly_core::Machine {
            id: keafly_core::MachineId::UNASSIGNED,
            address: "10.0.0.1".into(),
            agent_port: 8000,
            name: None,
        })
        .await
        .unwrap();
    let stored = h.store.add_daemon(daemon).await.unwrap();
    assert_eq!(stored.id, DaemonId(1));

    let mut ctx = h
        .module
        .begin_global_parameters_update(Some(UserId(1)), &[DaemonId(1)])
        .await
        .unwrap();
    let mut partial = serde_json::Map::new();
    partial.insert("valid-lifetime".into(), json!(7200));
    let partials = [(DaemonId(1), partial)].into_iter().collect();
    h.module.apply_global_parameters_update(&mut ctx, &partials).unwrap();
    h.module.commit(ctx).await.unwrap();

    let calls = h.gateway.calls();
    assert_eq!(calls[0].1.command, "config-set");
    assert_eq!(arguments(&calls[0].1), json!({"Dhcp4": {"valid-lifetime": 7200}}));
    assert_eq!(calls[1].1.command, "config-write");

    let after = h.store.get_daemon_by_id(DaemonId(1)).await.unwrap().unwrap();
    let config = after.config.unwrap();
    assert_eq!(config.root().unwrap()["valid-lifetime"], json!(7200));
    assert_eq!(config.root().unwrap()["renew-timer"], json!(900));
}

// ── Scheduling ──────────────────────────────────────────────────────

#[tokio::test]
async fn scheduled_change_commits_when_due() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1")]);
    let mut ctx = h.module.begin_host_add(Some(UserId(5)));
    h.module.apply_host_add(&mut ctx, cool_host(&[1])).unwrap();

    let now = Utc::now();
    let scheduled = h.module.schedule(ctx, now + ChronoDuration::minutes(5)).await.unwrap();
    assert!(h.gateway.calls().is_empty());

    let early = h.module.commit_due_changes(now).await.unwrap();
    assert!(early.is_empty());

    let report = h
        .module
        .commit_due_changes(now + ChronoDuration::minutes(10))
        .await
        .unwrap();
    assert_eq!(report.committed, vec![scheduled.id]);
    assert_eq!(h.gateway.sent(), vec![(1, "reservation-add".to_owned())]);
    assert!(h.store.get_scheduled_config_changes().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_scheduled_change_is_marked_executed() {
    let h = Harness::new(FakeGateway::failing("no way"), vec![dhcp4(1, "2.6.1")]);
    let mut ctx = h.module.begin_host_add(Some(UserId(5)));
    h.module.apply_host_add(&mut ctx, cool_host(&[1])).unwrap();
    let now = Utc::now();
    h.module.schedule(ctx, now).await.unwrap();

    let report = h.module.commit_due_changes(now).await.unwrap();
    assert_eq!(report.failed.len(), 1);

    let rows = h.store.get_scheduled_config_changes().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].executed);
    assert!(rows[0].error.as_deref().unwrap().contains("no way"));

    // Executed rows are never picked up again.
    let again = h.module.commit_due_changes(now).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(h.gateway.calls().len(), 1);
}

#[tokio::test]
async fn scheduled_change_waits_for_locked_daemon() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1")]);
    let mut ctx = h.module.begin_host_add(Some(UserId(5)));
    h.module.apply_host_add(&mut ctx, cool_host(&[1])).unwrap();
    let now = Utc::now();
    let scheduled = h.module.schedule(ctx, now).await.unwrap();

    let held = h.locker.lock(&[DaemonId(1)]).unwrap();
    let report = h.module.commit_due_changes(now).await.unwrap();
    assert_eq!(report.postponed, vec![scheduled.id]);
    drop(held);

    let report = h.module.commit_due_changes(now).await.unwrap();
    assert_eq!(report.committed, vec![scheduled.id]);
}

#[tokio::test]
async fn scheduling_requires_a_user() {
    let h = Harness::new(FakeGateway::ok(), vec![dhcp4(1, "2.6.1")]);
    let mut ctx = h.module.begin_host_add(None);
    h.module.apply_host_add(&mut ctx, cool_host(&[1])).unwrap();
    let err = h.module.schedule(ctx, Utc::now()).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

// ── Scheduled and direct commits agree ──────────────────────────────

/// Commit `direct_ctx` right away and `deferred_ctx` through the scheduler;
/// the two gateways must see the very same commands.
async fn assert_same_commands(
    direct: &Harness,
    direct_ctx: TransactionContext,
    deferred: &Harness,
    deferred_ctx: TransactionContext,
) {
    let want = direct_ctx.state().updates[0].recipe.commands().to_vec();
    assert!(!want.is_empty());
    direct.module.commit(direct_ctx).await.unwrap();

    let now = Utc::now();
    let scheduled = deferred.module.schedule(deferred_ctx, now).await.unwrap();
    let report = deferred.module.commit_due_changes(now).await.unwrap();
    assert_eq!(report.committed, vec![scheduled.id]);

    let direct_calls = direct.gateway.calls();
    let sent: Vec<(DaemonId, keafly_api::KeaCommand)> = want
        .into_iter()
        .map(|c| (c.daemon_id, c.command))
        .collect();
    assert_eq!(direct_calls, sent);
    assert_eq!(deferred.gateway.calls(), direct_calls);
}

fn subnet_fleet() -> Harness {
    Harness::new(
        FakeGateway::ok(),
        vec![dhcp4(1, "2.6.0"), dhcp4(2, "2.5.8"), dhcp4(3, "2.6.1")],
    )
}

async fn move_subnet(h: &Harness) -> TransactionContext {
    let stored = h.store.add_subnet(subnet_on("192.0.2.0/24", &[1, 2])).await.unwrap();
    let mut ctx = h.module.begin_subnet_update(Some(UserId(3)), stored.id).await.unwrap();
    let mut edited = stored;
    edited.remove_local_subnet(DaemonId(2));
    let mut local = LocalSubnet::new(DaemonId(3), 7);
    local.parameters.insert("valid-lifetime".into(), json!(1800));
    edited.set_local_subnet(local);
    h.module.apply_subnet_update(&mut ctx, edited).unwrap();
    ctx
}

#[tokio::test]
async fn scheduled_subnet_update_sends_direct_commands() {
    let (direct, deferred) = (subnet_fleet(), subnet_fleet());
    let direct_ctx = move_subnet(&direct).await;
    let deferred_ctx = move_subnet(&deferred).await;
    assert_same_commands(&direct, direct_ctx, &deferred, deferred_ctx).await;

    let calls = deferred.gateway.calls();
    let add = calls.iter().find(|(_, c)| c.command == "subnet4-add").unwrap();
    assert_eq!(add.0, DaemonId(3));
    assert_eq!(
        arguments(&add.1),
        json!({"subnet4": [{"id": 7, "subnet": "192.0.2.0/24", "valid-lifetime": 1800}]})
    );
    let subnets = deferred.store.get_all_subnets(None).await.unwrap();
    assert_eq!(subnets, direct.store.get_all_subnets(None).await.unwrap());
    assert_eq!(subnets[0].daemon_ids(), vec![DaemonId(1), DaemonId(3)]);
}

fn network_fleet() -> Harness {
    Harness::new(
        FakeGateway::ok(),
        vec![dhcp4(1, "2.6.1"), dhcp4(2, "2.5.8")],
    )
}

fn add_frog(h: &Harness) -> TransactionContext {
    let mut network = frog_on(&[1, 2]);
    network.local_shared_networks[0]
        .parameters
        .insert("interface".into(), json!("eth0"));
    let mut ctx = h.module.begin_shared_network_add(Some(UserId(3)));
    h.module.apply_shared_network_add(&mut ctx, network).unwrap();
    ctx
}

#[tokio::test]
async fn scheduled_shared_network_add_sends_direct_commands() {
    let (direct, deferred) = (network_fleet(), network_fleet());
    let direct_ctx = add_frog(&direct);
    let deferred_ctx = add_frog(&deferred);
    assert_same_commands(&direct, direct_ctx, &deferred, deferred_ctx).await;

    let calls = deferred.gateway.calls();
    assert_eq!(calls[0].0, DaemonId(1));
    assert_eq!(calls[0].1.service, vec!["dhcp4".to_owned()]);
    assert_eq!(
        arguments(&calls[0].1),
        json!({"shared-networks": [{
            "name": "frog",
            "interface": "eth0",
            "subnet4": [{"id": 7, "subnet": "192.0.2.0/24"}]
        }]})
    );
    let networks = deferred.store.get_all_shared_networks(None).await.unwrap();
    assert_eq!(networks, direct.store.get_all_shared_networks(None).await.unwrap());
    assert_eq!(networks.len(), 1);
}

async fn configured_fleet() -> Harness {
    let daemons: Vec<_> = [1, 2]
        .into_iter()
        .map(|id| {
            let mut daemon = dhcp4(id, "2.6.1");
            daemon.config = Some(std::sync::Arc::new(
                keafly_core::KeaConfig::new(json!({"Dhcp4": {"valid-lifetime": 3600}})).unwrap(),
            ));
            daemon
        })
        .collect();
    let h = Harness::new(FakeGateway::ok(), daemons.clone());
    h.store
        .add_machine(keafly_core::Machine {
            id: keafly_core::MachineId::UNASSIGNED,
            address: "10.0.0.1".into(),
            agent_port: 8000,
            name: None,
        })
        .await
        .unwrap();
    for daemon in daemons {
        let expected = daemon.id;
        assert_eq!(h.store.add_daemon(daemon).await.unwrap().id, expected);
    }
    h
}

async fn raise_lifetimes(h: &Harness) -> TransactionContext {
    let mut ctx = h
        .module
        .begin_global_parameters_update(Some(UserId(3)), &[DaemonId(2), DaemonId(1)])
        .await
        .unwrap();
    let partials = [1, 2]
        .into_iter()
        .map(|id| {
            let mut partial = serde_json::Map::new();
            partial.insert("valid-lifetime".into(), json!(3600 * (id + 1)));
            (DaemonId(id), partial)
        })
        .collect();
    h.module.apply_global_parameters_update(&mut ctx, &partials).unwrap();
    ctx
}

#[tokio::test]
async fn scheduled_global_parameters_send_direct_commands() {
    let direct = configured_fleet().await;
    let deferred = configured_fleet().await;
    let direct_ctx = raise_lifetimes(&direct).await;
    let deferred_ctx = raise_lifetimes(&deferred).await;
    assert_same_commands(&direct, direct_ctx, &deferred, deferred_ctx).await;

    let calls = deferred.gateway.calls();
    let sets: Vec<(DaemonId, serde_json::Value)> = calls
        .iter()
        .filter(|(_, c)| c.command == "config-set")
        .map(|(id, c)| (*id, arguments(c)))
        .collect();
    assert_eq!(
        sets,
        vec![
            (DaemonId(2), json!({"Dhcp4": {"valid-lifetime": 10800}})),
            (DaemonId(1), json!({"Dhcp4": {"valid-lifetime": 7200}})),
        ]
    );
    for id in [1, 2] {
        let a = direct.store.get_daemon_by_id(DaemonId(id)).await.unwrap().unwrap();
        let b = deferred.store.get_daemon_by_id(DaemonId(id)).await.unwrap().unwrap();
        assert_eq!(
            a.config.unwrap().root().unwrap()["valid-lifetime"],
            b.config.unwrap().root().unwrap()["valid-lifetime"]
        );
    }
}
