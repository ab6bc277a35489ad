#![allow(clippy::unwrap_used)]
// State and statistics pulls against a fake fleet: configuration folding,
// HA relationship tracking and utilization.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use keafly_api::{KeaCommand, KeaResponse, ResponseCode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::FakeGateway;
use keafly_core::{
    BigCounter, ControlPlane, ControlPlaneConfig, Daemon, DaemonId, DaemonName, DaemonRegistry,
    EventCenter, HaMode, Machine, MachineConfig, MachineId, MemoryStore, StatePuller, StatsPuller,
    Store,
};

fn server_config(server: &str, mode: &str) -> Value {
    let partner_role = if mode == "hot-standby" { "standby" } else { "secondary" };
    json!({"Dhcp4": {
        "subnet4": [{"id": 1, "subnet": "192.0.2.0/24"}],
        "hooks-libraries": [{
            "library": "/usr/lib/kea/hooks/libdhcp_ha.so",
            "parameters": {"high-availability": [{
                "this-server-name": server,
                "mode": mode,
                "peers": [
                    {"name": "server1", "url": "http://10.0.0.1:8001/", "role": "primary"},
                    {"name": "server2", "url": "http://10.0.0.2:8001/", "role": partner_role}
                ]
            }]}
        }]
    }})
}

/// Answers the refresh triple and `statistic-get-all` for a pair of HA
/// servers whose mode can be switched between pulls.
fn ha_fleet(mode: Arc<Mutex<&'static str>>) -> Arc<FakeGateway> {
    FakeGateway::new(move |daemon: &Daemon, command: &KeaCommand| {
        let server = if daemon.id == DaemonId(1) { "server1" } else { "server2" };
        match command.command.as_str() {
            "version-get" => KeaResponse {
                result: ResponseCode::Success,
                text: Some("2.6.1".into()),
                arguments: None,
            },
            "config-get" => KeaResponse::success(Some(server_config(server, *mode.lock().unwrap()))),
            "status-get" => KeaResponse::success(Some(json!({"uptime": 500, "reload": 20}))),
            "statistic-get-all" => KeaResponse::success(Some(json!({
                "subnet[1].total-addresses": [[200, "2024-06-01 10:00:00.000000"]],
                "subnet[1].assigned-addresses": [[20, "2024-06-01 10:00:00.000000"]]
            }))),
            _ => KeaResponse::failure(ResponseCode::Unsupported, "unknown command"),
        }
    })
}

/// Daemon 1 serves whatever configuration the test puts in `first`;
/// daemon 2 stays the load-balancing `server2`.
fn switchable_fleet(first: Arc<Mutex<Value>>) -> Arc<FakeGateway> {
    FakeGateway::new(move |daemon: &Daemon, command: &KeaCommand| match command.command.as_str() {
        "version-get" => KeaResponse {
            result: ResponseCode::Success,
            text: Some("2.6.1".into()),
            arguments: None,
        },
        "config-get" if daemon.id == DaemonId(1) => {
            KeaResponse::success(Some(first.lock().unwrap().clone()))
        }
        "config-get" => KeaResponse::success(Some(server_config("server2", "load-balancing"))),
        "status-get" => KeaResponse::success(Some(json!({"uptime": 500, "reload": 20}))),
        _ => KeaResponse::failure(ResponseCode::Unsupported, "unknown command"),
    })
}

fn state_puller(store: &Arc<MemoryStore>, gateway: Arc<FakeGateway>) -> StatePuller {
    let dyn_store: Arc<dyn Store> = store.clone();
    StatePuller::new(
        Arc::clone(&dyn_store),
        gateway,
        Arc::new(DaemonRegistry::new()),
        Arc::new(EventCenter::new(dyn_store)),
        Duration::from_secs(1),
    )
}

async fn event_texts(store: &MemoryStore) -> Vec<String> {
    store
        .get_events(50)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.text)
        .collect()
}

async fn enrolled_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let machine = store
        .add_machine(Machine {
            id: MachineId::UNASSIGNED,
            address: "10.0.0.1".into(),
            agent_port: 8000,
            name: None,
        })
        .await
        .unwrap();
    for _ in 0..2 {
        let mut daemon = common::dhcp4(0, "2.6.1");
        daemon.machine_id = machine.id;
        daemon.active = false;
        daemon.version = None;
        store.add_daemon(daemon).await.unwrap();
    }
    store
}

#[tokio::test]
async fn ha_mode_change_replaces_the_relationship() {
    let mode = Arc::new(Mutex::new("load-balancing"));
    let gateway = ha_fleet(Arc::clone(&mode));
    let store = enrolled_store().await;
    let dyn_store: Arc<dyn Store> = store.clone();
    let registry = Arc::new(DaemonRegistry::new());
    let puller = StatePuller::new(
        Arc::clone(&dyn_store),
        gateway,
        Arc::clone(&registry),
        Arc::new(EventCenter::new(dyn_store)),
        Duration::from_secs(1),
    );

    let report = puller.pull_all(Utc::now()).await.unwrap();
    assert_eq!(report.pulled, 2);
    assert!(report.unreachable.is_empty());
    let services = store.get_all_services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].mode, HaMode::LoadBalancing);

    *mode.lock().unwrap() = "hot-standby";
    puller.pull_all(Utc::now()).await.unwrap();

    let services = store.get_all_services().await.unwrap();
    assert_eq!(services.len(), 1);
    let service = &services[0];
    assert_eq!(service.mode, HaMode::HotStandby);
    assert_eq!(service.primary_id, Some(DaemonId(1)));
    assert_eq!(service.secondary_id, Some(DaemonId(2)));
    assert_eq!(store.get_passive_ha_daemon_ids().await.unwrap(), vec![DaemonId(2)]);
}

#[tokio::test]
async fn first_pull_shares_one_subnet_and_reports_it() {
    let gateway = ha_fleet(Arc::new(Mutex::new("load-balancing")));
    let store = enrolled_store().await;
    let dyn_store: Arc<dyn Store> = store.clone();
    let puller = StatePuller::new(
        Arc::clone(&dyn_store),
        gateway,
        Arc::new(DaemonRegistry::new()),
        Arc::new(EventCenter::new(Arc::clone(&dyn_store))),
        Duration::from_secs(1),
    );

    let daemons = store.get_daemons().await.unwrap();
    let first = puller.pull_daemon(&daemons[0], Utc::now()).await.unwrap();
    assert!(first.reachable);
    assert!(first.config_changed);
    assert_eq!(first.new_subnets, 1);
    let second = puller.pull_daemon(&daemons[1], Utc::now()).await.unwrap();
    assert_eq!(second.new_subnets, 0);

    let subnets = store.get_all_subnets(None).await.unwrap();
    assert_eq!(subnets.len(), 1);
    assert_eq!(subnets[0].local_subnets.len(), 2);

    let texts: Vec<String> = store
        .get_events(10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.text)
        .collect();
    assert!(texts.iter().any(|t| t.contains("found 1 new subnets")));
    assert!(texts.iter().any(|t| t.ends_with("reachable now")));

    let unchanged = puller
        .pull_daemon(&store.get_daemon_by_id(DaemonId(1)).await.unwrap().unwrap(), Utc::now())
        .await
        .unwrap();
    assert!(!unchanged.config_changed);
}

#[tokio::test]
async fn statistics_pull_computes_utilization() {
    let gateway = ha_fleet(Arc::new(Mutex::new("load-balancing")));
    let store = enrolled_store().await;
    let dyn_store: Arc<dyn Store> = store.clone();
    let registry = Arc::new(DaemonRegistry::new());
    let state = StatePuller::new(
        Arc::clone(&dyn_store),
        gateway.clone(),
        Arc::clone(&registry),
        Arc::new(EventCenter::new(Arc::clone(&dyn_store))),
        Duration::from_secs(1),
    );
    state.pull_all(Utc::now()).await.unwrap();

    let stats = StatsPuller::new(dyn_store, gateway, registry, Duration::from_secs(1));
    let report = stats.pull(Utc::now()).await.unwrap();
    assert_eq!(report.daemons, 2);
    assert_eq!(report.subnets, 2);
    assert!(report.errors.is_empty());

    let subnet = store.get_all_subnets(None).await.unwrap().remove(0);
    let local = &subnet.local_subnets[0];
    assert_eq!(local.stats["assigned-addresses"], BigCounter::from_u64(20));
    assert!((subnet.addr_utilization - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn control_plane_enrolls_configured_fleet_once() {
    let mut machine = MachineConfig::new("10.0.0.9", 8000);
    machine.daemons = vec![DaemonName::Dhcp4, DaemonName::Dhcp6];
    let config = ControlPlaneConfig {
        machines: vec![machine],
        state_pull_interval: Duration::ZERO,
        stats_pull_interval: Duration::ZERO,
        due_scan_interval: Duration::ZERO,
        ..ControlPlaneConfig::default()
    };
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let plane = ControlPlane::new(config, Arc::clone(&store), FakeGateway::ok());

    plane.start().await.unwrap();
    assert_eq!(plane.registry().len(), 2);
    assert_eq!(plane.enroll().await.unwrap(), 0);
    assert_eq!(store.get_machines().await.unwrap().len(), 1);
    plane.shutdown().await;
}

#[tokio::test]
async fn unknown_local_peer_releases_ha_membership() {
    let first = Arc::new(Mutex::new(server_config("server1", "load-balancing")));
    let store = enrolled_store().await;
    let puller = state_puller(&store, switchable_fleet(Arc::clone(&first)));

    puller.pull_all(Utc::now()).await.unwrap();
    let services = store.get_all_services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert!(services[0].contains_daemon(DaemonId(1)));

    *first.lock().unwrap() = server_config("server9", "load-balancing");
    let report = puller.pull_all(Utc::now()).await.unwrap();
    assert!(report.errors.is_empty());

    let services = store.get_all_services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert!(!services[0].contains_daemon(DaemonId(1)));
    assert!(services[0].contains_daemon(DaemonId(2)));

    let texts = event_texts(&store).await;
    assert!(texts.iter().any(|t| t.ends_with("configuration changed")));
    assert!(texts.iter().any(|t| t.starts_with("HA configuration of")));

    // The daemon itself still serves its subnet.
    let subnets = store.get_all_subnets(None).await.unwrap();
    assert_eq!(subnets[0].local_subnets.len(), 2);
}

#[tokio::test]
async fn failed_extraction_keeps_previous_hash_and_retries() {
    let first = Arc::new(Mutex::new(server_config("server1", "load-balancing")));
    let store = enrolled_store().await;
    let puller = state_puller(&store, switchable_fleet(Arc::clone(&first)));

    puller.pull_all(Utc::now()).await.unwrap();
    let committed = store.get_daemon_by_id(DaemonId(1)).await.unwrap().unwrap();
    let committed_hash = committed.config_hash.clone();
    assert!(committed_hash.is_some());

    *first.lock().unwrap() = json!({"Dhcp4": {"subnet4": [{"id": 1, "subnet": "not-a-prefix"}]}});
    let err = puller.pull_daemon(&committed, Utc::now()).await.unwrap_err();
    assert!(err.to_string().contains("not-a-prefix"));

    let stored = store.get_daemon_by_id(DaemonId(1)).await.unwrap().unwrap();
    assert_eq!(stored.config_hash, committed_hash);
    assert!(stored.active);
    assert!(event_texts(&store).await.iter().any(|t| t.ends_with("configuration changed")));

    *first.lock().unwrap() = json!({"Dhcp4": {"subnet4": [{"id": 7, "subnet": "198.51.100.0/24"}]}});
    let retried = puller.pull_daemon(&stored, Utc::now()).await.unwrap();
    assert!(retried.config_changed);
    assert_eq!(retried.new_subnets, 1);
    assert_ne!(
        store.get_daemon_by_id(DaemonId(1)).await.unwrap().unwrap().config_hash,
        committed_hash
    );
}
