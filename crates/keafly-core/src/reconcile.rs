// ── Daemon state reconciler ──
//
// Fetches version, configuration and (for DHCP daemons) status from one
// daemon in a single gateway round-trip and derives a fresh snapshot plus
// the events describing what changed. The input daemon is never mutated.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keafly_api::{KeaCommand, KeaResponse};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::CoreError;
use crate::gateway::AgentGateway;
use crate::keaconfig::KeaConfig;
use crate::model::{Daemon, DaemonName, LogTarget, NewEvent};

/// Upper bound for the combined version/config/status call.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(2);

/// What changed between two snapshots of a daemon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateChange {
    pub events: Vec<NewEvent>,
    pub is_config_changed: bool,
}

#[derive(Debug)]
pub struct RefreshOutcome {
    /// The new snapshot; inactive when `error` is set.
    pub daemon: Daemon,
    pub change: StateChange,
    /// The `high-availability` list of `status-get`, when reported.
    pub ha_status: Option<Value>,
    pub error: Option<CoreError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StatusArguments {
    #[serde(default)]
    uptime: i64,
    #[serde(default)]
    reload: i64,
    #[serde(default)]
    high_availability: Option<Value>,
}

/// `now` minus an agent-reported number of seconds; `None` when out of range.
pub(crate) fn seconds_before(now: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    chrono::TimeDelta::try_seconds(seconds).and_then(|d| now.checked_sub_signed(d))
}

fn command_for(daemon: &Daemon, name: &str) -> KeaCommand {
    match daemon.name {
        DaemonName::Ca => KeaCommand::for_agent(name),
        other => KeaCommand::new(name, other.as_ref()),
    }
}

/// Query `daemon` and return its refreshed snapshot.
pub async fn refresh(
    gateway: &dyn AgentGateway,
    daemon: &Daemon,
    timeout: Duration,
    now: DateTime<Utc>,
) -> RefreshOutcome {
    let mut commands = vec![command_for(daemon, "version-get"), command_for(daemon, "config-get")];
    if daemon.name.is_dhcp() {
        commands.push(command_for(daemon, "status-get"));
    }

    let result = gateway.forward_to_kea(daemon, &commands, timeout).await;
    let (transport_error, responses) = result.into_parts();
    let parsed = match transport_error {
        Some(e) => Err(e),
        None => check_all(daemon, &commands, responses),
    };

    match parsed.and_then(|responses| apply_responses(daemon, &responses, now)) {
        Ok((fresh, ha_status)) => {
            let change = describe_change(daemon, &fresh);
            debug!(
                daemon_id = %daemon.id,
                config_changed = change.is_config_changed,
                events = change.events.len(),
                "refreshed daemon"
            );
            RefreshOutcome {
                daemon: fresh,
                change,
                ha_status,
                error: None,
            }
        }
        Err(error) => {
            let mut fresh = daemon.clone();
            fresh.active = false;
            let mut change = StateChange::default();
            if daemon.active {
                change.events.push(
                    NewEvent::error(format!("{daemon} unreachable"))
                        .for_daemon(daemon.id, daemon.machine_id)
                        .with_details(error.to_string()),
                );
            }
            RefreshOutcome {
                daemon: fresh,
                change,
                ha_status: None,
                error: Some(error),
            }
        }
    }
}

fn check_all(
    daemon: &Daemon,
    commands: &[KeaCommand],
    responses: Vec<KeaResponse>,
) -> Result<Vec<KeaResponse>, CoreError> {
    if responses.len() < commands.len() {
        return Err(CoreError::Transport {
            daemon: daemon.to_string(),
            reason: format!(
                "expected {} responses, received {}",
                commands.len(),
                responses.len()
            ),
        });
    }
    commands
        .iter()
        .zip(responses)
        .map(|(command, response)| {
            response
                .check(&command.command, daemon.name.as_ref())
                .map_err(|e| CoreError::from_api(e, &daemon.to_string()))
        })
        .collect()
}

fn apply_responses(
    daemon: &Daemon,
    responses: &[KeaResponse],
    now: DateTime<Utc>,
) -> Result<(Daemon, Option<Value>), CoreError> {
    let mut fresh = daemon.clone();
    fresh.active = true;

    if let Some(version) = responses.first() {
        fresh.version = Some(version.text().trim().to_owned());
        fresh.extended_version = version
            .arguments
            .as_ref()
            .and_then(|a| a.get("extended"))
            .and_then(Value::as_str)
            .map(str::to_owned);
    }

    if let Some(config) = responses.get(1) {
        let tree = config.arguments.clone().ok_or_else(|| {
            CoreError::validation(format!("{daemon} returned an empty configuration"))
        })?;
        let config = KeaConfig::new(tree)?;
        fresh.log_targets = log_targets(&config);
        fresh.config_hash = Some(config.hash());
        fresh.config = Some(Arc::new(config));
    }

    let mut ha_status = None;
    if let Some(status) = responses.get(2) {
        let status: StatusArguments = match &status.arguments {
            Some(args) => serde_json::from_value(args.clone())
                .map_err(|e| CoreError::validation(format!("malformed status-get reply: {e}")))?,
            None => StatusArguments::default(),
        };
        fresh.uptime = status.uptime;
        fresh.reloaded_at = seconds_before(now, status.reload);
        ha_status = status.high_availability;
    }

    Ok((fresh, ha_status))
}

fn log_targets(config: &KeaConfig) -> Vec<LogTarget> {
    config
        .loggers()
        .into_iter()
        .flat_map(|logger| {
            let severity = logger.severity.clone().unwrap_or_else(|| "INFO".to_owned());
            logger
                .output_options
                .into_iter()
                .map(move |out| LogTarget {
                    name: logger.name.clone(),
                    severity: severity.to_lowercase(),
                    output: out.output,
                })
        })
        .collect()
}

fn describe_change(old: &Daemon, new: &Daemon) -> StateChange {
    let mut events = Vec::new();
    let event = |text: String| NewEvent::info(text).for_daemon(new.id, new.machine_id);

    if !old.active {
        events.push(event(format!("{new} reachable now")));
    }
    if old.active && new.uptime < old.uptime {
        events.push(
            NewEvent::warning(format!("{new} has been restarted"))
                .for_daemon(new.id, new.machine_id),
        );
    }
    if let (Some(before), Some(after)) = (&old.version, &new.version) {
        if before != after {
            events.push(event(format!("{new} version changed from {before} to {after}")));
        }
    }
    let is_config_changed = old.config_hash != new.config_hash;
    if is_config_changed && old.config_hash.is_some() {
        events.push(event(format!("{new} configuration changed")));
    }

    StateChange {
        events,
        is_config_changed,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gateway::GatewayResult;
    use crate::model::{AccessPoint, DaemonId, EventLevel, MachineId};
    use async_trait::async_trait;
    use keafly_api::ResponseCode;
    use serde_json::json;
    use std::sync::Mutex;

    struct Canned {
        responses: Mutex<Vec<GatewayResult>>,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl AgentGateway for Canned {
        async fn forward_to_kea(
            &self,
            _daemon: &Daemon,
            commands: &[KeaCommand],
            _timeout: Duration,
        ) -> GatewayResult {
            self.seen
                .lock()
                .unwrap()
                .push(commands.iter().map(|c| c.command.clone()).collect());
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn canned(results: Vec<GatewayResult>) -> Canned {
        Canned {
            responses: Mutex::new(results),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn healthy(version: &str, uptime: i64, config: Value) -> GatewayResult {
        GatewayResult::new(vec![
            KeaResponse {
                result: ResponseCode::Success,
                text: Some(version.into()),
                arguments: Some(json!({"extended": format!("{version}-git")})),
            },
            KeaResponse::success(Some(config)),
            KeaResponse::success(Some(json!({"pid": 42, "uptime": uptime, "reload": 60}))),
        ])
    }

    fn dhcp4() -> Daemon {
        let mut daemon = Daemon::new(
            MachineId(1),
            DaemonName::Dhcp4,
            AccessPoint::control("10.0.0.1", 8000),
        );
        daemon.id = DaemonId(1);
        daemon
    }

    fn config(valid_lifetime: i64) -> Value {
        json!({
            "Dhcp4": {
                "valid-lifetime": valid_lifetime,
                "loggers": [{"name": "kea-dhcp4", "severity": "DEBUG",
                             "output-options": [{"output": "/var/log/kea-dhcp4.log"}]}]
            },
            "hash": "ignored"
        })
    }

    #[tokio::test]
    async fn first_contact_marks_reachable_and_config_changed() {
        let gateway = canned(vec![healthy("2.6.1", 100, config(4000))]);
        let now = Utc::now();
        let outcome = refresh(&gateway, &dhcp4(), REFRESH_TIMEOUT, now).await;

        assert!(outcome.error.is_none());
        let fresh = &outcome.daemon;
        assert!(fresh.active);
        assert_eq!(fresh.version.as_deref(), Some("2.6.1"));
        assert_eq!(fresh.extended_version.as_deref(), Some("2.6.1-git"));
        assert_eq!(fresh.uptime, 100);
        assert_eq!(fresh.reloaded_at, Some(now - chrono::Duration::seconds(60)));
        assert_eq!(fresh.log_targets[0].severity, "debug");
        assert!(fresh.config.as_ref().unwrap().as_map().get("hash").is_none());
        assert!(outcome.change.is_config_changed);
        assert_eq!(outcome.change.events.len(), 1);
        assert!(outcome.change.events[0].text.ends_with("reachable now"));
        assert_eq!(
            gateway.seen.lock().unwrap()[0],
            vec!["version-get", "config-get", "status-get"]
        );
    }

    #[tokio::test]
    async fn out_of_range_reload_leaves_reload_time_unset() {
        let base = healthy("2.6.1", 100, config(4000));
        let gateway = canned(vec![GatewayResult::new(vec![
            base.response(0).unwrap().clone(),
            base.response(1).unwrap().clone(),
            KeaResponse::success(Some(json!({"uptime": 100, "reload": i64::MAX}))),
        ])]);
        let outcome = refresh(&gateway, &dhcp4(), REFRESH_TIMEOUT, Utc::now()).await;

        assert!(outcome.error.is_none());
        assert!(outcome.daemon.active);
        assert_eq!(outcome.daemon.reloaded_at, None);
        assert_eq!(outcome.daemon.uptime, 100);
    }

    #[tokio::test]
    async fn detects_restart_version_and_config_changes() {
        let gateway = canned(vec![
            healthy("2.6.1", 100, config(4000)),
            healthy("2.7.0", 5, config(7200)),
        ]);
        let first = refresh(&gateway, &dhcp4(), REFRESH_TIMEOUT, Utc::now()).await;
        let second = refresh(&gateway, &first.daemon, REFRESH_TIMEOUT, Utc::now()).await;

        let texts: Vec<&str> = second.change.events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts.len(), 3);
        assert!(texts[0].ends_with("has been restarted"));
        assert!(texts[1].ends_with("version changed from 2.6.1 to 2.7.0"));
        assert!(texts[2].ends_with("configuration changed"));
        assert!(second.change.is_config_changed);
    }

    #[tokio::test]
    async fn failure_marks_inactive_and_reports_unreachable_once() {
        let gateway = canned(vec![
            healthy("2.6.1", 100, config(4000)),
            GatewayResult::failed(
                CoreError::Transport {
                    daemon: "dhcp4".into(),
                    reason: "connection refused".into(),
                },
                vec![],
            ),
            GatewayResult::new(vec![KeaResponse::failure(ResponseCode::Error, "boom")]),
        ]);
        let up = refresh(&gateway, &dhcp4(), REFRESH_TIMEOUT, Utc::now()).await;
        let down = refresh(&gateway, &up.daemon, REFRESH_TIMEOUT, Utc::now()).await;

        assert!(!down.daemon.active);
        assert!(down.error.is_some());
        assert_eq!(down.change.events.len(), 1);
        assert_eq!(down.change.events[0].level, EventLevel::Error);
        assert!(down.change.events[0].text.ends_with("unreachable"));
        assert_eq!(down.daemon.config_hash, up.daemon.config_hash);

        let still_down = refresh(&gateway, &down.daemon, REFRESH_TIMEOUT, Utc::now()).await;
        assert!(still_down.error.is_some());
        assert!(still_down.change.events.is_empty());
    }
}
