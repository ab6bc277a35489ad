// ── Kea configuration snapshots ──
//
// A `KeaConfig` is the JSON tree returned by `config-get`, rooted at a
// single daemon key (`Dhcp4`, `Dhcp6`, `Control-agent`, `DhcpDdns`).
// Snapshots are immutable; updates produce a new value.

pub mod ha;
pub mod types;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::fingerprint;
use crate::model::{DaemonName, Family};

pub use ha::{HaConfig, HaPeerConfig};
pub use types::{
    HookLibraryConfig, LoggerConfig, OptionDataConfig, PdPoolConfig, PoolConfig,
    ReservationConfig, SharedNetworkConfig, SubnetConfig,
};

const ROOTS: [&str; 4] = ["Dhcp4", "Dhcp6", "Control-agent", "DhcpDdns"];

/// Immutable configuration tree of one daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeaConfig(Map<String, Value>);

impl KeaConfig {
    /// Wrap the `arguments` of a `config-get` response.
    ///
    /// The `hash` member some releases attach next to the root is dropped
    /// so that fingerprints only cover configuration content.
    pub fn new(value: Value) -> Result<Self, CoreError> {
        let Value::Object(mut map) = value else {
            return Err(CoreError::validation("configuration must be a JSON object"));
        };
        map.remove("hash");
        if !map.keys().any(|k| ROOTS.contains(&k.as_str())) {
            return Err(CoreError::validation(format!(
                "configuration has no known root (expected one of {ROOTS:?})"
            )));
        }
        Ok(Self(map))
    }

    /// Build a configuration from a root name and its body.
    pub fn with_root(daemon: DaemonName, body: Map<String, Value>) -> Self {
        let mut map = Map::new();
        map.insert(daemon.config_root().to_owned(), Value::Object(body));
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn root_name(&self) -> Option<&str> {
        self.0
            .keys()
            .map(String::as_str)
            .find(|k| ROOTS.contains(k))
    }

    /// The body under the root key.
    pub fn root(&self) -> Option<&Map<String, Value>> {
        self.root_name()
            .and_then(|name| self.0.get(name))
            .and_then(Value::as_object)
    }

    pub fn family(&self) -> Option<Family> {
        match self.root_name()? {
            "Dhcp4" => Some(Family::V4),
            "Dhcp6" => Some(Family::V6),
            _ => None,
        }
    }

    /// Content fingerprint; equal for semantically equal trees.
    pub fn hash(&self) -> String {
        fingerprint::config_hash(&Value::Object(self.0.clone()))
    }

    fn root_list<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, CoreError> {
        match self.root().and_then(|root| root.get(key)) {
            Some(list) => serde_json::from_value(list.clone()).map_err(|e| {
                CoreError::validation(format!("malformed {key} in configuration: {e}"))
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Top-level `subnet4` / `subnet6` entries (outside shared networks).
    pub fn subnets(&self) -> Result<Vec<SubnetConfig>, CoreError> {
        match self.family() {
            Some(Family::V4) => self.root_list("subnet4"),
            Some(Family::V6) => self.root_list("subnet6"),
            None => Ok(Vec::new()),
        }
    }

    pub fn shared_networks(&self) -> Result<Vec<SharedNetworkConfig>, CoreError> {
        self.root_list("shared-networks")
    }

    /// Global (non subnet-scoped) reservations.
    pub fn reservations(&self) -> Result<Vec<ReservationConfig>, CoreError> {
        self.root_list("reservations")
    }

    pub fn hook_libraries(&self) -> Vec<HookLibraryConfig> {
        self.root_list("hooks-libraries").unwrap_or_default()
    }

    pub fn has_hook(&self, library: &str) -> bool {
        self.hook_libraries()
            .iter()
            .any(|hook| hook.library.contains(library))
    }

    /// Parameters of the first hook library whose file name contains `library`.
    pub fn hook_parameters(&self, library: &str) -> Option<Value> {
        self.hook_libraries()
            .into_iter()
            .find(|hook| hook.library.contains(library))
            .and_then(|hook| hook.parameters)
    }

    /// HA relationships declared by the HA hook library.
    ///
    /// `Ok(None)` when the hook is not loaded.
    pub fn ha_configs(&self) -> Result<Option<Vec<HaConfig>>, CoreError> {
        if !self.has_hook("libdhcp_ha") {
            return Ok(None);
        }
        let params = self
            .hook_parameters("libdhcp_ha")
            .ok_or_else(|| CoreError::validation("HA hook library has no parameters"))?;
        ha::parse_ha_parameters(&params)
            .map(Some)
            .map_err(|e| CoreError::validation(format!("malformed HA hook parameters: {e}")))
    }

    pub fn loggers(&self) -> Vec<LoggerConfig> {
        self.root_list("loggers").unwrap_or_default()
    }

    /// Global parameters: root members that are not lists of scopes.
    pub fn global_parameters(&self) -> Map<String, Value> {
        const SCOPES: [&str; 5] = [
            "subnet4",
            "subnet6",
            "shared-networks",
            "reservations",
            "hooks-libraries",
        ];
        self.root()
            .map(|root| {
                root.iter()
                    .filter(|(k, _)| !SCOPES.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A new snapshot with `partial` deep-merged into the root body.
    pub fn merged(&self, partial: &Map<String, Value>) -> Self {
        let mut map = self.0.clone();
        if let Some(name) = self.root_name().map(str::to_owned) {
            if let Some(Value::Object(root)) = map.get_mut(&name) {
                merge_maps(root, partial);
            }
        }
        Self(map)
    }
}

/// Recursively merge `patch` into `target`; objects merge, everything
/// else (including arrays) replaces.
pub fn merge_maps(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
