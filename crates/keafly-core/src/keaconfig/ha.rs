// ── HA hook library parameters ──

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{HaMode, HaRole};

/// One `high-availability` entry of the HA hook parameters.
///
/// Hub-and-spoke deployments declare several entries per daemon, one
/// per relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HaConfig {
    pub this_server_name: String,
    pub mode: HaMode,
    pub peers: Vec<HaPeerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HaPeerConfig {
    pub name: String,
    pub url: String,
    pub role: HaRole,
    #[serde(default)]
    pub auto_failover: Option<bool>,
}

impl HaConfig {
    /// The peer entry describing the configured server itself.
    pub fn this_peer(&self) -> Option<&HaPeerConfig> {
        self.peers.iter().find(|p| p.name == self.this_server_name)
    }

    /// Relationship name shared by every member: the primary's name.
    pub fn relationship_name(&self) -> &str {
        self.peers
            .iter()
            .find(|p| p.role == HaRole::Primary)
            .map_or(self.this_server_name.as_str(), |p| p.name.as_str())
    }
}

/// Parse the `high-availability` list out of HA hook parameters.
pub fn parse_ha_parameters(parameters: &Value) -> Result<Vec<HaConfig>, serde_json::Error> {
    match parameters.get("high-availability") {
        Some(list) => serde_json::from_value(list.clone()),
        None => Ok(Vec::new()),
    }
}
