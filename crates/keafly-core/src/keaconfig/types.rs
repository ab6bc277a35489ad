// ── Typed views over Kea configuration fragments ──
//
// Only the fields the control plane interprets are named; everything
// else is kept verbatim in the flattened `parameters` maps so that a
// fragment can be written back to a daemon without loss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A `subnet4` / `subnet6` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetConfig {
    pub id: i64,
    pub subnet: String,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default, rename = "pd-pools")]
    pub pd_pools: Vec<PdPoolConfig>,
    #[serde(default, rename = "option-data")]
    pub option_data: Vec<OptionDataConfig>,
    #[serde(default)]
    pub reservations: Vec<ReservationConfig>,
    #[serde(default, rename = "client-class", skip_serializing_if = "Option::is_none")]
    pub client_class: Option<String>,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

/// An address pool entry (`"pool": "10.0.0.10-10.0.0.20"` or CIDR).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub pool: String,
    #[serde(default, rename = "pool-id", skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<i64>,
    #[serde(default, rename = "option-data")]
    pub option_data: Vec<OptionDataConfig>,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

/// A delegated prefix pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdPoolConfig {
    pub prefix: String,
    #[serde(rename = "prefix-len")]
    pub prefix_len: u8,
    #[serde(rename = "delegated-len")]
    pub delegated_len: u8,
    #[serde(default, rename = "excluded-prefix", skip_serializing_if = "Option::is_none")]
    pub excluded_prefix: Option<String>,
    #[serde(default, rename = "excluded-prefix-len", skip_serializing_if = "Option::is_none")]
    pub excluded_prefix_len: Option<u8>,
    #[serde(default, rename = "pool-id", skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<i64>,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

/// A `shared-networks` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedNetworkConfig {
    pub name: String,
    #[serde(default, alias = "subnet4", alias = "subnet6")]
    pub subnets: Vec<SubnetConfig>,
    #[serde(default, rename = "option-data")]
    pub option_data: Vec<OptionDataConfig>,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

/// A host reservation, global or subnet-scoped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReservationConfig {
    #[serde(default)]
    pub hw_address: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub duid: Option<String>,
    #[serde(default)]
    pub flex_id: Option<String>,
    #[serde(default)]
    pub circuit_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub next_server: Option<String>,
    #[serde(default)]
    pub client_classes: Vec<String>,
    #[serde(default)]
    pub option_data: Vec<OptionDataConfig>,
}

/// An `option-data` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OptionDataConfig {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub space: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub always_send: Option<bool>,
    #[serde(default)]
    pub csv_format: Option<bool>,
}

/// A `hooks-libraries` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookLibraryConfig {
    pub library: String,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// A `loggers` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggerConfig {
    pub name: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default, alias = "output_options")]
    pub output_options: Vec<LoggerOutputConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerOutputConfig {
    pub output: String,
}
