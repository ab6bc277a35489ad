// ── DHCP options ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::daemon::Family;
use crate::keaconfig::OptionDataConfig;

/// A DHCP option in Kea's textual `option-data` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpOption {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub name: Option<String>,
    pub space: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub always_send: bool,
    #[serde(default)]
    pub csv_format: Option<bool>,
}

impl DhcpOption {
    pub fn new(code: u16, space: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            name: None,
            space: space.into(),
            data: None,
            always_send: false,
            csv_format: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Convert a configuration entry; the space defaults to the family's
    /// standard option space.
    pub fn from_config(config: &OptionDataConfig, family: Family) -> Self {
        let default_space = match family {
            Family::V4 => "dhcp4",
            Family::V6 => "dhcp6",
        };
        Self {
            code: config.code,
            name: config.name.clone(),
            space: config
                .space
                .clone()
                .unwrap_or_else(|| default_space.to_owned()),
            data: config.data.clone(),
            always_send: config.always_send.unwrap_or(false),
            csv_format: config.csv_format,
        }
    }

    /// Render as a Kea `option-data` entry.
    pub fn to_kea(&self) -> Value {
        let mut entry = Map::new();
        if let Some(code) = self.code {
            entry.insert("code".into(), Value::from(code));
        }
        if let Some(name) = &self.name {
            entry.insert("name".into(), Value::from(name.clone()));
        }
        entry.insert("space".into(), Value::from(self.space.clone()));
        if let Some(data) = &self.data {
            entry.insert("data".into(), Value::from(data.clone()));
        }
        if self.always_send {
            entry.insert("always-send".into(), Value::Bool(true));
        }
        if let Some(csv) = self.csv_format {
            entry.insert("csv-format".into(), Value::Bool(csv));
        }
        Value::Object(entry)
    }

    pub(crate) fn sort_key(&self) -> (&str, Option<u16>, Option<&str>) {
        (self.space.as_str(), self.code, self.name.as_deref())
    }
}

/// Render an option list as a Kea `option-data` array.
pub fn options_to_kea(options: &[DhcpOption]) -> Value {
    Value::Array(options.iter().map(DhcpOption::to_kea).collect())
}
