//! Shared configuration for the keafly tools.
//!
//! TOML profiles describing the monitored fleet, credential resolution
//! (env + keyring + plaintext), and translation to
//! `keafly_core::ControlPlaneConfig`. Core never reads these types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use keafly_api::{TlsMode, TransportConfig};
use keafly_core::{ControlPlaneConfig, DaemonName, LockPolicy, MachineConfig};

/// Keyring service name under which passwords are stored.
pub const KEYRING_SERVICE: &str = "keafly";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found in configuration")]
    ProfileNotFound { name: String, available: String },

    #[error("no password configured for {machine} in profile '{profile}'")]
    NoCredentials { profile: String, machine: String },

    #[error("keyring access failed: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named fleets.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Global tunables. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    pub output: String,
    pub color: String,
    pub insecure: bool,
    /// Deadline of each command sent to a control agent.
    pub timeout: u64,
    /// Deadline of the combined version/config/status refresh.
    pub refresh_timeout: u64,
    /// Zero disables the state puller.
    pub state_pull_interval: u64,
    /// Zero disables the statistics puller.
    pub stats_pull_interval: u64,
    /// Zero disables the scheduled change due-scanner.
    pub due_scan_interval: u64,
    pub lease_concurrency: usize,
    /// `postpone` or `fail-fast`.
    pub lock_policy: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: "table".into(),
            color: "auto".into(),
            insecure: false,
            timeout: 10,
            refresh_timeout: 2,
            state_pull_interval: 30,
            stats_pull_interval: 60,
            due_scan_interval: 10,
            lease_concurrency: 8,
            lock_policy: "postpone".into(),
        }
    }
}

/// A named fleet of machines running Kea control agents.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub machines: Vec<MachineProfile>,

    /// Path to a CA certificate trusted for every machine.
    pub ca_cert: Option<PathBuf>,

    /// Accept self-signed certificates on every machine.
    pub insecure: Option<bool>,

    /// Override of `defaults.timeout`.
    pub timeout: Option<u64>,
}

/// One machine of a profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MachineProfile {
    pub address: String,

    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    pub name: Option<String>,

    /// Daemons behind the control agent: `dhcp4`, `dhcp6`, `ca`, `d2`.
    #[serde(default = "default_daemons")]
    pub daemons: Vec<String>,

    /// Basic-auth user configured on the control agent.
    pub username: Option<String>,

    /// Environment variable holding the basic-auth password.
    pub password_env: Option<String>,

    /// Plaintext password; prefer the keyring or `password_env`.
    pub password: Option<String>,

    pub ca_cert: Option<PathBuf>,
    pub insecure: Option<bool>,
}

impl MachineProfile {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            agent_port: default_agent_port(),
            scheme: default_scheme(),
            name: None,
            daemons: default_daemons(),
            username: None,
            password_env: None,
            password: None,
            ca_cert: None,
            insecure: None,
        }
    }

    /// `address:port`, the key under which the keyring stores the password.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.agent_port)
    }
}

fn default_agent_port() -> u16 {
    8000
}
fn default_scheme() -> String {
    "http".into()
}
fn default_daemons() -> Vec<String> {
    vec!["dhcp4".into()]
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "keafly", "keafly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("keafly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Layer defaults, the TOML file at `path` and `KEAFLY_` environment
/// variables (`KEAFLY_DEFAULTS__TIMEOUT=5`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("KEAFLY_").split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), profiles = config.profiles.len(), "configuration loaded");
    Ok(config)
}

/// Load the full Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Profile resolution ──────────────────────────────────────────────

/// The requested profile, else the configured default, else `default`.
pub fn active_profile_name(requested: Option<&str>, config: &Config) -> String {
    requested
        .map(str::to_owned)
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

pub fn find_profile<'a>(config: &'a Config, name: &str) -> Result<&'a Profile, ConfigError> {
    config.profiles.get(name).ok_or_else(|| ConfigError::ProfileNotFound {
        name: name.into(),
        available: config.profiles.keys().cloned().collect::<Vec<_>>().join(", "),
    })
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str, machine: &MachineProfile) -> Result<keyring::Entry, ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{}", machine.endpoint()))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

fn keyring_lookup(profile_name: &str, machine: &MachineProfile) -> Option<String> {
    keyring_entry(profile_name, machine).ok()?.get_password().ok()
}

/// Store a machine's basic-auth password in the system keyring.
pub fn store_password(profile_name: &str, machine: &MachineProfile, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name, machine)?
        .set_password(password)
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

/// Resolve a machine's basic-auth password: `password_env` → keyring →
/// plaintext.
pub fn resolve_password(profile_name: &str, machine: &MachineProfile) -> Result<SecretString, ConfigError> {
    resolve_password_with(profile_name, machine, keyring_lookup)
}

fn resolve_password_with(
    profile_name: &str,
    machine: &MachineProfile,
    keyring: impl Fn(&str, &MachineProfile) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = machine.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Some(secret) = keyring(profile_name, machine) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = machine.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
        machine: machine.endpoint(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_lock_policy(raw: &str) -> Result<LockPolicy, ConfigError> {
    match raw {
        "postpone" => Ok(LockPolicy::Postpone),
        "fail-fast" => Ok(LockPolicy::FailFast),
        other => Err(ConfigError::validation(
            "lock_policy",
            format!("expected 'postpone' or 'fail-fast', got '{other}'"),
        )),
    }
}

fn tls_mode(insecure: bool, ca_cert: Option<&PathBuf>) -> TlsMode {
    if insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(path) = ca_cert {
        TlsMode::CustomCa(path.clone())
    } else {
        TlsMode::System
    }
}

fn machine_config(
    profile_name: &str,
    machine: &MachineProfile,
    fleet_transport: &TransportConfig,
    fleet_insecure: bool,
    keyring: impl Fn(&str, &MachineProfile) -> Option<String>,
) -> Result<MachineConfig, ConfigError> {
    if machine.scheme != "http" && machine.scheme != "https" {
        return Err(ConfigError::validation(
            "scheme",
            format!("expected 'http' or 'https' for {}, got '{}'", machine.endpoint(), machine.scheme),
        ));
    }
    let daemons = machine
        .daemons
        .iter()
        .map(|raw| {
            DaemonName::from_str(raw).map_err(|_| {
                ConfigError::validation("daemons", format!("unknown daemon '{raw}' on {}", machine.endpoint()))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut config = MachineConfig::new(machine.address.clone(), machine.agent_port);
    config.scheme.clone_from(&machine.scheme);
    config.name.clone_from(&machine.name);
    config.daemons = daemons;

    let overrides_tls = machine.insecure.is_some() || machine.ca_cert.is_some();
    if machine.username.is_some() || overrides_tls {
        let mut transport = fleet_transport.clone();
        if overrides_tls {
            transport.tls = tls_mode(
                machine.insecure.unwrap_or(fleet_insecure),
                machine.ca_cert.as_ref(),
            );
        }
        if let Some(ref username) = machine.username {
            let password = resolve_password_with(profile_name, machine, &keyring)?;
            transport = transport.with_basic_auth(username.clone(), password);
        }
        config.transport = Some(transport);
    }
    Ok(config)
}

/// Build a `ControlPlaneConfig` for the named profile.
pub fn profile_to_control_plane_config(
    config: &Config,
    profile_name: &str,
) -> Result<ControlPlaneConfig, ConfigError> {
    translate(config, profile_name, keyring_lookup)
}

fn translate(
    config: &Config,
    profile_name: &str,
    keyring: impl Fn(&str, &MachineProfile) -> Option<String>,
) -> Result<ControlPlaneConfig, ConfigError> {
    let profile = find_profile(config, profile_name)?;
    let defaults = &config.defaults;
    if defaults.lease_concurrency == 0 {
        return Err(ConfigError::validation("lease_concurrency", "must be at least 1"));
    }

    let insecure = profile.insecure.unwrap_or(defaults.insecure);
    let timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    let mut transport = TransportConfig::default().with_timeout(timeout);
    transport.tls = tls_mode(insecure, profile.ca_cert.as_ref());

    let machines = profile
        .machines
        .iter()
        .map(|m| machine_config(profile_name, m, &transport, insecure, &keyring))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ControlPlaneConfig {
        machines,
        transport,
        command_timeout: timeout,
        refresh_timeout: Duration::from_secs(defaults.refresh_timeout),
        state_pull_interval: Duration::from_secs(defaults.state_pull_interval),
        stats_pull_interval: Duration::from_secs(defaults.stats_pull_interval),
        due_scan_interval: Duration::from_secs(defaults.due_scan_interval),
        lease_concurrency: defaults.lease_concurrency,
        lock_policy: parse_lock_policy(&defaults.lock_policy)?,
    })
}
