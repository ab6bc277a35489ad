//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use keafly_config::ConfigError;
use keafly_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach {daemon}: {reason}")]
    #[diagnostic(
        code(keafly::connection_failed),
        help(
            "Check that the Kea control agent is running and reachable.\n\
             Try: keafly pull -v"
        )
    )]
    ConnectionFailed { daemon: String, reason: String },

    // ── Kea ──────────────────────────────────────────────────────────

    #[error("{message}")]
    #[diagnostic(code(keafly::kea_error))]
    Kea { message: String },

    #[error("Daemons {daemons} are locked by another configuration change")]
    #[diagnostic(
        code(keafly::locked),
        help("Wait for the other change to commit or be cancelled, then retry.")
    )]
    Locked { daemons: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(keafly::not_found))]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("'{operation}' is not supported")]
    #[diagnostic(code(keafly::unsupported), help("This requires {required}."))]
    Unsupported { operation: String, required: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(keafly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(keafly::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Expected at: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("No password for {machine} in profile '{profile}'")]
    #[diagnostic(
        code(keafly::no_credentials),
        help(
            "Store one with: keafly config set-password --profile {profile} <address>\n\
             Or name an environment variable with password_env in the profile."
        )
    )]
    NoCredentials { profile: String, machine: String },

    #[error(transparent)]
    #[diagnostic(code(keafly::config))]
    Config(Box<ConfigError>),

    // ── Internal ─────────────────────────────────────────────────────

    #[error("{0}")]
    #[diagnostic(code(keafly::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(keafly::json))]
    Json(#[from] serde_json::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(keafly::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Locked { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                resource_type: entity_type.to_owned(),
                identifier,
            },
            CoreError::LockContention { daemon_ids } => CliError::Locked {
                daemons: daemon_ids
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            CoreError::Transport { daemon, reason } => CliError::ConnectionFailed { daemon, reason },
            err @ CoreError::CommandFailed { .. } => CliError::Kea {
                message: err.to_string(),
            },
            CoreError::Unsupported {
                operation,
                required,
            } => CliError::Unsupported { operation, required },
            other => CliError::Internal(other.to_string()),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available
                },
                path: keafly_config::config_path().display().to_string(),
            },
            ConfigError::NoCredentials { profile, machine } => {
                CliError::NoCredentials { profile, machine }
            }
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use keafly_core::DaemonId;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let locked: CliError = CoreError::LockContention {
            daemon_ids: vec![DaemonId(1), DaemonId(3)],
        }
        .into();
        assert_eq!(locked.exit_code(), exit_code::CONFLICT);
        assert_eq!(
            locked.to_string(),
            "Daemons 1, 3 are locked by another configuration change"
        );

        let failed: CliError = CoreError::CommandFailed {
            command: "subnet4-add".into(),
            daemon: "dhcp4".into(),
            result: 1,
            text: "duplicate".into(),
        }
        .into();
        assert_eq!(failed.exit_code(), exit_code::GENERAL);
        assert_eq!(
            failed.to_string(),
            "subnet4-add command to dhcp4 failed: non-success response result from Kea: 1, text: duplicate"
        );

        let unreachable: CliError = CoreError::Transport {
            daemon: "dhcp4".into(),
            reason: "timed out".into(),
        }
        .into();
        assert_eq!(unreachable.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn missing_profile_is_not_found() {
        let err: CliError = ConfigError::ProfileNotFound {
            name: "prod".into(),
            available: String::new(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }
}
