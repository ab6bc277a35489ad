// ── Core error types ──
//
// Errors surfaced by keafly-core. Transport-layer failures from
// keafly-api are translated into domain variants by the `From` impl
// and by `CoreError::from_api`, which also names the daemon involved.

use thiserror::Error;

use crate::model::DaemonId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input errors ─────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Entity not found: {entity_type} with id {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    // ── Transaction errors ───────────────────────────────────────────
    #[error("Daemons {daemon_ids:?} are locked by another transaction")]
    LockContention { daemon_ids: Vec<DaemonId> },

    #[error("Problem with contacting {daemon}: {reason}")]
    Transport { daemon: String, reason: String },

    #[error(
        "{command} command to {daemon} failed: non-success response result from Kea: {result}, text: {text}"
    )]
    CommandFailed {
        command: String,
        daemon: String,
        result: i64,
        text: String,
    },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Cannot retrieve scheduled config change {id}: {message}")]
    ScheduleRetrieval { id: i64, message: String },

    // ── Capability errors ────────────────────────────────────────────
    #[error("Operation not supported: {operation} (requires {required})")]
    Unsupported { operation: String, required: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity_type: &'static str, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            identifier: identifier.to_string(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Translate an API error, naming the daemon the request was meant for.
    pub fn from_api(err: keafly_api::Error, daemon: &str) -> Self {
        match err {
            keafly_api::Error::CommandFailed {
                command,
                daemon,
                result,
                text,
            } => Self::CommandFailed {
                command,
                daemon,
                result: result.as_i64(),
                text,
            },
            other => Self::Transport {
                daemon: daemon.to_owned(),
                reason: other.to_string(),
            },
        }
    }

    /// Returns `true` for errors that a caller may resolve by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockContention { .. } | Self::Transport { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<keafly_api::Error> for CoreError {
    fn from(err: keafly_api::Error) -> Self {
        Self::from_api(err, "<unknown>")
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}
