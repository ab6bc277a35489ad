use thiserror::Error;

use crate::command::ResponseCode;

/// Top-level error type for the `keafly-api` crate.
///
/// Covers every failure mode of the Kea control channel: transport,
/// envelope decoding, and non-success result codes reported by a daemon.
/// `keafly-core` maps these into its own error kinds.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The control agent answered with a non-2xx HTTP status.
    #[error("Control agent returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// The agent returned fewer responses than commands were sent.
    #[error("Missing response for {command} from {daemon}")]
    MissingResponse { command: String, daemon: String },

    // ── Kea ─────────────────────────────────────────────────────────
    /// A daemon answered with a non-zero result code.
    #[error(
        "{command} command to {daemon} failed: non-success response result from Kea: {}, text: {text}",
        result.as_i64()
    )]
    CommandFailed {
        command: String,
        daemon: String,
        result: ResponseCode,
        text: String,
    },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the daemon reported the command as unsupported.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed {
                result: ResponseCode::Unsupported,
                ..
            }
        )
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::HttpStatus { status: 404, .. } => true,
            Self::CommandFailed {
                result: ResponseCode::Empty,
                ..
            } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_display_carries_command_daemon_and_text() {
        let err = Error::CommandFailed {
            command: "reservation-add".into(),
            daemon: "dhcp4".into(),
            result: ResponseCode::Error,
            text: "error is error".into(),
        };
        assert_eq!(
            err.to_string(),
            "reservation-add command to dhcp4 failed: non-success response result from Kea: 1, text: error is error"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn classifies_result_codes() {
        let unsupported = Error::CommandFailed {
            command: "lease4-get-by-state".into(),
            daemon: "dhcp4".into(),
            result: ResponseCode::Unsupported,
            text: String::new(),
        };
        assert!(unsupported.is_unsupported());
        assert!(!unsupported.is_not_found());

        let empty = Error::CommandFailed {
            command: "lease4-get".into(),
            daemon: "dhcp4".into(),
            result: ResponseCode::Empty,
            text: "0 IPv4 lease(s) found.".into(),
        };
        assert!(empty.is_not_found());
    }
}
