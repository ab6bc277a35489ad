// ── Kea control channel wire types ──
//
// A command is `{command, service, arguments}`; a response is
// `{result, text, arguments}`. The control agent answers a forwarded
// command with a JSON array holding one response per addressed service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result code carried by every Kea response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ResponseCode {
    Success,
    Error,
    Unsupported,
    Empty,
    Conflict,
    Other(i64),
}

impl ResponseCode {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::Unsupported => 2,
            Self::Empty => 3,
            Self::Conflict => 4,
            Self::Other(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<i64> for ResponseCode {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Error,
            2 => Self::Unsupported,
            3 => Self::Empty,
            4 => Self::Conflict,
            other => Self::Other(other),
        }
    }
}

impl From<ResponseCode> for i64 {
    fn from(code: ResponseCode) -> Self {
        code.as_i64()
    }
}

/// A single command addressed to one or more Kea services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeaCommand {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl KeaCommand {
    /// Create a command addressed to a single service (`dhcp4`, `dhcp6`, …).
    pub fn new(command: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            service: vec![service.into()],
            arguments: None,
        }
    }

    /// Create a command handled by the control agent itself.
    pub fn for_agent(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            service: Vec::new(),
            arguments: None,
        }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// Convenience for building `arguments` from a JSON object map.
    pub fn with_argument_map(self, arguments: Map<String, Value>) -> Self {
        self.with_arguments(Value::Object(arguments))
    }

    /// The first addressed service, or `"ca"` for agent-local commands.
    pub fn target(&self) -> &str {
        self.service.first().map_or("ca", String::as_str)
    }
}

/// A single response from a Kea daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeaResponse {
    pub result: ResponseCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl KeaResponse {
    pub fn success(arguments: Option<Value>) -> Self {
        Self {
            result: ResponseCode::Success,
            text: None,
            arguments,
        }
    }

    /// A response carrying a non-success code and the server's text.
    pub fn failure(result: ResponseCode, text: impl Into<String>) -> Self {
        Self {
            result,
            text: Some(text.into()),
            arguments: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// Turn a non-success response into a `CommandFailed` error.
    pub fn check(self, command: &str, daemon: &str) -> Result<Self, crate::Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(crate::Error::CommandFailed {
                command: command.to_owned(),
                daemon: daemon.to_owned(),
                result: self.result,
                text: self.text.unwrap_or_default(),
            })
        }
    }

    /// Deserialize the `arguments` object into a typed value.
    pub fn arguments_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, crate::Error> {
        let args = self.arguments.clone().unwrap_or(Value::Null);
        serde_json::from_value(args.clone()).map_err(|e| crate::Error::Deserialization {
            message: e.to_string(),
            body: args.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_command_without_empty_fields() {
        let cmd = KeaCommand::new("config-write", "dhcp4");
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"command": "config-write", "service": ["dhcp4"]})
        );

        let cmd = KeaCommand::new("subnet4-del", "dhcp4").with_arguments(json!({"id": 7}));
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"command": "subnet4-del", "service": ["dhcp4"], "arguments": {"id": 7}})
        );
    }

    #[test]
    fn response_code_round_trips_unknown_values() {
        let resp: KeaResponse = serde_json::from_value(json!({"result": 42})).unwrap();
        assert_eq!(resp.result, ResponseCode::Other(42));
        assert_eq!(serde_json::to_value(resp.result).unwrap(), json!(42));
    }

    #[test]
    fn check_wraps_failure_text() {
        let resp: KeaResponse =
            serde_json::from_value(json!({"result": 1, "text": "bad subnet"})).unwrap();
        let err = resp.check("subnet4-add", "dhcp4").unwrap_err();
        assert!(err.to_string().contains("subnet4-add command to dhcp4 failed"));
        assert!(err.to_string().ends_with("1, text: bad subnet"));
    }

    #[test]
    fn agent_commands_target_the_agent() {
        assert_eq!(KeaCommand::for_agent("version-get").target(), "ca");
        assert_eq!(KeaCommand::new("version-get", "dhcp6").target(), "dhcp6");
    }
}
