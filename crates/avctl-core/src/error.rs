//! Error taxonomy shared by every layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ChannelKind, ChannelName};

/// Failure of a single leaf operation.
///
/// Delivered as data to the per-command completion, never raised as a
/// fault. Serializable so outcome sets can cross the JSON-RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ControlError {
    /// Open, write or socket failure.
    #[error("{channel}: connection error: {detail}")]
    Connection { channel: ChannelName, detail: String },

    /// No matching response within the configured window.
    #[error("{channel}: no response to {command:?} within {window_ms}ms")]
    Timeout {
        channel: ChannelName,
        command: String,
        window_ms: u64,
    },

    /// Response matched neither expected pattern.
    #[error("{channel}: unexpected response {response:?}")]
    ProtocolMismatch {
        channel: ChannelName,
        response: String,
    },

    /// Reference to an undeclared channel.
    #[error("{channel}: no such {kind} channel")]
    Configuration {
        channel: ChannelName,
        kind: ChannelKind,
    },
}

impl ControlError {
    pub fn channel(&self) -> &ChannelName {
        match self {
            ControlError::Connection { channel, .. }
            | ControlError::Timeout { channel, .. }
            | ControlError::ProtocolMismatch { channel, .. }
            | ControlError::Configuration { channel, .. } => channel,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ControlError::Timeout { .. })
    }

    /// The device answered, but not in a recognised way.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, ControlError::ProtocolMismatch { .. })
    }
}

/// Configuration load or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("channel {0:?} is declared more than once")]
    DuplicateChannel(String),

    #[error("{context}: unknown channel {channel:?}")]
    UnknownChannel { context: String, channel: String },

    #[error("{context}: channel {channel:?} is a {actual} channel, expected {expected}")]
    WrongKind {
        context: String,
        channel: String,
        expected: ChannelKind,
        actual: ChannelKind,
    },

    #[error("{context}: {detail}")]
    Invalid { context: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_carries_command_and_window() {
        let err = ControlError::Timeout {
            channel: ChannelName::new("receiver"),
            command: "PW?\r".into(),
            window_ms: 50,
        };
        let msg = err.to_string();
        assert!(msg.contains("receiver"), "msg was: {msg}");
        assert!(msg.contains("50ms"), "msg was: {msg}");
        assert!(msg.contains("PW?\\r"), "msg was: {msg}");
        assert!(err.is_timeout());
    }

    #[test]
    fn control_error_serializes_with_error_tag() {
        let err = ControlError::Configuration {
            channel: ChannelName::new("ghost"),
            kind: ChannelKind::Pulse,
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"], "configuration");
        assert_eq!(value["kind"], "pulse");
        assert_eq!(value["channel"], "ghost");
        let back: ControlError = serde_json::from_value(value).unwrap();
        assert_eq!(back, err);
    }
}
