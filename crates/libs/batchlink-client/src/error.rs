use std::io;
use std::time::Duration;

use batchlink_protocol::{MessageKind, ProtocolError};
use batchlink_schema::Violation;

/// Errors surfaced by a client connection.
///
/// Fatal errors end the session with [`ClientStatus::Disrupted`](crate::ClientStatus);
/// the rest describe one bad frame and the session carries on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("nothing received from the service for {timeout:?}")]
    ConnectionTimeout { timeout: Duration },

    #[error("socket {operation} failed: {message}")]
    SocketIo { operation: &'static str, message: String },

    #[error("failed to decode inbound message: {message}")]
    ProtocolDecode { message: String },

    #[error("failed to encode outbound {kind} message: {message}")]
    ProtocolEncode { kind: MessageKind, message: String },

    #[error("inbound message violates schema: {}", join_violations(.violations))]
    SchemaViolation { violations: Vec<Violation> },

    #[error("unexpected {kind} message from the service")]
    UnexpectedMessage { kind: MessageKind },

    #[error("invalid client config: {message}")]
    InvalidConfig { message: String },

    #[error("scheduler error: {message}")]
    Scheduler { message: String },
}

impl ClientError {
    /// True if the error ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. } | Self::SocketIo { .. })
    }

    pub(crate) fn io(operation: &'static str, err: io::Error) -> Self {
        Self::SocketIo { operation, message: err.to_string() }
    }

    pub(crate) fn peer_closed() -> Self {
        Self::SocketIo { operation: "read", message: "connection closed by peer".into() }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Violations(violations) => Self::SchemaViolation { violations },
            ProtocolError::Unexpected { kind } => Self::UnexpectedMessage { kind },
            ProtocolError::FrameTooLarge(len) => Self::SocketIo {
                operation: "frame",
                message: format!("frame of {len} bytes exceeds the frame limit"),
            },
            ProtocolError::Io(err) => Self::io("read", err),
            other => Self::ProtocolDecode { message: other.to_string() },
        }
    }
}

/// Errors from loading or validating a [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig { message: err.to_string() }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchlink_schema::Value;

    #[test]
    fn classifies_fatal_errors() {
        assert!(ClientError::ConnectionTimeout { timeout: Duration::from_secs(1) }.is_fatal());
        assert!(ClientError::peer_closed().is_fatal());
        assert!(!ClientError::ProtocolDecode { message: "bad".into() }.is_fatal());
        assert!(!ClientError::UnexpectedMessage { kind: MessageKind::Error }.is_fatal());
    }

    #[test]
    fn protocol_errors_map_onto_client_taxonomy() {
        let violation = Violation::new("seq", "minimum", Value::from(1));
        let err = ClientError::from(ProtocolError::Violations(vec![violation.clone()]));
        assert_eq!(err, ClientError::SchemaViolation { violations: vec![violation] });

        let err = ClientError::from(ProtocolError::Unexpected { kind: MessageKind::LogEntry });
        assert_eq!(err, ClientError::UnexpectedMessage { kind: MessageKind::LogEntry });

        let err = ClientError::from(ProtocolError::UnknownKind("reboot".into()));
        assert!(matches!(err, ClientError::ProtocolDecode { .. }));

        assert!(ClientError::from(ProtocolError::FrameTooLarge(usize::MAX)).is_fatal());
    }

    #[test]
    fn display_includes_violations() {
        let err = ClientError::SchemaViolation {
            violations: vec![Violation::new("age", "minimum", Value::from(10))],
        };
        assert_eq!(err.to_string(), "inbound message violates schema: age: minimum=10");
    }
}
