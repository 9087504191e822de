use std::fmt;

/// Lifecycle of a client connection.
///
/// `Connecting` is the initial state. `Disrupted` and `Terminated` are
/// terminal and always followed by teardown; `Disconnected` is published when
/// the host closes a session that had not already ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientStatus {
    Connecting,
    Connected,
    Disconnected,
    /// Ended by a deadline expiry or an I/O failure.
    Disrupted,
    /// Ended by the service sending Exit.
    Terminated,
}

impl ClientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Disrupted => "disrupted",
            Self::Terminated => "terminated",
        }
    }

    /// True once the session has ended on its own, without a host close.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disrupted | Self::Terminated)
    }

    /// True for every state after which no traffic flows.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Disconnected | Self::Disrupted | Self::Terminated)
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
