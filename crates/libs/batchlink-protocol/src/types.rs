//! Payload types carried by protocol messages.

use std::fmt;

/// A unit of work: opaque bytes routed to one lambda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Lambda that produces or consumes this batch.
    pub lambda_id: i64,
    /// Unique id of this batch instance.
    pub batch_id: i64,
    pub data: Vec<u8>,
}

impl Batch {
    pub fn new(lambda_id: i64, batch_id: i64, data: Vec<u8>) -> Self {
        Self { lambda_id, batch_id, data }
    }
}

/// A failure raised while running a lambda, reported to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub lambda_id: i64,
    /// Batch being processed when the failure happened, if any.
    pub batch_id: Option<i64>,
    pub message: String,
}

impl ErrorReport {
    pub fn new(lambda_id: i64, batch_id: Option<i64>, message: impl Into<String>) -> Self {
        Self { lambda_id, batch_id, message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [Self::Trace, Self::Debug, Self::Info, Self::Warn, Self::Error];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == raw)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log line produced by a running lambda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub lambda_id: i64,
    pub batch_id: Option<i64>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(
        lambda_id: i64,
        batch_id: Option<i64>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self { lambda_id, batch_id, level, message: message.into() }
    }
}

/// A program handed to the client's sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lambda {
    pub lambda_id: i64,
    pub program: Vec<u8>,
}

impl Lambda {
    pub fn new(lambda_id: i64, program: Vec<u8>) -> Self {
        Self { lambda_id, program }
    }
}
