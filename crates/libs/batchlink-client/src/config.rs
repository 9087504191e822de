//! Client configuration.
//!
//! Files are TOML with durations in milliseconds:
//!
//! ```toml
//! service_addr = "127.0.0.1:7400"
//! timeout_ms = 30000
//! poll_interval_ms = 250
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INITIAL_POLL_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_READINESS_WAIT: Duration = Duration::from_millis(10);
const DEFAULT_CLOSE_LINGER: Duration = Duration::from_millis(100);
const DEFAULT_FEED_CAPACITY: usize = 256;

/// Largest accepted `feed_capacity`. Feed slots are allocated up front.
pub const MAX_FEED_CAPACITY: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `host:port` of the distribution service.
    pub service_addr: String,
    /// Silence allowed before the session is declared disrupted.
    pub timeout: Duration,
    pub initial_poll_delay: Duration,
    pub poll_interval: Duration,
    /// Longest a poll pass waits for connect completion or readability.
    pub readiness_wait: Duration,
    /// Upper bound on the final flush and Exit notice during teardown.
    pub close_linger: Duration,
    /// Events buffered per subscriber before the slowest one starts skipping.
    pub feed_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_addr: String::new(),
            timeout: DEFAULT_TIMEOUT,
            initial_poll_delay: DEFAULT_INITIAL_POLL_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            readiness_wait: DEFAULT_READINESS_WAIT,
            close_linger: DEFAULT_CLOSE_LINGER,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn new(service_addr: impl Into<String>) -> Self {
        Self { service_addr: service_addr.into(), ..Self::default() }
    }

    /// Parse a TOML document. Omitted keys keep their defaults; the result is
    /// not validated so callers can still override fields.
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(input)?;
        Ok(file.into())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("service_addr must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }
        if self.readiness_wait >= self.poll_interval {
            return Err(ConfigError::Invalid(
                "readiness_wait must be shorter than poll_interval".into(),
            ));
        }
        if self.heartbeat_interval().is_zero() {
            return Err(ConfigError::Invalid("timeout too small to derive a heartbeat interval".into()));
        }
        if self.feed_capacity == 0 || self.feed_capacity > MAX_FEED_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "feed_capacity must be between 1 and {MAX_FEED_CAPACITY}"
            )));
        }
        Ok(())
    }

    /// Heartbeats go out at nine tenths of the timeout so one always lands
    /// before the peer's deadline.
    pub fn heartbeat_interval(&self) -> Duration {
        self.timeout * 9 / 10
    }

    pub fn set_service_addr(&mut self, service_addr: impl Into<String>) {
        self.service_addr = service_addr.into();
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_initial_poll_delay(&mut self, delay: Duration) {
        self.initial_poll_delay = delay;
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    pub fn set_readiness_wait(&mut self, wait: Duration) {
        self.readiness_wait = wait;
    }

    pub fn set_close_linger(&mut self, linger: Duration) {
        self.close_linger = linger;
    }

    pub fn set_feed_capacity(&mut self, capacity: usize) {
        self.feed_capacity = capacity;
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    service_addr: String,
    timeout_ms: u64,
    initial_poll_delay_ms: u64,
    poll_interval_ms: u64,
    readiness_wait_ms: u64,
    close_linger_ms: u64,
    feed_capacity: usize,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            service_addr: String::new(),
            timeout_ms: millis(DEFAULT_TIMEOUT),
            initial_poll_delay_ms: millis(DEFAULT_INITIAL_POLL_DELAY),
            poll_interval_ms: millis(DEFAULT_POLL_INTERVAL),
            readiness_wait_ms: millis(DEFAULT_READINESS_WAIT),
            close_linger_ms: millis(DEFAULT_CLOSE_LINGER),
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

impl From<ConfigFile> for ClientConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            service_addr: file.service_addr,
            timeout: Duration::from_millis(file.timeout_ms),
            initial_poll_delay: Duration::from_millis(file.initial_poll_delay_ms),
            poll_interval: Duration::from_millis(file.poll_interval_ms),
            readiness_wait: Duration::from_millis(file.readiness_wait_ms),
            close_linger: Duration::from_millis(file.close_linger_ms),
            feed_capacity: file.feed_capacity,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
