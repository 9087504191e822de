//! The connection engine.
//!
//! A [`Connection`] owns one driver task. The driver runs the poll and
//! refresh duties in a single `tokio::select!` loop and is the only code that
//! touches the socket; host threads talk to it through an outbound queue, the
//! event feeds and a cancellation token.

mod driver;
mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use batchlink_protocol::{Batch, ClientMessage, ErrorReport, Lambda, LogEntry, SequenceCounter};
use tokio::runtime::{Builder, Handle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::contract::Client;
use crate::error::ClientError;
use crate::feed::{EventFeed, StatusFeed, Subscription};
use crate::status::ClientStatus;

use driver::Driver;
use session::Session;

/// State shared between the host-facing handle and the driver task.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    sequence: SequenceCounter,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    pub(crate) batches: EventFeed<Batch>,
    pub(crate) errors: EventFeed<ClientError>,
    pub(crate) lambdas: EventFeed<Lambda>,
    pub(crate) status: StatusFeed,
    closing: AtomicBool,
    pub(crate) cancel: CancellationToken,
    pub(crate) finished: CancellationToken,
}

impl Shared {
    /// Stamp the next sequence number and queue the message for the driver.
    ///
    /// Stamping and queueing are separate steps, so concurrent submitters may
    /// reach the wire out of sequence order. Messages from one thread keep
    /// their order.
    pub(crate) fn enqueue(&self, build: impl FnOnce(u64) -> ClientMessage) -> u64 {
        let seq = self.sequence.next();
        let message = build(seq);
        let kind = message.kind();
        if self.outbound.send(message).is_err() {
            log::debug!("client({}): dropping {kind} seq={seq} after close", self.config.service_addr);
        }
        seq
    }

    /// Enter the close path. Returns true only for the first caller.
    pub(crate) fn begin_close(&self) -> bool {
        self.closing.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub(crate) fn label(&self) -> &str {
        &self.config.service_addr
    }
}

/// A self-healing client connection to the distribution service.
///
/// Dropping the connection closes it.
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Connect with a scheduler owned by the connection: a current-thread
    /// runtime on a dedicated thread that exits after teardown.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| ClientError::Scheduler { message: err.to_string() })?;
        let (connection, driver) = Self::prepare(config);
        std::thread::Builder::new()
            .name(format!("batchlink-client({})", connection.shared.label()))
            .spawn(move || runtime.block_on(driver.run()))
            .map_err(|err| ClientError::Scheduler { message: err.to_string() })?;
        Ok(connection)
    }

    /// Connect using a scheduler supplied by the host. The engine spawns its
    /// driver there and never shuts the runtime down.
    pub fn connect_on(config: ClientConfig, handle: &Handle) -> Result<Self, ClientError> {
        config.validate()?;
        let (connection, driver) = Self::prepare(config);
        handle.spawn(driver.run());
        Ok(connection)
    }

    fn prepare(config: ClientConfig) -> (Self, Driver) {
        let (outbound, queue) = mpsc::unbounded_channel();
        let capacity = config.feed_capacity;
        let session = Session::new(&config, queue);
        let shared = Arc::new(Shared {
            config,
            sequence: SequenceCounter::new(),
            outbound,
            batches: EventFeed::new(capacity),
            errors: EventFeed::new(capacity),
            lambdas: EventFeed::new(capacity),
            status: StatusFeed::new(ClientStatus::Connecting, capacity),
            closing: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        });
        log::debug!("client({}): starting", shared.label());
        let driver = Driver::new(shared.clone(), session);
        (Self { shared }, driver)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Sequence number of the last message queued, 0 if none.
    pub fn last_seq(&self) -> u64 {
        self.shared.sequence.last()
    }

    /// Resolves once teardown has finished and every feed is complete.
    pub async fn closed(&self) {
        self.shared.finished.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.shared.finished.is_cancelled()
    }
}

impl Client for Connection {
    fn submit_batch(&self, batch: Batch) {
        self.shared.enqueue(|seq| ClientMessage::Batch { seq, batch });
    }

    fn submit_error(&self, error: ErrorReport) {
        self.shared.enqueue(|seq| ClientMessage::Error { seq, error });
    }

    fn submit_log_entry(&self, entry: LogEntry) {
        self.shared.enqueue(|seq| ClientMessage::LogEntry { seq, entry });
    }

    fn on_batch(&self) -> Subscription<Batch> {
        self.shared.batches.subscribe()
    }

    fn on_error(&self) -> Subscription<ClientError> {
        self.shared.errors.subscribe()
    }

    fn on_lambda(&self) -> Subscription<Lambda> {
        self.shared.lambdas.subscribe()
    }

    fn on_status(&self) -> Subscription<ClientStatus> {
        self.shared.status.subscribe()
    }

    fn status(&self) -> ClientStatus {
        self.shared.status.latest()
    }

    fn close(&self) {
        if self.shared.begin_close() {
            log::debug!("client({}): close requested", self.shared.label());
            self.shared.cancel.cancel();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submissions_take_consecutive_sequence_numbers() {
        let (connection, _driver) = Connection::prepare(ClientConfig::new("127.0.0.1:9"));
        connection.submit_batch(Batch::new(1, 1, vec![1]));
        connection.submit_error(ErrorReport::new(1, Some(1), "boom"));
        connection.submit_log_entry(LogEntry::new(1, None, batchlink_protocol::LogLevel::Info, "hi"));
        assert_eq!(connection.last_seq(), 3);
        assert_eq!(connection.shared.enqueue(|seq| ClientMessage::ImAlive { seq }), 4);
    }

    #[test]
    fn close_gate_admits_one_caller() {
        let (connection, _driver) = Connection::prepare(ClientConfig::new("127.0.0.1:9"));
        connection.close();
        assert!(connection.shared.cancel.is_cancelled());
        assert!(!connection.shared.begin_close());
        connection.close();
        assert_eq!(connection.status(), ClientStatus::Connecting);
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let err = Connection::connect(ClientConfig::default()).err().expect("empty address");
        assert!(matches!(err, ClientError::InvalidConfig { .. }));

        let mut config = ClientConfig::new("127.0.0.1:9");
        config.set_feed_capacity(usize::MAX);
        let err = Connection::connect(config).err().expect("oversized feeds");
        assert!(matches!(err, ClientError::InvalidConfig { .. }));
    }
}
