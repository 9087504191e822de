//! Client side of the batchlink distribution protocol.
//!
//! A [`Connection`] keeps a single TCP session to the service alive: it
//! drives the non-blocking connect, dispatches inbound batches and lambdas to
//! subscribers, flushes submitted messages in order, sends heartbeats at nine
//! tenths of the configured timeout and declares the session disrupted when the
//! service stays silent past the deadline.
//!
//! ```no_run
//! use batchlink_client::{Client, ClientConfig, Connection};
//! use batchlink_protocol::{Batch, LogEntry, LogLevel};
//!
//! # async fn run() -> Result<(), batchlink_client::ClientError> {
//! let config = ClientConfig::new("127.0.0.1:7400");
//! let client = Connection::connect_on(config, &tokio::runtime::Handle::current())?;
//!
//! let mut lambdas = client.on_lambda();
//! while let Some(lambda) = lambdas.recv().await {
//!     client.submit_log_entry(LogEntry::new(lambda.lambda_id, None, LogLevel::Info, "loaded"));
//!     client.submit_batch(Batch::new(lambda.lambda_id, 1, b"result".to_vec()));
//! }
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod contract;
pub mod error;
pub mod feed;
pub mod status;

mod engine;

pub use config::{ClientConfig, MAX_FEED_CAPACITY};
pub use contract::Client;
pub use engine::Connection;
pub use error::{ClientError, ConfigError};
pub use feed::{EventFeed, StatusFeed, Subscription};
pub use status::ClientStatus;
