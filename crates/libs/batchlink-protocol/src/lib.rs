//! # batchlink-protocol
//!
//! Messages exchanged between a batchlink client and the service, and the
//! byte framing they travel in.
//!
//! ## Wire format
//!
//! ```text
//! [length:4][payload:length]
//!  u32 BE    msgpack map { "kind": <discriminator>, "seq": <n>, ...fields }
//! ```
//!
//! Client-originated messages carry `seq`, a per-connection counter shared by
//! every client message kind and starting at 1. Service messages carry none.
//! Every payload is verified against the schema of its kind before it is
//! turned into a typed message.
//!
//! ## Example
//!
//! ```rust
//! use batchlink_protocol::{Batch, ClientMessage};
//!
//! let msg = ClientMessage::Batch { seq: 1, batch: Batch::new(7, 42, vec![1, 2, 3]) };
//! let payload = msg.encode().unwrap();
//! assert_eq!(ClientMessage::decode(&payload).unwrap(), msg);
//! ```

pub mod error;
pub mod frame;
pub mod message;
pub mod sequence;
pub mod types;

mod schemas;

pub use error::ProtocolError;
pub use frame::{FrameCodec, MAX_FRAME_LEN};
pub use message::{ClientMessage, MessageKind, ServiceMessage};
pub use sequence::SequenceCounter;
pub use types::{Batch, ErrorReport, Lambda, LogEntry, LogLevel};
