use batchlink_schema::{CodecError, Violation};

use crate::frame::MAX_FRAME_LEN;
use crate::message::MessageKind;

/// Errors from framing and decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("payload is not a valid value: {0}")]
    Codec(#[from] CodecError),

    #[error("message has no kind discriminator")]
    MissingKind,

    #[error("unknown message kind: {0:?}")]
    UnknownKind(String),

    #[error("unexpected {kind} message")]
    Unexpected { kind: MessageKind },

    #[error("message violates schema: {}", join_violations(.0))]
    Violations(Vec<Violation>),

    #[error("field {0} missing or mistyped")]
    Field(&'static str),

    #[error("frame of {0} bytes exceeds limit of {MAX_FRAME_LEN}")]
    FrameTooLarge(usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Errors after which the byte stream can no longer be split into frames.
    pub fn breaks_framing(&self) -> bool {
        matches!(self, Self::FrameTooLarge(_) | Self::Io(_))
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
