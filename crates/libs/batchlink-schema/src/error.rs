/// Errors from converting [`Value`](crate::Value) trees to and from MessagePack.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmpv::decode::Error),

    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmpv::encode::Error),

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("map key is not text: {0}")]
    NonTextKey(String),

    #[error("text is not valid utf-8")]
    InvalidUtf8,

    #[error("unsupported msgpack type: {0}")]
    Unsupported(&'static str),

    #[error("integer out of msgpack range: {0}")]
    IntegerOutOfRange(i128),
}

/// Errors raised while assembling a [`Schema`](crate::Schema).
///
/// These are programming errors: a schema that fails to build is never used to
/// verify anything.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchemaBuildError {
    #[error("duplicate requirement: {0}")]
    DuplicateRequirement(String),

    #[error("reserved requirement name: {0}")]
    ReservedName(String),

    #[error("duplicate schema for element {0}")]
    DuplicateElement(usize),

    #[error("duplicate schema for entry {0:?}")]
    DuplicateEntry(String),

    #[error("default schema already set")]
    DefaultAlreadySet,

    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("{constraint} does not apply to {kind} schemas")]
    NotApplicable { constraint: &'static str, kind: &'static str },
}
