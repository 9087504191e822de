//! Client and service messages and their value/byte encodings.

use std::collections::BTreeMap;
use std::fmt;

use batchlink_schema::{codec, Schema, Value};

use crate::error::ProtocolError;
use crate::frame::{FrameCodec, HEADER_LEN};
use crate::schemas;
use crate::types::{Batch, ErrorReport, Lambda, LogEntry, LogLevel};

/// Discriminator stored under `"kind"` in every message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    Batch,
    Error,
    LogEntry,
    ImAlive,
    Exit,
    Lambda,
}

impl MessageKind {
    const ALL: [MessageKind; 6] =
        [Self::Batch, Self::Error, Self::LogEntry, Self::ImAlive, Self::Exit, Self::Lambda];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Error => "error",
            Self::LogEntry => "log_entry",
            Self::ImAlive => "im_alive",
            Self::Exit => "exit",
            Self::Lambda => "lambda",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Batch { seq: u64, batch: Batch },
    Error { seq: u64, error: ErrorReport },
    LogEntry { seq: u64, entry: LogEntry },
    ImAlive { seq: u64 },
    Exit { seq: u64 },
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Batch { .. } => MessageKind::Batch,
            Self::Error { .. } => MessageKind::Error,
            Self::LogEntry { .. } => MessageKind::LogEntry,
            Self::ImAlive { .. } => MessageKind::ImAlive,
            Self::Exit { .. } => MessageKind::Exit,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            Self::Batch { seq, .. }
            | Self::Error { seq, .. }
            | Self::LogEntry { seq, .. }
            | Self::ImAlive { seq }
            | Self::Exit { seq } => *seq,
        }
    }

    /// Schema a client message of `kind` is verified against, if the client
    /// may send that kind at all.
    pub fn schema(kind: MessageKind) -> Option<&'static Schema> {
        schemas::client_schema(kind)
    }

    pub fn to_value(&self) -> Value {
        let mut fields = Fields::new(self.kind());
        fields.put("seq", self.seq());
        match self {
            Self::Batch { batch, .. } => fields.put_batch(batch),
            Self::Error { error, .. } => {
                fields.put("lambda_id", error.lambda_id);
                fields.put_opt("batch_id", error.batch_id);
                fields.put("message", error.message.as_str());
            }
            Self::LogEntry { entry, .. } => {
                fields.put("lambda_id", entry.lambda_id);
                fields.put_opt("batch_id", entry.batch_id);
                fields.put("level", entry.level.as_str());
                fields.put("message", entry.message.as_str());
            }
            Self::ImAlive { .. } | Self::Exit { .. } => {}
        }
        fields.into_value()
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let kind = kind_of(&value)?;
        let schema = Self::schema(kind).ok_or(ProtocolError::Unexpected { kind })?;
        let mut fields = verified_fields(schema, value)?;
        let seq = fields.u64("seq")?;
        Ok(match kind {
            MessageKind::Batch => Self::Batch { seq, batch: fields.batch()? },
            MessageKind::Error => Self::Error {
                seq,
                error: ErrorReport {
                    lambda_id: fields.i64("lambda_id")?,
                    batch_id: fields.opt_i64("batch_id")?,
                    message: fields.text("message")?,
                },
            },
            MessageKind::LogEntry => Self::LogEntry {
                seq,
                entry: LogEntry {
                    lambda_id: fields.i64("lambda_id")?,
                    batch_id: fields.opt_i64("batch_id")?,
                    level: LogLevel::from_wire(&fields.text("level")?)
                        .ok_or(ProtocolError::Field("level"))?,
                    message: fields.text("message")?,
                },
            },
            MessageKind::ImAlive => Self::ImAlive { seq },
            MessageKind::Exit => Self::Exit { seq },
            MessageKind::Lambda => return Err(ProtocolError::Unexpected { kind }),
        })
    }

    /// Encode to a msgpack payload (no length prefix).
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(codec::encode(&self.to_value())?)
    }

    /// Decode and verify a msgpack payload (no length prefix).
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        Self::from_value(codec::decode(payload)?)
    }

    /// Encode to a complete length-prefixed frame.
    pub fn to_frame(&self) -> Result<Vec<u8>, ProtocolError> {
        frame_value(&self.to_value())
    }
}

/// Messages sent by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMessage {
    Batch(Batch),
    Lambda(Lambda),
    ImAlive,
    Exit,
}

impl ServiceMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Batch(_) => MessageKind::Batch,
            Self::Lambda(_) => MessageKind::Lambda,
            Self::ImAlive => MessageKind::ImAlive,
            Self::Exit => MessageKind::Exit,
        }
    }

    pub fn schema(kind: MessageKind) -> Option<&'static Schema> {
        schemas::service_schema(kind)
    }

    pub fn to_value(&self) -> Value {
        let mut fields = Fields::new(self.kind());
        match self {
            Self::Batch(batch) => fields.put_batch(batch),
            Self::Lambda(lambda) => {
                fields.put("lambda_id", lambda.lambda_id);
                fields.put("program", lambda.program.clone());
            }
            Self::ImAlive | Self::Exit => {}
        }
        fields.into_value()
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let kind = kind_of(&value)?;
        let schema = Self::schema(kind).ok_or(ProtocolError::Unexpected { kind })?;
        let mut fields = verified_fields(schema, value)?;
        Ok(match kind {
            MessageKind::Batch => Self::Batch(fields.batch()?),
            MessageKind::Lambda => Self::Lambda(Lambda {
                lambda_id: fields.i64("lambda_id")?,
                program: fields.blob("program")?,
            }),
            MessageKind::ImAlive => Self::ImAlive,
            MessageKind::Exit => Self::Exit,
            MessageKind::Error | MessageKind::LogEntry => {
                return Err(ProtocolError::Unexpected { kind })
            }
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(codec::encode(&self.to_value())?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        Self::from_value(codec::decode(payload)?)
    }

    pub fn to_frame(&self) -> Result<Vec<u8>, ProtocolError> {
        frame_value(&self.to_value())
    }
}

fn frame_value(value: &Value) -> Result<Vec<u8>, ProtocolError> {
    // Reserve the length prefix and encode straight into the frame buffer.
    let mut framed = Vec::with_capacity(128);
    framed.extend_from_slice(&[0u8; HEADER_LEN]);
    codec::encode_into(value, &mut framed)?;
    let payload_len = framed.len() - HEADER_LEN;
    let header = FrameCodec::new().header(payload_len)?;
    framed[..HEADER_LEN].copy_from_slice(&header);
    Ok(framed)
}

fn kind_of(value: &Value) -> Result<MessageKind, ProtocolError> {
    let raw = value.get("kind").and_then(Value::as_str).ok_or(ProtocolError::MissingKind)?;
    MessageKind::from_wire(raw).ok_or_else(|| ProtocolError::UnknownKind(raw.to_owned()))
}

fn verified_fields(schema: &Schema, value: Value) -> Result<Fields, ProtocolError> {
    let value = schema.verify(value).map_err(ProtocolError::Violations)?;
    let entries = value.into_map().ok_or(ProtocolError::MissingKind)?;
    Ok(Fields { entries })
}

/// Map under construction or being taken apart.
struct Fields {
    entries: BTreeMap<String, Value>,
}

impl Fields {
    fn new(kind: MessageKind) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("kind".to_owned(), Value::from(kind.as_str()));
        Self { entries }
    }

    fn put(&mut self, key: &str, value: impl Into<Value>) {
        self.entries.insert(key.to_owned(), value.into());
    }

    fn put_opt(&mut self, key: &str, value: Option<i64>) {
        if let Some(value) = value {
            self.put(key, value);
        }
    }

    fn put_batch(&mut self, batch: &Batch) {
        self.put("lambda_id", batch.lambda_id);
        self.put("batch_id", batch.batch_id);
        self.put("data", batch.data.clone());
    }

    fn into_value(self) -> Value {
        Value::Map(self.entries)
    }

    fn u64(&self, key: &'static str) -> Result<u64, ProtocolError> {
        self.entries
            .get(key)
            .and_then(Value::as_number)
            .and_then(|n| n.as_u64())
            .ok_or(ProtocolError::Field(key))
    }

    fn i64(&self, key: &'static str) -> Result<i64, ProtocolError> {
        self.entries.get(key).and_then(Value::as_i64).ok_or(ProtocolError::Field(key))
    }

    fn opt_i64(&self, key: &'static str) -> Result<Option<i64>, ProtocolError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or(ProtocolError::Field(key)),
        }
    }

    fn text(&mut self, key: &'static str) -> Result<String, ProtocolError> {
        self.entries.remove(key).and_then(Value::into_string).ok_or(ProtocolError::Field(key))
    }

    fn blob(&mut self, key: &'static str) -> Result<Vec<u8>, ProtocolError> {
        self.entries.remove(key).and_then(Value::into_bytes).ok_or(ProtocolError::Field(key))
    }

    fn batch(&mut self) -> Result<Batch, ProtocolError> {
        Ok(Batch {
            lambda_id: self.i64("lambda_id")?,
            batch_id: self.i64("batch_id")?,
            data: self.blob("data")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_messages() -> Vec<ClientMessage> {
        vec![
            ClientMessage::Batch { seq: 1, batch: Batch::new(3, 9, vec![1, 2, 3]) },
            ClientMessage::Error { seq: 2, error: ErrorReport::new(3, Some(9), "boom") },
            ClientMessage::Error { seq: 3, error: ErrorReport::new(3, None, "load failed") },
            ClientMessage::LogEntry {
                seq: 4,
                entry: LogEntry::new(3, Some(9), LogLevel::Warn, "slow batch"),
            },
            ClientMessage::ImAlive { seq: 5 },
            ClientMessage::Exit { seq: u64::MAX },
        ]
    }

    fn service_messages() -> Vec<ServiceMessage> {
        vec![
            ServiceMessage::Batch(Batch::new(-1, i64::MAX, Vec::new())),
            ServiceMessage::Lambda(Lambda::new(3, b"(fn [x] x)".to_vec())),
            ServiceMessage::ImAlive,
            ServiceMessage::Exit,
        ]
    }

    #[test]
    fn every_client_message_roundtrips() {
        for msg in client_messages() {
            let payload = msg.encode().expect("encode");
            assert_eq!(ClientMessage::decode(&payload).expect("decode"), msg);
        }
    }

    #[test]
    fn every_service_message_roundtrips() {
        for msg in service_messages() {
            let payload = msg.encode().expect("encode");
            assert_eq!(ServiceMessage::decode(&payload).expect("decode"), msg);
        }
    }

    #[test]
    fn payload_layout_is_a_kind_tagged_map() {
        let value = ClientMessage::ImAlive { seq: 4 }.to_value();
        assert_eq!(value, Value::map([("kind", Value::from("im_alive")), ("seq", Value::from(4))]));

        let value = ClientMessage::Error { seq: 1, error: ErrorReport::new(2, None, "x") }.to_value();
        assert!(value.get("batch_id").is_none());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let payload =
            codec::encode(&Value::map([("kind", Value::from("reboot"))])).expect("encode");
        assert!(matches!(
            ServiceMessage::decode(&payload),
            Err(ProtocolError::UnknownKind(kind)) if kind == "reboot"
        ));
    }

    #[test]
    fn missing_kind_is_rejected() {
        let payload = codec::encode(&Value::from(12)).expect("encode");
        assert!(matches!(ServiceMessage::decode(&payload), Err(ProtocolError::MissingKind)));
    }

    #[test]
    fn client_only_kind_from_service_is_unexpected() {
        let payload = ClientMessage::LogEntry {
            seq: 1,
            entry: LogEntry::new(1, None, LogLevel::Info, "hello"),
        }
        .encode()
        .expect("encode");
        assert!(matches!(
            ServiceMessage::decode(&payload),
            Err(ProtocolError::Unexpected { kind: MessageKind::LogEntry })
        ));
    }

    #[test]
    fn shape_errors_carry_every_violation() {
        let payload = codec::encode(&Value::map([
            ("kind", Value::from("batch")),
            ("lambda_id", Value::from("seven")),
            ("data", Value::from(vec![1u8])),
        ]))
        .expect("encode");
        let Err(ProtocolError::Violations(violations)) = ServiceMessage::decode(&payload) else {
            panic!("expected violations");
        };
        let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, ["batch_id", "lambda_id"]);
    }

    #[test]
    fn unknown_log_level_is_a_violation() {
        let payload = codec::encode(&Value::map([
            ("kind", Value::from("log_entry")),
            ("seq", Value::from(1)),
            ("lambda_id", Value::from(1)),
            ("level", Value::from("loud")),
            ("message", Value::from("x")),
        ]))
        .expect("encode");
        assert!(matches!(ClientMessage::decode(&payload), Err(ProtocolError::Violations(_))));
    }

    #[test]
    fn frame_prefixes_payload_length() {
        let msg = ServiceMessage::Lambda(Lambda::new(1, vec![0; 300]));
        let frame = msg.to_frame().expect("frame");
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&frame[..HEADER_LEN]);
        assert_eq!(u32::from_be_bytes(header) as usize + HEADER_LEN, frame.len());
        assert_eq!(&frame[HEADER_LEN..], msg.encode().expect("encode").as_slice());
    }
}
