//! MessagePack encoding of [`Value`] trees.
//!
//! Maps are written with text keys in sorted order, integers in their most
//! compact msgpack form and floats as float64, so encoding a value is
//! deterministic.

use std::collections::BTreeMap;

use rmpv::Value as MsgValue;

use crate::error::CodecError;
use crate::value::{Number, Value};

/// Encode a value to msgpack bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(64);
    encode_into(value, &mut buf)?;
    Ok(buf)
}

/// Encode a value, appending to `buf`.
pub fn encode_into(value: &Value, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    let msg = to_msgpack(value)?;
    rmpv::encode::write_value(buf, &msg)?;
    Ok(())
}

/// Decode exactly one value from `bytes`. Trailing bytes are an error.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let mut cursor = bytes;
    let msg = rmpv::decode::read_value(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(CodecError::TrailingBytes(cursor.len()));
    }
    from_msgpack(msg)
}

pub fn to_msgpack(value: &Value) -> Result<MsgValue, CodecError> {
    Ok(match value {
        Value::Null => MsgValue::Nil,
        Value::Boolean(b) => MsgValue::Boolean(*b),
        Value::Number(Number::Integer(n)) => integer_to_msgpack(*n)?,
        Value::Number(Number::Float(f)) => MsgValue::F64(*f),
        Value::Text(s) => MsgValue::String(s.clone().into()),
        Value::Blob(b) => MsgValue::Binary(b.clone()),
        Value::List(items) => {
            MsgValue::Array(items.iter().map(to_msgpack).collect::<Result<_, _>>()?)
        }
        Value::Map(entries) => MsgValue::Map(
            entries
                .iter()
                .map(|(key, value)| Ok((MsgValue::String(key.clone().into()), to_msgpack(value)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
    })
}

pub fn from_msgpack(msg: MsgValue) -> Result<Value, CodecError> {
    Ok(match msg {
        MsgValue::Nil => Value::Null,
        MsgValue::Boolean(b) => Value::Boolean(b),
        MsgValue::Integer(n) => match (n.as_i64(), n.as_u64()) {
            (Some(signed), _) => Value::Number(Number::Integer(i128::from(signed))),
            (None, Some(unsigned)) => Value::Number(Number::Integer(i128::from(unsigned))),
            (None, None) => return Err(CodecError::Unsupported("integer")),
        },
        MsgValue::F32(f) => Value::Number(Number::Float(f64::from(f))),
        MsgValue::F64(f) => Value::Number(Number::Float(f)),
        MsgValue::String(s) => Value::Text(s.into_str().ok_or(CodecError::InvalidUtf8)?),
        MsgValue::Binary(b) => Value::Blob(b),
        MsgValue::Array(items) => {
            Value::List(items.into_iter().map(from_msgpack).collect::<Result<_, _>>()?)
        }
        MsgValue::Map(pairs) => {
            let mut entries = BTreeMap::new();
            for (key, value) in pairs {
                let key = match key {
                    MsgValue::String(s) => s.into_str().ok_or(CodecError::InvalidUtf8)?,
                    other => return Err(CodecError::NonTextKey(other.to_string())),
                };
                entries.insert(key, from_msgpack(value)?);
            }
            Value::Map(entries)
        }
        MsgValue::Ext(_, _) => return Err(CodecError::Unsupported("ext")),
    })
}

fn integer_to_msgpack(n: i128) -> Result<MsgValue, CodecError> {
    if n < 0 {
        let signed = i64::try_from(n).map_err(|_| CodecError::IntegerOutOfRange(n))?;
        Ok(MsgValue::from(signed))
    } else {
        let unsigned = u64::try_from(n).map_err(|_| CodecError::IntegerOutOfRange(n))?;
        Ok(MsgValue::from(unsigned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_value_roundtrips() {
        let value = Value::map([
            ("kind", Value::from("batch")),
            ("seq", Value::from(u64::MAX)),
            ("delta", Value::from(-42)),
            ("ratio", Value::from(0.25)),
            ("data", Value::from(vec![0u8, 1, 2, 255])),
            ("tags", Value::list([Value::Null, Value::from(true)])),
        ]);
        let bytes = encode(&value).expect("encode");
        assert_eq!(decode(&bytes).expect("decode"), value);
    }

    #[test]
    fn small_integers_use_fixint() {
        assert_eq!(encode(&Value::from(7)).expect("encode"), vec![0x07]);
        assert_eq!(encode(&Value::from(-1)).expect("encode"), vec![0xff]);
    }

    #[test]
    fn rejects_trailing_bytes() {
        let err = decode(&[0xc0, 0xc0]).expect_err("two values");
        assert!(matches!(err, CodecError::TrailingBytes(1)));
    }

    #[test]
    fn rejects_truncated_input() {
        // fixstr of length 5 with only two bytes present
        let err = decode(&[0xa5, b'a', b'b']).expect_err("truncated");
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn rejects_non_text_keys() {
        let msg = MsgValue::Map(vec![(MsgValue::from(1), MsgValue::Nil)]);
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &msg).expect("write");
        assert!(matches!(decode(&bytes), Err(CodecError::NonTextKey(_))));
    }

    #[test]
    fn rejects_integers_beyond_msgpack() {
        let value = Value::Number(Number::Integer(i128::from(u64::MAX) + 1));
        assert!(matches!(encode(&value), Err(CodecError::IntegerOutOfRange(_))));
    }
}
