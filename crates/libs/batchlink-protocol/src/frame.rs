//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.
//! [`FrameCodec`] plugs into `tokio_util::codec`: decoding yields `Ok(None)`
//! while a frame is still incomplete and `Err` only when the stream can no
//! longer be split into frames.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

pub(crate) const HEADER_LEN: usize = 4;

/// Largest payload accepted in either direction.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self { max_frame_len: MAX_FRAME_LEN }
    }

    /// Lower the payload limit. Values above [`MAX_FRAME_LEN`] are clamped.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len: max_frame_len.min(MAX_FRAME_LEN) }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    pub(crate) fn header(&self, payload_len: usize) -> Result<[u8; HEADER_LEN], ProtocolError> {
        if payload_len > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge(payload_len));
        }
        let len = u32::try_from(payload_len).map_err(|_| ProtocolError::FrameTooLarge(payload_len))?;
        Ok(len.to_be_bytes())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, ProtocolError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut len_buf = [0u8; HEADER_LEN];
        len_buf.copy_from_slice(&src[..HEADER_LEN]);
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge(len));
        }
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        Ok(Some(src.split_to(len)))
    }
}

impl<'a> Encoder<&'a [u8]> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: &'a [u8], dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let header = self.header(payload.len())?;
        dst.reserve(HEADER_LEN + payload.len());
        dst.put_slice(&header);
        dst.put_slice(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ServiceMessage;
    use crate::types::Batch;

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let frame = ServiceMessage::Batch(Batch::new(1, 2, vec![7; 64])).to_frame().expect("frame");
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&frame[..2]);
        assert!(codec.decode(&mut buf).expect("short header").is_none());

        buf.extend_from_slice(&frame[2..20]);
        assert!(codec.decode(&mut buf).expect("short payload").is_none());

        buf.extend_from_slice(&frame[20..]);
        let payload = codec.decode(&mut buf).expect("complete").expect("frame");
        assert_eq!(&payload[..], &frame[HEADER_LEN..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn back_to_back_frames_split_in_order() {
        let first = ServiceMessage::ImAlive.to_frame().expect("first");
        let second = ServiceMessage::Exit.to_frame().expect("second");
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second);

        let mut codec = FrameCodec::new();
        let a = codec.decode(&mut buf).expect("a").expect("frame a");
        let b = codec.decode(&mut buf).expect("b").expect("frame b");
        assert_eq!(ServiceMessage::decode(&a).expect("decode a"), ServiceMessage::ImAlive);
        assert_eq!(ServiceMessage::decode(&b).expect("decode b"), ServiceMessage::Exit);
        assert!(codec.decode(&mut buf).expect("empty").is_none());
    }

    #[test]
    fn reencoding_a_decoded_frame_is_identical() {
        let frame = ServiceMessage::Batch(Batch::new(4, 5, b"abc".to_vec())).to_frame().expect("frame");
        let mut codec = FrameCodec::new();
        let payload = codec.decode(&mut BytesMut::from(&frame[..])).expect("decode").expect("frame");

        let mut out = BytesMut::new();
        codec.encode(&payload[..], &mut out).expect("encode");
        assert_eq!(&out[..], frame.as_slice());
    }

    #[test]
    fn oversized_length_is_invalid() {
        let mut codec = FrameCodec::with_max_frame_len(8);
        let mut buf = BytesMut::from(&[0u8, 0, 0, 9][..]);
        let err = codec.decode(&mut buf).expect_err("too large");
        assert!(matches!(err, ProtocolError::FrameTooLarge(9)));
        assert!(err.breaks_framing());

        let err = codec.encode(&[0u8; 9][..], &mut BytesMut::new()).expect_err("too large");
        assert!(matches!(err, ProtocolError::FrameTooLarge(9)));
    }

    #[test]
    fn random_bytes_never_panic_the_decoder() {
        let mut seed = 0xA5A5_5A5A_1234_5678_u64;
        let mut codec = FrameCodec::with_max_frame_len(1024);
        for _ in 0..2_000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let len = ((seed >> 16) as usize) % 256;
            let mut bytes = vec![0_u8; len];
            let mut stream = seed ^ 0x9E37_79B9_7F4A_7C15;
            for byte in &mut bytes {
                stream = stream.rotate_left(9).wrapping_mul(0xD134_2543_DE82_E285);
                *byte = (stream & 0xFF) as u8;
            }
            let mut buf = BytesMut::from(&bytes[..]);
            while let Ok(Some(payload)) = codec.decode(&mut buf) {
                assert!(payload.len() <= codec.max_frame_len());
            }
        }
    }
}
