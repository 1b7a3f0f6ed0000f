use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Frame header: a 4-byte little-endian payload length.
pub const HEADER_SIZE: usize = 4;

/// Default maximum inbound payload: 64 MiB (extension to host).
pub const DEFAULT_MAX_INBOUND_PAYLOAD: usize = 64 * 1024 * 1024;

/// Default maximum outbound payload: 1 MiB (host to extension).
pub const DEFAULT_MAX_OUTBOUND_PAYLOAD: usize = 1024 * 1024;

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────────────┐
/// │ Length (4B)  │ Payload                  │
/// │ u32 LE       │ (Length bytes UTF-8 JSON)│
/// └──────────────┴──────────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut, max_payload: usize) -> Result<()> {
    let max = max_payload.min(u32::MAX as usize);
    if payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame payload from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let payload_len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;

    if payload_len == 0 {
        return Err(FrameError::EmptyFrame);
    }
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Bounds applied by the codec in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest payload accepted from the counterpart.
    pub max_inbound_payload: usize,
    /// Largest payload this side will emit.
    pub max_outbound_payload: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_inbound_payload: DEFAULT_MAX_INBOUND_PAYLOAD,
            max_outbound_payload: DEFAULT_MAX_OUTBOUND_PAYLOAD,
        }
    }
}

/// `tokio_util` codec turning the native byte stream into [`Message`] values.
#[derive(Debug, Clone, Default)]
pub struct NativeCodec {
    config: FrameConfig,
}

impl NativeCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for NativeCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match decode_frame(src, self.config.max_inbound_payload)? {
            Some(payload) => Message::from_slice(&payload).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::IncompleteFrame {
                buffered: src.len(),
            }),
        }
    }
}

impl<'a> Encoder<&'a Message> for NativeCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &'a Message, dst: &mut BytesMut) -> Result<()> {
        let payload = serde_json::to_vec(item)?;
        encode_frame(&payload, dst, self.config.max_outbound_payload)
    }
}
