//! Length-prefixed JSON framing for browser native-messaging channels.
//!
//! This is the lowest layer of nativebridge. Every message on the native
//! channel is framed as:
//! - A 4-byte little-endian payload length
//! - Exactly that many bytes of UTF-8 JSON
//!
//! Callers get whole [`Message`] values in arrival order; partial reads and
//! write atomicity are handled here.

pub mod closed;
pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod transport;
pub mod writer;

pub use closed::{CloseReason, ConnectionClosed};
pub use codec::{
    decode_frame, encode_frame, FrameConfig, NativeCodec, DEFAULT_MAX_INBOUND_PAYLOAD,
    DEFAULT_MAX_OUTBOUND_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{Defect, ErrorObject, Inbound, Message, MessageId};
pub use reader::MessageReader;
pub use transport::FramedTransport;
pub use writer::MessageWriter;
