use tokio::io::{AsyncRead, AsyncWrite};

use crate::closed::ConnectionClosed;
use crate::codec::{FrameConfig, NativeCodec};
use crate::reader::MessageReader;
use crate::writer::MessageWriter;

/// A native channel: one read half, one write half, one shared closed signal.
pub struct FramedTransport {
    reader: MessageReader,
    writer: MessageWriter,
    closed: ConnectionClosed,
}

impl FramedTransport {
    /// Wrap an arbitrary byte stream pair with default bounds.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_config(reader, writer, FrameConfig::default())
    }

    /// Wrap an arbitrary byte stream pair with explicit bounds.
    pub fn with_config<R, W>(reader: R, writer: W, config: FrameConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let closed = ConnectionClosed::new();
        let codec = NativeCodec::new(config);
        Self {
            reader: MessageReader::new(Box::new(reader), codec.clone(), closed.clone()),
            writer: MessageWriter::new(Box::new(writer), codec, closed.clone()),
            closed,
        }
    }

    /// The process's own stdin/stdout, as used by a native-messaging host.
    pub fn stdio(config: FrameConfig) -> Self {
        Self::with_config(tokio::io::stdin(), tokio::io::stdout(), config)
    }

    pub fn closed(&self) -> ConnectionClosed {
        self.closed.clone()
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (MessageReader, MessageWriter, ConnectionClosed) {
        (self.reader, self.writer, self.closed)
    }
}
