use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::closed::{CloseReason, ConnectionClosed};
use crate::codec::NativeCodec;
use crate::error::Result;
use crate::message::Message;

pub(crate) type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;

/// Reads complete messages from the native channel.
///
/// Handles partial reads internally; callers always get whole messages in
/// arrival order. The first EOF or error fires the shared
/// [`ConnectionClosed`] signal and ends the stream.
pub struct MessageReader {
    inner: FramedRead<BoxedRead, NativeCodec>,
    closed: ConnectionClosed,
    finished: bool,
}

impl MessageReader {
    pub(crate) fn new(inner: BoxedRead, codec: NativeCodec, closed: ConnectionClosed) -> Self {
        Self {
            inner: FramedRead::new(inner, codec),
            closed,
            finished: false,
        }
    }

    /// Read the next message.
    ///
    /// Returns `None` after a clean EOF. An error is returned once; every
    /// later call returns `None`.
    pub async fn next(&mut self) -> Option<Result<Message>> {
        if self.finished {
            return None;
        }

        match self.inner.next().await {
            Some(Ok(message)) => Some(Ok(message)),
            Some(Err(err)) => {
                self.finished = true;
                let reason = if err.is_protocol_fault() {
                    CloseReason::Protocol(err.to_string())
                } else {
                    CloseReason::Io(err.to_string())
                };
                tracing::warn!(error = %err, "native channel read failed");
                self.closed.fire(reason);
                Some(Err(err))
            }
            None => {
                self.finished = true;
                tracing::debug!("native channel reached EOF");
                self.closed.fire(CloseReason::Eof);
                None
            }
        }
    }

    /// The closed signal shared with the writer half.
    pub fn closed(&self) -> &ConnectionClosed {
        &self.closed
    }
}
