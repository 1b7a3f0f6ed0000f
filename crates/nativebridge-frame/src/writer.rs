use std::sync::Arc;

use futures_util::SinkExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;

use crate::closed::{CloseReason, ConnectionClosed};
use crate::codec::NativeCodec;
use crate::error::{FrameError, Result};
use crate::message::Message;

pub(crate) type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Writes complete messages to the native channel.
///
/// Cheap to clone. Each [`send`](Self::send) holds the sink for one whole
/// frame, so concurrent senders never interleave bytes.
#[derive(Clone)]
pub struct MessageWriter {
    inner: Arc<Mutex<FramedWrite<BoxedWrite, NativeCodec>>>,
    closed: ConnectionClosed,
}

impl MessageWriter {
    pub(crate) fn new(inner: BoxedWrite, codec: NativeCodec, closed: ConnectionClosed) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FramedWrite::new(inner, codec))),
            closed,
        }
    }

    /// Encode and write one message as a single frame, then flush.
    ///
    /// An oversized message is rejected without touching the stream. An I/O
    /// failure fires the closed signal.
    pub async fn send(&self, message: &Message) -> Result<()> {
        if self.closed.is_closed() {
            return Err(FrameError::Closed);
        }

        let mut sink = self.inner.lock().await;
        match sink.send(message).await {
            Ok(()) => Ok(()),
            Err(FrameError::Io(err)) => {
                tracing::warn!(error = %err, "native channel write failed");
                self.closed.fire(CloseReason::Io(err.to_string()));
                Err(FrameError::Io(err))
            }
            Err(err) => Err(err),
        }
    }

    /// Flush and shut down the write half, then fire the closed signal.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        let mut sink = self.inner.lock().await;
        if let Err(err) = sink.flush().await {
            tracing::debug!(error = %err, "flush on close failed");
        }
        if let Err(err) = sink.get_mut().shutdown().await {
            tracing::debug!(error = %err, "shutdown on close failed");
        }
        self.closed.fire(CloseReason::Local);
    }

    /// The closed signal shared with the reader half.
    pub fn closed(&self) -> &ConnectionClosed {
        &self.closed
    }
}

impl std::fmt::Debug for MessageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWriter")
            .field("closed", &self.closed.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use serde_json::json;
    use tokio::io::AsyncReadExt;
    use tokio_util::codec::Decoder;

    use super::*;
    use crate::codec::FrameConfig;
    use crate::message::MessageId;

    #[tokio::test]
    async fn writes_one_frame_per_message() {
        let (tx, mut rx) = tokio::io::duplex(64 * 1024);
        let writer = MessageWriter::new(Box::new(tx), NativeCodec::default(), ConnectionClosed::new());

        writer
            .send(&Message::call(MessageId::Number(4), "status", None))
            .await
            .unwrap();
        writer.close().await;

        let mut raw = Vec::new();
        rx.read_to_end(&mut raw).await.unwrap();

        let mut buf = BytesMut::from(raw.as_slice());
        let decoded = NativeCodec::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.method.as_deref(), Some("status"));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn concurrent_senders_do_not_interleave() {
        let (tx, mut rx) = tokio::io::duplex(256);
        let writer = MessageWriter::new(Box::new(tx), NativeCodec::default(), ConnectionClosed::new());

        let mut tasks = Vec::new();
        for i in 0..16u64 {
            let writer = writer.clone();
            tasks.push(tokio::spawn(async move {
                let body = json!({ "n": i, "pad": "x".repeat(100) });
                writer
                    .send(&Message::notification("chunk", Some(body)))
                    .await
                    .unwrap();
            }));
        }

        let reader = tokio::spawn(async move {
            let mut raw = Vec::new();
            rx.read_to_end(&mut raw).await.unwrap();
            raw
        });

        for task in tasks {
            task.await.unwrap();
        }
        writer.close().await;

        let raw = reader.await.unwrap();
        let mut buf = BytesMut::from(raw.as_slice());
        let mut codec = NativeCodec::default();
        let mut seen = Vec::new();
        while let Some(message) = codec.decode(&mut buf).unwrap() {
            seen.push(message.payload.unwrap()["n"].as_u64().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn oversized_message_is_rejected_without_closing() {
        let (tx, _rx) = tokio::io::duplex(1024);
        let codec = NativeCodec::new(FrameConfig {
            max_outbound_payload: 16,
            ..FrameConfig::default()
        });
        let writer = MessageWriter::new(Box::new(tx), codec, ConnectionClosed::new());

        let err = writer
            .send(&Message::notification("big", Some(json!("x".repeat(64)))))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(!writer.closed().is_closed());

        writer.send(&Message::notification("ok", None)).await.unwrap();
    }

    #[tokio::test]
    async fn write_to_dropped_peer_fires_closed() {
        let (tx, rx) = tokio::io::duplex(64);
        drop(rx);
        let writer = MessageWriter::new(Box::new(tx), NativeCodec::default(), ConnectionClosed::new());

        let err = writer
            .send(&Message::notification("ping", None))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Io(_)));
        assert!(matches!(writer.closed().reason(), Some(CloseReason::Io(_))));

        let err = writer
            .send(&Message::notification("ping", None))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Closed));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (tx, _rx) = tokio::io::duplex(64);
        let writer = MessageWriter::new(Box::new(tx), NativeCodec::default(), ConnectionClosed::new());

        writer.close().await;
        writer.close().await;
        assert_eq!(writer.closed().reason(), Some(CloseReason::Local));
    }
}
