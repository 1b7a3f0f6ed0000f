//! One-shot "connection closed" signal shared by both halves of a transport.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why the native channel stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The counterpart closed its end of the stream.
    Eof,
    /// This side closed the channel.
    Local,
    /// A framing fault made the byte stream unusable.
    Protocol(String),
    /// The underlying stream failed.
    Io(String),
}

/// Fires exactly once, whichever of EOF, error, or explicit close happens first.
#[derive(Debug, Clone, Default)]
pub struct ConnectionClosed {
    inner: Arc<ClosedInner>,
}

#[derive(Debug, Default)]
struct ClosedInner {
    reason: OnceLock<CloseReason>,
    token: CancellationToken,
}

impl ConnectionClosed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reason` and wake waiters. Returns `true` only for the first call.
    pub fn fire(&self, reason: CloseReason) -> bool {
        let first = self.inner.reason.set(reason).is_ok();
        if first {
            tracing::debug!(reason = ?self.inner.reason.get(), "native channel closed");
            self.inner.token.cancel();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The first recorded reason, if the signal has fired.
    pub fn reason(&self) -> Option<CloseReason> {
        self.inner.reason.get().cloned()
    }

    /// Wait until the signal fires and return the winning reason.
    pub async fn wait(&self) -> CloseReason {
        self.inner.token.cancelled().await;
        self.reason().unwrap_or(CloseReason::Local)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn only_first_fire_wins() {
        let closed = ConnectionClosed::new();
        assert!(!closed.is_closed());

        assert!(closed.fire(CloseReason::Eof));
        assert!(!closed.fire(CloseReason::Io("broken pipe".to_string())));
        assert!(!closed.fire(CloseReason::Local));

        assert_eq!(closed.reason(), Some(CloseReason::Eof));
    }

    #[tokio::test]
    async fn waiters_on_clones_see_the_same_reason() {
        let closed = ConnectionClosed::new();
        let waiter = {
            let closed = closed.clone();
            tokio::spawn(async move { closed.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        closed.fire(CloseReason::Protocol("bad length".to_string()));

        let reason = waiter.await.unwrap();
        assert_eq!(reason, CloseReason::Protocol("bad length".to_string()));
    }

    #[tokio::test]
    async fn wait_after_fire_returns_immediately() {
        let closed = ConnectionClosed::new();
        closed.fire(CloseReason::Local);
        assert_eq!(closed.wait().await, CloseReason::Local);
    }
}
