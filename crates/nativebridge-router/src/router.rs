use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use nativebridge_frame::{
    CloseReason, ErrorObject, FrameError, Inbound, Message, MessageId, MessageReader,
    MessageWriter,
};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{codes, Result, RouterError, RpcError};
use crate::handler::HandlerRegistry;
use crate::pending::{PendingCall, PendingGuard, PendingTable};

/// Default deadline for outbound requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Router behavior config.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Deadline applied when `rpc_request` is called without one.
    pub default_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// An outbound call to the counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Correlates outbound calls with responses and dispatches inbound traffic.
///
/// Cheap to clone; all clones share one pending table and one set of
/// handlers.
#[derive(Clone)]
pub struct MessageRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    writer: MessageWriter,
    pending: PendingTable,
    handlers: HandlerRegistry,
    next_id: AtomicU64,
    config: RouterConfig,
}

impl MessageRouter {
    /// Create a router that writes through `writer` with default config.
    pub fn new(writer: MessageWriter) -> Self {
        Self::with_config(writer, RouterConfig::default())
    }

    /// Create a router with explicit config.
    pub fn with_config(writer: MessageWriter, config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                writer,
                pending: PendingTable::default(),
                handlers: HandlerRegistry::default(),
                next_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Register a listener for notifications whose `type` equals `msg_type`.
    pub fn register_handler<F, Fut>(&self, msg_type: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.set_notification(
            msg_type.into(),
            Arc::new(move |payload| handler(payload).boxed()),
        );
    }

    /// Register a local method the counterpart may call.
    pub fn register_rpc_method<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, RpcError>> + Send + 'static,
    {
        self.inner.handlers.set_method(
            method.into(),
            Arc::new(move |params| handler(params).boxed()),
        );
    }

    /// Send a call and wait for its response.
    ///
    /// Settles exactly once: with the matching response, with
    /// [`RouterError::Timeout`] after `timeout` (or the router default), or
    /// with [`RouterError::Disconnected`] if the channel closes first. A
    /// response arriving after the deadline is dropped.
    pub async fn rpc_request(&self, request: RpcRequest, timeout: Option<Duration>) -> Result<Value> {
        let timeout = timeout.unwrap_or(self.inner.config.default_timeout);
        let id = MessageId::Number(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = oneshot::channel();

        // Insert before writing so a fast response always finds its entry.
        self.inner
            .pending
            .insert(id.clone(), PendingCall::new(&request.method, tx));
        let _guard = PendingGuard {
            table: &self.inner.pending,
            id: id.clone(),
        };

        let RpcRequest { method, params } = request;
        let message = Message::call(id.clone(), method.clone(), params);
        self.inner.writer.send(&message).await.map_err(write_error)?;
        tracing::debug!(id = %id, method = %method, ?timeout, "sent native request");

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RouterError::Disconnected),
            Err(_) => {
                if self.inner.pending.remove(&id).is_some() {
                    tracing::warn!(id = %id, method = %method, ?timeout, "native request timed out");
                    return Err(RouterError::Timeout { method, timeout });
                }
                // Settled in the same instant the deadline fired.
                rx.try_recv()
                    .unwrap_or(Err(RouterError::Timeout { method, timeout }))
            }
        }
    }

    /// Send a fire-and-forget notification.
    pub async fn notify(&self, msg_type: &str, payload: Option<Value>) -> Result<()> {
        self.inner
            .writer
            .send(&Message::notification(msg_type, payload))
            .await
            .map_err(write_error)
    }

    /// Drive the inbound side until the channel closes.
    ///
    /// Messages are dispatched in arrival order; handler bodies run as
    /// separate tasks and may complete in any order. On exit every
    /// outstanding request is rejected with [`RouterError::Disconnected`].
    pub async fn run(&self, mut reader: MessageReader) -> CloseReason {
        while let Some(next) = reader.next().await {
            match next {
                Ok(message) => self.dispatch(message),
                Err(err) => {
                    tracing::error!(error = %err, "native channel framing failed");
                    break;
                }
            }
        }

        let rejected = self.inner.pending.fail_all();
        if rejected > 0 {
            tracing::warn!(rejected, "rejected outstanding requests after native channel closed");
        }
        reader.closed().reason().unwrap_or(CloseReason::Eof)
    }

    /// Route one inbound message.
    ///
    /// Envelope defects stay here: they are logged, and settle or answer the
    /// id they carry when it is readable. Only framing faults close the
    /// channel.
    pub fn dispatch(&self, message: Message) {
        if let Some(defect) = &message.defect {
            tracing::warn!(detail = %defect.detail, "counterpart sent an unreadable envelope");
        }
        match message.into_inbound() {
            Inbound::Response { id, outcome } => {
                let outcome = outcome.map_err(RouterError::Remote);
                if !self.inner.pending.settle(&id, outcome) {
                    tracing::debug!(id = %id, "dropping response for unknown or settled request");
                }
            }
            Inbound::MalformedResponse { id, reason } => {
                tracing::warn!(id = %id, reason, "malformed response from counterpart");
                self.inner
                    .pending
                    .settle(&id, Err(RouterError::MalformedResponse(reason)));
            }
            Inbound::Call { id, method, params } => self.spawn_call(id, method, params),
            Inbound::InvalidCall { id, reason } => {
                let writer = self.inner.writer.clone();
                let error = RpcError::new(codes::INVALID_REQUEST, reason);
                tokio::spawn(async move { send_response(&writer, id, Err(error)).await });
            }
            Inbound::Notification { msg_type, payload } => {
                self.spawn_notification(msg_type, payload)
            }
            Inbound::Invalid { reason } => {
                tracing::warn!(reason, "ignoring unroutable message");
            }
        }
    }

    /// Number of outbound requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// The write half this router sends through.
    pub fn writer(&self) -> &MessageWriter {
        &self.inner.writer
    }

    fn spawn_call(&self, id: MessageId, method: String, params: Option<Value>) {
        let handler = self.inner.handlers.method(&method);
        let writer = self.inner.writer.clone();

        tokio::spawn(async move {
            let outcome = match handler {
                Some(handler) => {
                    match AssertUnwindSafe(async move { handler(params).await })
                        .catch_unwind()
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            tracing::error!(id = %id, method, "rpc handler panicked");
                            Err(RpcError::internal(format!("handler for '{method}' panicked")))
                        }
                    }
                }
                None => {
                    tracing::warn!(id = %id, method, "no rpc method registered");
                    Err(RpcError::method_not_found(&method))
                }
            };

            send_response(&writer, id, outcome).await;
        });
    }

    fn spawn_notification(&self, msg_type: String, payload: Option<Value>) {
        let Some(handler) = self.inner.handlers.notification(&msg_type) else {
            tracing::warn!(msg_type, "no handler registered for notification");
            return;
        };

        tokio::spawn(async move {
            let result = AssertUnwindSafe(async move { handler(payload).await })
                .catch_unwind()
                .await;
            if result.is_err() {
                tracing::error!(msg_type, "notification handler panicked");
            }
        });
    }
}

/// Answer an inbound call. A result the codec refuses (for example one
/// over the outbound size bound) is replaced by an internal error so the
/// caller still gets a response for its id.
async fn send_response(
    writer: &MessageWriter,
    id: MessageId,
    outcome: std::result::Result<Value, RpcError>,
) {
    let response = Message::response(id.clone(), outcome.map_err(ErrorObject::from));
    let err = match writer.send(&response).await {
        Ok(()) => return,
        Err(FrameError::Closed) => {
            tracing::debug!(id = %id, "native channel closed before rpc response");
            return;
        }
        Err(FrameError::Io(err)) => {
            tracing::warn!(id = %id, error = %err, "failed sending rpc response");
            return;
        }
        Err(err) => err,
    };

    tracing::warn!(id = %id, error = %err, "rpc response could not be framed; sending error instead");
    let fallback = Message::response(
        id,
        Err(ErrorObject::from(RpcError::internal(format!(
            "response could not be sent: {err}"
        )))),
    );
    if let Err(err) = writer.send(&fallback).await {
        tracing::warn!(error = %err, "failed sending rpc error response");
    }
}

fn write_error(err: FrameError) -> RouterError {
    match err {
        FrameError::Closed => RouterError::Disconnected,
        other => RouterError::Frame(other),
    }
}
