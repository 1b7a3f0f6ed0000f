use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::FutureExt;
use nativebridge_router::codes;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capability::CapabilityRegistry;
use crate::config::GatewayConfig;
use crate::error::{CapabilityError, GatewayError, Result};
use crate::protocol::{
    error_frame, parse_request, result_frame, tool_call_result, CAPABILITY_NOT_FOUND,
    PROTOCOL_VERSION,
};

pub const RPC_ENDPOINT: &str = "/mcp";
pub const PING_ENDPOINT: &str = "/ping";

const SERVER_NAME: &str = "nativebridge";

/// Result of a successful [`ExternalServiceGateway::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new listener is bound at this address.
    Started(SocketAddr),
    /// The gateway was already serving; nothing changed.
    AlreadyRunning(SocketAddr),
}

impl StartOutcome {
    pub fn addr(&self) -> SocketAddr {
        match self {
            StartOutcome::Started(addr) | StartOutcome::AlreadyRunning(addr) => *addr,
        }
    }
}

struct RunningServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
    drain_timeout: Duration,
}

/// HTTP listener exposing the capability registry to external clients.
///
/// At most one listener runs at a time. `start` and `shutdown` serialize on
/// the running slot, so a restart never races the previous listener's port.
pub struct ExternalServiceGateway {
    registry: Arc<CapabilityRegistry>,
    running: Mutex<Option<RunningServer>>,
}

impl ExternalServiceGateway {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            running: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Bind and begin serving.
    ///
    /// Calling this while a listener is live returns
    /// [`StartOutcome::AlreadyRunning`] and leaves it untouched. A port held
    /// by another process yields [`GatewayError::AddressInUse`], which callers
    /// may treat as non-fatal.
    pub async fn start(&self, config: &GatewayConfig) -> Result<StartOutcome> {
        let mut slot = self.running.lock().await;
        if let Some(running) = slot.as_ref() {
            if !running.task.is_finished() {
                tracing::debug!(addr = %running.addr, "gateway already running");
                return Ok(StartOutcome::AlreadyRunning(running.addr));
            }
            tracing::warn!(addr = %running.addr, "previous gateway listener exited; rebinding");
            *slot = None;
        }

        let requested = config.socket_addr();
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|err| GatewayError::from_bind(requested, err))?;
        let addr = listener
            .local_addr()
            .map_err(|err| GatewayError::from_bind(requested, err))?;

        let cancel = CancellationToken::new();
        let app = build_router(Arc::clone(&self.registry));
        let shutdown = cancel.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        });

        tracing::info!(%addr, endpoint = RPC_ENDPOINT, "gateway listening");
        *slot = Some(RunningServer {
            addr,
            cancel,
            task,
            drain_timeout: config.drain_timeout,
        });
        Ok(StartOutcome::Started(addr))
    }

    /// Stop serving. Returns `false` when nothing was running.
    ///
    /// In-flight requests get the configured drain timeout; whatever remains
    /// after that is aborted.
    pub async fn shutdown(&self) -> bool {
        let mut slot = self.running.lock().await;
        let Some(running) = slot.take() else {
            return false;
        };
        let RunningServer {
            addr,
            cancel,
            mut task,
            drain_timeout,
        } = running;

        cancel.cancel();
        match tokio::time::timeout(drain_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => tracing::info!(%addr, "gateway stopped"),
            Ok(Ok(Err(err))) => tracing::warn!(%addr, error = %err, "gateway exited with error"),
            Ok(Err(err)) => tracing::warn!(%addr, error = %err, "gateway task failed"),
            Err(_) => {
                task.abort();
                tracing::warn!(%addr, ?drain_timeout, "gateway drain timed out; aborted");
            }
        }
        true
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|running| running.addr)
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }
}

fn build_router(registry: Arc<CapabilityRegistry>) -> Router {
    Router::new()
        .route(RPC_ENDPOINT, post(handle_rpc))
        .route(PING_ENDPOINT, get(handle_ping))
        .with_state(registry)
}

async fn handle_ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_rpc(State(registry): State<Arc<CapabilityRegistry>>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %err, "rejecting unparsable rpc body");
            return Json(error_frame(
                Value::Null,
                codes::PARSE_ERROR,
                format!("parse error: {err}"),
            ))
            .into_response();
        }
    };

    let request = match parse_request(&value) {
        Ok(request) => request,
        Err(err) => return Json(err.into_frame()).into_response(),
    };

    let Some(id) = request.id else {
        tracing::debug!(method = %request.method, "accepted rpc notification");
        return StatusCode::ACCEPTED.into_response();
    };

    let frame = match request.method.as_str() {
        "initialize" => result_frame(id, initialize_result()),
        "ping" => result_frame(id, json!({})),
        "tools/list" => result_frame(id, tools_list_result(&registry)),
        "tools/call" => call_capability(&registry, id, &request.params).await,
        other => error_frame(
            id,
            codes::METHOD_NOT_FOUND,
            format!("unsupported method '{other}'"),
        ),
    };
    Json(frame).into_response()
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": { "listChanged": false },
        },
    })
}

fn tools_list_result(registry: &CapabilityRegistry) -> Value {
    let tools: Vec<Value> = registry
        .list()
        .map(|capability| {
            json!({
                "name": capability.name(),
                "description": capability.description(),
                "inputSchema": capability.input_schema(),
            })
        })
        .collect();
    json!({ "tools": tools })
}

async fn call_capability(
    registry: &CapabilityRegistry,
    id: Value,
    params: &Map<String, Value>,
) -> Value {
    let Some(name) = params
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
    else {
        return error_frame(
            id,
            codes::INVALID_PARAMS,
            "tools/call requires non-empty field 'name'",
        );
    };
    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => json!({}),
        Some(arguments) => arguments.clone(),
    };

    let outcome = AssertUnwindSafe(registry.call(name, arguments))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(value)) => result_frame(id, tool_call_result(value, false)),
        Ok(Err(err @ CapabilityError::NotFound(_))) => {
            tracing::debug!(capability = name, "unknown capability requested");
            error_frame(id, CAPABILITY_NOT_FOUND, err.to_string())
        }
        Ok(Err(err @ CapabilityError::InvalidArguments { .. })) => {
            error_frame(id, codes::INVALID_PARAMS, err.to_string())
        }
        Ok(Err(err)) => {
            tracing::warn!(capability = name, error = %err, "capability failed");
            result_frame(id, tool_call_result(Value::String(err.to_string()), true))
        }
        Err(_) => {
            tracing::error!(capability = name, "capability panicked");
            result_frame(
                id,
                tool_call_result(Value::String("capability panicked".to_string()), true),
            )
        }
    }
}
