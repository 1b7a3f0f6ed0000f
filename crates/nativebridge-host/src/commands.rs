//! Control messages the extension sends over the native channel.

use std::net::SocketAddr;
use std::sync::Arc;

use nativebridge_gateway::StartOutcome;
use nativebridge_router::RpcError;
use serde_json::{json, Value};

use crate::context::BridgeContext;
use crate::lifecycle::ShutdownTrigger;

pub const START: &str = "start";
pub const STOP: &str = "stop";
pub const PING: &str = "ping";
pub const SHUTDOWN: &str = "shutdown";
pub const STATUS_METHOD: &str = "status";

pub const SERVER_STARTED: &str = "server_started";
pub const SERVER_ALREADY_RUNNING: &str = "server_already_running";
pub const SERVER_START_FAILED: &str = "server_start_failed";
pub const SERVER_STOPPED: &str = "server_stopped";
pub const PONG: &str = "pong";

/// Install the control handlers on the context's router.
pub fn register_native_commands(context: &Arc<BridgeContext>) {
    let router = context.router();

    let ctx = Arc::clone(context);
    router.register_handler(START, move |payload| {
        let ctx = Arc::clone(&ctx);
        async move { handle_start(&ctx, payload).await }
    });

    let ctx = Arc::clone(context);
    router.register_handler(STOP, move |_| {
        let ctx = Arc::clone(&ctx);
        async move {
            let was_running = ctx.gateway.shutdown().await;
            reply(&ctx, SERVER_STOPPED, json!({ "wasRunning": was_running })).await;
        }
    });

    let ctx = Arc::clone(context);
    router.register_handler(PING, move |_| {
        let ctx = Arc::clone(&ctx);
        async move { reply(&ctx, PONG, json!({})).await }
    });

    let ctx = Arc::clone(context);
    router.register_handler(SHUTDOWN, move |_| {
        let ctx = Arc::clone(&ctx);
        async move {
            ctx.coordinator.trigger(ShutdownTrigger::Command);
        }
    });

    let ctx = Arc::clone(context);
    router.register_rpc_method(STATUS_METHOD, move |_| {
        let ctx = Arc::clone(&ctx);
        async move { Ok::<_, RpcError>(ctx.status().await) }
    });
}

async fn handle_start(ctx: &BridgeContext, payload: Option<Value>) {
    if ctx.coordinator.is_shutting_down() {
        refuse_start_during_shutdown(ctx).await;
        return;
    }

    let requested = payload.as_ref().and_then(|payload| payload.get("port"));
    let port = match requested {
        None | Some(Value::Null) => ctx.config.gateway.port,
        Some(value) => match value.as_u64().and_then(|port| u16::try_from(port).ok()) {
            Some(port) => port,
            None => {
                let error = format!("invalid port: {value}");
                reply(ctx, SERVER_START_FAILED, json!({ "error": error })).await;
                return;
            }
        },
    };

    let config = ctx.config.gateway.with_port(port);
    match ctx.gateway.start(&config).await {
        // Teardown may have stopped the gateway while this bind was in flight.
        Ok(StartOutcome::Started(_)) if ctx.coordinator.is_shutting_down() => {
            ctx.gateway.shutdown().await;
            refuse_start_during_shutdown(ctx).await;
        }
        Ok(StartOutcome::Started(addr)) => reply(ctx, SERVER_STARTED, address(addr)).await,
        Ok(StartOutcome::AlreadyRunning(addr)) => {
            reply(ctx, SERVER_ALREADY_RUNNING, address(addr)).await
        }
        Err(err) => {
            tracing::warn!(error = %err, port, "start command failed");
            reply(
                ctx,
                SERVER_START_FAILED,
                json!({ "error": err.to_string(), "recoverable": err.is_recoverable() }),
            )
            .await;
        }
    }
}

async fn refuse_start_during_shutdown(ctx: &BridgeContext) {
    tracing::debug!("start command ignored; bridge is shutting down");
    reply(
        ctx,
        SERVER_START_FAILED,
        json!({ "error": "bridge is shutting down", "recoverable": false }),
    )
    .await;
}

fn address(addr: SocketAddr) -> Value {
    json!({ "host": addr.ip().to_string(), "port": addr.port() })
}

async fn reply(ctx: &BridgeContext, msg_type: &str, payload: Value) {
    if let Err(err) = ctx.router.notify(msg_type, Some(payload)).await {
        tracing::debug!(error = %err, msg_type, "could not deliver reply");
    }
}
