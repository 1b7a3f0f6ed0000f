use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nativebridge_frame::FrameConfig;
use nativebridge_gateway::{ExternalServiceGateway, GatewayConfig, StartOutcome};
use nativebridge_router::{MessageRouter, DEFAULT_REQUEST_TIMEOUT};
use serde_json::{json, Value};

use crate::lifecycle::{ShutdownCoordinator, ShutdownTrigger};
use crate::marker::ProcessMarker;

/// Everything the bridge needs to know before it starts.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub gateway: GatewayConfig,
    /// Register the extended capability set.
    pub extended_capabilities: bool,
    pub marker_path: PathBuf,
    /// Default deadline for native requests without their own.
    pub request_timeout: Duration,
    pub frame: FrameConfig,
    /// Free-form deployment label, logged at startup.
    pub mode: String,
    /// Install SIGTERM/SIGINT/SIGHUP listeners.
    pub handle_signals: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            extended_capabilities: false,
            marker_path: ProcessMarker::default_path(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            frame: FrameConfig::default(),
            mode: "production".to_string(),
            handle_signals: true,
        }
    }
}

/// The one running bridge instance, shared by every handler.
pub struct BridgeContext {
    pub(crate) config: BridgeConfig,
    pub(crate) router: MessageRouter,
    pub(crate) gateway: ExternalServiceGateway,
    pub(crate) coordinator: Arc<ShutdownCoordinator>,
}

impl BridgeContext {
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn gateway(&self) -> &ExternalServiceGateway {
        &self.gateway
    }

    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.coordinator
    }

    /// Bring the gateway up during startup.
    ///
    /// A busy port leaves the bridge running without it; any other bind
    /// failure is fatal.
    pub(crate) async fn start_gateway(&self) {
        match self.gateway.start(&self.config.gateway).await {
            Ok(StartOutcome::Started(addr)) | Ok(StartOutcome::AlreadyRunning(addr)) => {
                tracing::debug!(%addr, "gateway up");
            }
            Err(err) if err.is_recoverable() => {
                tracing::warn!(error = %err, "gateway unavailable; native channel continues without it");
            }
            Err(err) => {
                self.coordinator
                    .trigger(ShutdownTrigger::Fatal(err.to_string()));
            }
        }
    }

    /// Snapshot reported by the `status` method.
    pub async fn status(&self) -> Value {
        let address = self.gateway.local_addr().await;
        json!({
            "state": self.coordinator.state(),
            "pid": std::process::id(),
            "mode": self.config.mode,
            "marker": self.config.marker_path.display().to_string(),
            "gateway": {
                "running": self.gateway.is_running().await,
                "address": address.map(|addr| addr.to_string()),
            },
            "capabilities": self.gateway.registry().len(),
            "pendingRequests": self.router.pending_count(),
        })
    }
}
