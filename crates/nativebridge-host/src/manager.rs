use std::sync::Arc;
use std::time::Duration;

use nativebridge_frame::FramedTransport;
use nativebridge_gateway::{register_catalog, CapabilityRegistry, ExternalServiceGateway};
use nativebridge_router::{MessageRouter, RouterConfig};

use crate::commands::register_native_commands;
use crate::context::{BridgeConfig, BridgeContext};
use crate::error::HostError;
use crate::lifecycle::{ShutdownCoordinator, ShutdownTrigger, EXIT_FATAL};
use crate::marker::ProcessMarker;
use crate::signals::spawn_signal_listener;

// A counterpart that stops reading can leave a write pending forever.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns one bridge run from marker acquisition to exit status.
pub struct ProcessLifecycleManager {
    config: BridgeConfig,
    coordinator: Arc<ShutdownCoordinator>,
}

impl ProcessLifecycleManager {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            coordinator: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Shared shutdown funnel, available before [`run`](Self::run) so
    /// callers can hook extra triggers into it.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Run over the process's stdin/stdout.
    pub async fn run_stdio(self) -> i32 {
        let transport = FramedTransport::stdio(self.config.frame);
        self.run(transport).await
    }

    /// Run until the first shutdown trigger, tear everything down, and
    /// return the process exit status.
    ///
    /// The marker is acquired before anything else. Every later path,
    /// fatal ones included, stops the gateway, closes the native writer,
    /// and removes the marker before returning.
    pub async fn run(self, transport: FramedTransport) -> i32 {
        let Self {
            config,
            coordinator,
        } = self;

        let marker = match ProcessMarker::new(&config.marker_path).acquire() {
            Ok(marker) => marker,
            Err(err) => {
                if matches!(err, HostError::DuplicateInstance { .. }) {
                    tracing::error!(error = %err, "refusing to start a second instance");
                }
                coordinator.trigger(ShutdownTrigger::Fatal(err.to_string()));
                coordinator.mark_terminated();
                return EXIT_FATAL;
            }
        };

        let (reader, writer, _) = transport.split();
        let router = MessageRouter::with_config(
            writer.clone(),
            RouterConfig {
                default_timeout: config.request_timeout,
            },
        );

        let mut registry = CapabilityRegistry::new();
        if let Err(err) = register_catalog(&mut registry, &router, config.extended_capabilities) {
            coordinator.trigger(ShutdownTrigger::Fatal(HostError::from(err).to_string()));
        }

        let context = Arc::new(BridgeContext {
            config,
            router: router.clone(),
            gateway: ExternalServiceGateway::new(registry),
            coordinator: Arc::clone(&coordinator),
        });
        register_native_commands(&context);

        let signals = if context.config.handle_signals {
            match spawn_signal_listener(Arc::clone(&coordinator)) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    coordinator.trigger(ShutdownTrigger::Fatal(err.to_string()));
                    None
                }
            }
        } else {
            None
        };

        let mut inbound = {
            let router = router.clone();
            tokio::spawn(async move { router.run(reader).await })
        };

        if coordinator.mark_running() {
            tracing::info!(
                pid = marker.pid(),
                mode = %context.config.mode,
                marker = %marker.path().display(),
                "bridge running"
            );
            context.start_gateway().await;
        }

        let trigger = tokio::select! {
            trigger = coordinator.wait() => trigger,
            joined = &mut inbound => {
                let trigger = match joined {
                    Ok(reason) => ShutdownTrigger::Disconnect(reason),
                    Err(err) => ShutdownTrigger::Fatal(format!("native channel task failed: {err}")),
                };
                coordinator.trigger(trigger);
                coordinator.wait().await
            }
        };

        context.gateway.shutdown().await;
        if tokio::time::timeout(WRITER_CLOSE_TIMEOUT, writer.close())
            .await
            .is_err()
        {
            tracing::warn!("native writer did not close in time");
        }
        if !inbound.is_finished() {
            inbound.abort();
        }
        if let Some(signals) = signals {
            signals.abort();
        }
        if let Err(err) = marker.release() {
            tracing::error!(error = %err, "failed to remove marker");
        }
        coordinator.mark_terminated();

        let code = trigger.exit_code();
        tracing::info!(exit_code = code, %trigger, "bridge terminated");
        code
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::path::PathBuf;

    use nativebridge_frame::{CloseReason, Inbound, Message, MessageReader, MessageWriter};
    use nativebridge_gateway::GatewayConfig;
    use serde_json::{json, Value};
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    use super::*;
    use crate::commands::{PONG, SERVER_ALREADY_RUNNING, SERVER_STARTED, SERVER_STOPPED};
    use crate::lifecycle::{LifecycleState, EXIT_GRACEFUL};

    fn unique_marker(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "nativebridge-manager-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("bridge.pid")
    }

    fn test_config(marker_path: PathBuf) -> BridgeConfig {
        BridgeConfig {
            gateway: GatewayConfig {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0,
                drain_timeout: Duration::from_secs(2),
            },
            marker_path,
            handle_signals: false,
            ..BridgeConfig::default()
        }
    }

    fn framed(stream: DuplexStream) -> FramedTransport {
        let (read, write) = tokio::io::split(stream);
        FramedTransport::new(read, write)
    }

    struct Extension {
        reader: MessageReader,
        writer: MessageWriter,
        bridge: JoinHandle<i32>,
        coordinator: Arc<ShutdownCoordinator>,
    }

    fn launch(config: BridgeConfig) -> Extension {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let manager = ProcessLifecycleManager::new(config);
        let coordinator = manager.coordinator();
        let bridge = tokio::spawn(manager.run(framed(ours)));
        let (reader, writer, _) = framed(theirs).split();
        Extension {
            reader,
            writer,
            bridge,
            coordinator,
        }
    }

    async fn wait_running(coordinator: &ShutdownCoordinator) {
        for _ in 0..200 {
            if coordinator.state() == LifecycleState::Running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("bridge never reached running");
    }

    async fn next_notification(reader: &mut MessageReader) -> (String, Option<Value>) {
        let message = tokio::time::timeout(Duration::from_secs(5), reader.next())
            .await
            .expect("reply should arrive")
            .expect("channel open")
            .expect("valid frame");
        match message.into_inbound() {
            Inbound::Notification { msg_type, payload } => (msg_type, payload),
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_stops_everything_and_exits_cleanly() {
        let marker = unique_marker("disconnect");
        let mut ext = launch(test_config(marker.clone()));
        wait_running(&ext.coordinator).await;
        assert!(marker.exists());

        ext.writer.close().await;
        let code = ext.bridge.await.unwrap();

        assert_eq!(code, EXIT_GRACEFUL);
        assert!(!marker.exists());
        assert_eq!(ext.coordinator.state(), LifecycleState::Terminated);
        assert!(matches!(
            ext.coordinator.reason(),
            Some(ShutdownTrigger::Disconnect(_))
        ));
        // The bridge closed its side too.
        assert!(ext.reader.next().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_command_exits_cleanly() {
        let marker = unique_marker("command");
        let ext = launch(test_config(marker.clone()));
        wait_running(&ext.coordinator).await;

        ext.writer
            .send(&Message::notification("shutdown", None))
            .await
            .unwrap();
        let code = ext.bridge.await.unwrap();

        assert_eq!(code, EXIT_GRACEFUL);
        assert_eq!(ext.coordinator.reason(), Some(ShutdownTrigger::Command));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn fatal_trigger_exits_with_failure_and_removes_marker() {
        let marker = unique_marker("fatal");
        let ext = launch(test_config(marker.clone()));
        wait_running(&ext.coordinator).await;

        ext.coordinator
            .trigger(ShutdownTrigger::Fatal("injected".into()));
        // A later disconnect does not override the first trigger.
        ext.writer.close().await;

        assert_eq!(ext.bridge.await.unwrap(), EXIT_FATAL);
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn duplicate_instance_exits_before_touching_anything() {
        let marker = unique_marker("duplicate");
        let parent = std::os::unix::process::parent_id();
        std::fs::write(&marker, format!("{parent}\n")).unwrap();

        let mut ext = launch(test_config(marker.clone()));
        assert_eq!(ext.bridge.await.unwrap(), EXIT_FATAL);
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), format!("{parent}\n"));
        // Nothing was ever read from or written to the channel.
        drop(ext.writer);
        assert!(ext.reader.next().await.is_none());
    }

    #[tokio::test]
    async fn busy_port_keeps_the_native_channel_running() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config(unique_marker("busy"));
        config.gateway.port = holder.local_addr().unwrap().port();

        let mut ext = launch(config);
        wait_running(&ext.coordinator).await;

        ext.writer
            .send(&Message::notification("ping", None))
            .await
            .unwrap();
        let (msg_type, _) = next_notification(&mut ext.reader).await;
        assert_eq!(msg_type, PONG);
        assert_eq!(ext.coordinator.state(), LifecycleState::Running);

        ext.writer.close().await;
        assert_eq!(ext.bridge.await.unwrap(), EXIT_GRACEFUL);
    }

    #[tokio::test]
    async fn start_and_stop_commands_drive_the_gateway() {
        let marker = unique_marker("start-stop");
        let mut ext = launch(test_config(marker));
        wait_running(&ext.coordinator).await;

        ext.writer
            .send(&Message::notification("start", Some(json!({ "port": 0 }))))
            .await
            .unwrap();
        let (msg_type, _) = next_notification(&mut ext.reader).await;
        assert!(
            msg_type == SERVER_STARTED || msg_type == SERVER_ALREADY_RUNNING,
            "unexpected reply {msg_type}"
        );

        ext.writer
            .send(&Message::notification("stop", None))
            .await
            .unwrap();
        let (msg_type, payload) = next_notification(&mut ext.reader).await;
        assert_eq!(msg_type, SERVER_STOPPED);
        assert_eq!(payload, Some(json!({ "wasRunning": true })));

        ext.writer
            .send(&Message::notification("start", Some(json!({ "port": 0 }))))
            .await
            .unwrap();
        let (msg_type, payload) = next_notification(&mut ext.reader).await;
        assert_eq!(msg_type, SERVER_STARTED);
        assert!(payload.unwrap()["port"].as_u64().unwrap() > 0);

        ext.writer.close().await;
        assert_eq!(ext.bridge.await.unwrap(), EXIT_GRACEFUL);
    }

    #[tokio::test]
    async fn corrupt_frame_takes_the_disconnect_path() {
        let marker = unique_marker("corrupt");
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let manager = ProcessLifecycleManager::new(test_config(marker.clone()));
        let coordinator = manager.coordinator();
        let bridge = tokio::spawn(manager.run(framed(ours)));
        let (peer_read, mut peer_write) = tokio::io::split(theirs);
        let (mut peer_reader, _, _) = FramedTransport::new(peer_read, tokio::io::sink()).split();
        wait_running(&coordinator).await;

        // Learn the gateway address through a well-formed status call first.
        let status = Message::call(1u64.into(), "status", None);
        let payload = serde_json::to_vec(&status).unwrap();
        peer_write
            .write_all(&u32::try_from(payload.len()).unwrap().to_le_bytes())
            .await
            .unwrap();
        peer_write.write_all(&payload).await.unwrap();
        let reply = peer_reader.next().await.unwrap().unwrap();
        let address: SocketAddr = reply.result.unwrap()["gateway"]["address"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(tokio::net::TcpStream::connect(address).await.is_ok());

        let garbage = b"{not json";
        peer_write
            .write_all(&u32::try_from(garbage.len()).unwrap().to_le_bytes())
            .await
            .unwrap();
        peer_write.write_all(garbage).await.unwrap();
        peer_write.flush().await.unwrap();

        let code = tokio::time::timeout(Duration::from_secs(10), bridge)
            .await
            .expect("bridge should exit")
            .unwrap();
        assert_eq!(code, EXIT_GRACEFUL);
        assert!(matches!(
            coordinator.reason(),
            Some(ShutdownTrigger::Disconnect(CloseReason::Protocol(_)))
        ));
        assert!(!marker.exists());
        assert!(tokio::net::TcpStream::connect(address).await.is_err());
    }

    #[tokio::test]
    async fn oversized_length_prefix_takes_the_disconnect_path() {
        let marker = unique_marker("oversized");
        let (ours, mut theirs) = tokio::io::duplex(64 * 1024);
        let manager = ProcessLifecycleManager::new(test_config(marker.clone()));
        let coordinator = manager.coordinator();
        let bridge = tokio::spawn(manager.run(framed(ours)));
        wait_running(&coordinator).await;

        theirs.write_all(&u32::MAX.to_le_bytes()).await.unwrap();
        theirs.flush().await.unwrap();

        let code = tokio::time::timeout(Duration::from_secs(10), bridge)
            .await
            .expect("bridge should exit")
            .unwrap();
        assert_eq!(code, EXIT_GRACEFUL);
        assert!(matches!(
            coordinator.reason(),
            Some(ShutdownTrigger::Disconnect(CloseReason::Protocol(_)))
        ));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn status_method_reports_state_and_gateway() {
        let mut ext = launch(test_config(unique_marker("status")));
        wait_running(&ext.coordinator).await;

        ext.writer
            .send(&Message::call(1u64.into(), "status", None))
            .await
            .unwrap();
        let message = ext.reader.next().await.unwrap().unwrap();
        let status = match message.into_inbound() {
            Inbound::Response { outcome, .. } => outcome.unwrap(),
            other => panic!("expected response, got {other:?}"),
        };
        assert_eq!(status["state"], json!("running"));
        assert_eq!(status["pid"], json!(std::process::id()));
        assert_eq!(status["gateway"]["running"], json!(true));
        assert!(status["capabilities"].as_u64().unwrap() > 0);

        ext.writer.close().await;
        ext.bridge.await.unwrap();
    }
}
