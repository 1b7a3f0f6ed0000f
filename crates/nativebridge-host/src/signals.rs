use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::{HostError, Result};
use crate::lifecycle::{ShutdownCoordinator, ShutdownTrigger};

/// Forward the first termination signal to `coordinator`.
///
/// Listeners are installed before this returns, so a signal delivered right
/// after is not lost. The task ends once shutdown begins for any reason.
#[cfg(unix)]
pub fn spawn_signal_listener(coordinator: Arc<ShutdownCoordinator>) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).map_err(HostError::Signal)?;
    let mut interrupt = signal(SignalKind::interrupt()).map_err(HostError::Signal)?;
    let mut hangup = signal(SignalKind::hangup()).map_err(HostError::Signal)?;
    let token = coordinator.token();

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = token.cancelled() => return,
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
            _ = hangup.recv() => "SIGHUP",
        };
        coordinator.trigger(ShutdownTrigger::Signal(name));
    }))
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(coordinator: Arc<ShutdownCoordinator>) -> Result<JoinHandle<()>> {
    let token = coordinator.token();
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    coordinator.trigger(ShutdownTrigger::Signal("ctrl-c"));
                }
                Err(err) => {
                    coordinator.trigger(ShutdownTrigger::Fatal(HostError::Signal(err).to_string()));
                }
            },
        }
    }))
}
