use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use nativebridge_frame::CloseReason;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub const EXIT_GRACEFUL: i32 = 0;
pub const EXIT_FATAL: i32 = 1;

/// Process lifecycle phase. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    Init = 0,
    Running = 1,
    ShuttingDown = 2,
    Terminated = 3,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Init,
            1 => LifecycleState::Running,
            2 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Terminated,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Init => "init",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the process is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// Explicit `shutdown` command on the native channel.
    Command,
    /// OS termination, interrupt, or hangup signal.
    Signal(&'static str),
    /// The native channel closed.
    Disconnect(CloseReason),
    /// An unrecoverable error.
    Fatal(String),
}

impl ShutdownTrigger {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownTrigger::Fatal(_) => EXIT_FATAL,
            _ => EXIT_GRACEFUL,
        }
    }

    pub fn is_graceful(&self) -> bool {
        self.exit_code() == EXIT_GRACEFUL
    }
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Command => f.write_str("shutdown command"),
            ShutdownTrigger::Signal(name) => write!(f, "signal {name}"),
            ShutdownTrigger::Disconnect(reason) => write!(f, "native channel closed ({reason:?})"),
            ShutdownTrigger::Fatal(message) => write!(f, "fatal error: {message}"),
        }
    }
}

/// Single funnel for every shutdown source.
///
/// The first [`trigger`](Self::trigger) moves `Init`/`Running` to
/// `ShuttingDown` by compare-and-set; all later calls are ignored.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: AtomicU8,
    trigger: OnceLock<ShutdownTrigger>,
    token: CancellationToken,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Init as u8),
            trigger: OnceLock::new(),
            token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Init → Running`. Fails if shutdown already began.
    pub fn mark_running(&self) -> bool {
        self.transition(LifecycleState::Init, LifecycleState::Running)
    }

    /// `ShuttingDown → Terminated`.
    pub fn mark_terminated(&self) -> bool {
        self.transition(LifecycleState::ShuttingDown, LifecycleState::Terminated)
    }

    /// Request shutdown. Returns `true` only for the call that won.
    pub fn trigger(&self, trigger: ShutdownTrigger) -> bool {
        let won = [LifecycleState::Running, LifecycleState::Init]
            .into_iter()
            .any(|from| self.transition(from, LifecycleState::ShuttingDown));
        if !won {
            tracing::debug!(%trigger, state = %self.state(), "ignoring shutdown trigger");
            return false;
        }

        match &trigger {
            ShutdownTrigger::Fatal(_) => tracing::error!(%trigger, "shutting down"),
            _ => tracing::info!(%trigger, "shutting down"),
        }
        let _ = self.trigger.set(trigger);
        self.token.cancel();
        true
    }

    /// The winning trigger, once there is one.
    pub fn reason(&self) -> Option<ShutdownTrigger> {
        self.trigger.get().cloned()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the first trigger.
    pub async fn wait(&self) -> ShutdownTrigger {
        self.token.cancelled().await;
        self.reason()
            .unwrap_or_else(|| ShutdownTrigger::Fatal("shutdown requested without a reason".into()))
    }

    /// Token cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn first_trigger_wins() {
        let coordinator = ShutdownCoordinator::new();
        assert!(coordinator.mark_running());

        assert!(coordinator.trigger(ShutdownTrigger::Signal("SIGTERM")));
        assert!(!coordinator.trigger(ShutdownTrigger::Fatal("late".into())));
        assert!(!coordinator.trigger(ShutdownTrigger::Command));

        assert_eq!(coordinator.state(), LifecycleState::ShuttingDown);
        assert_eq!(coordinator.reason(), Some(ShutdownTrigger::Signal("SIGTERM")));
    }

    #[test]
    fn fatal_during_startup_skips_running() {
        let coordinator = ShutdownCoordinator::new();
        assert!(coordinator.trigger(ShutdownTrigger::Fatal("bind failed".into())));
        assert!(!coordinator.mark_running());
        assert_eq!(coordinator.state(), LifecycleState::ShuttingDown);
    }

    #[test]
    fn terminated_only_after_shutting_down() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.mark_running();
        assert!(!coordinator.mark_terminated());

        coordinator.trigger(ShutdownTrigger::Command);
        assert!(coordinator.mark_terminated());
        assert_eq!(coordinator.state(), LifecycleState::Terminated);
        assert!(!coordinator.trigger(ShutdownTrigger::Command));
    }

    #[test]
    fn exit_codes_follow_trigger_kind() {
        assert_eq!(ShutdownTrigger::Command.exit_code(), EXIT_GRACEFUL);
        assert_eq!(ShutdownTrigger::Signal("SIGINT").exit_code(), EXIT_GRACEFUL);
        assert_eq!(
            ShutdownTrigger::Disconnect(CloseReason::Eof).exit_code(),
            EXIT_GRACEFUL
        );
        assert_eq!(
            ShutdownTrigger::Disconnect(CloseReason::Protocol("bad frame".into())).exit_code(),
            EXIT_GRACEFUL
        );
        assert_eq!(ShutdownTrigger::Fatal("boom".into()).exit_code(), EXIT_FATAL);
    }

    #[test]
    fn concurrent_triggers_have_one_winner() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        coordinator.mark_running();

        let winners: usize = (0..8)
            .map(|n| {
                let coordinator = Arc::clone(&coordinator);
                std::thread::spawn(move || {
                    coordinator.trigger(ShutdownTrigger::Fatal(format!("thread {n}")))
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| usize::from(handle.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn wait_returns_the_winner() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        coordinator.mark_running();

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.wait().await })
        };
        tokio::task::yield_now().await;
        coordinator.trigger(ShutdownTrigger::Disconnect(CloseReason::Eof));

        assert_eq!(
            waiter.await.unwrap(),
            ShutdownTrigger::Disconnect(CloseReason::Eof)
        );
    }
}
