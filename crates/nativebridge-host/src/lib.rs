//! Process lifecycle for the native bridge.
//!
//! [`ProcessLifecycleManager`] enforces a single instance through a pid
//! marker, wires the native channel to the capability gateway, and funnels
//! every shutdown source (native command, OS signal, channel close, fatal
//! error) through one [`ShutdownCoordinator`] so cleanup runs exactly once.

pub mod commands;
pub mod context;
pub mod error;
pub mod lifecycle;
mod manager;
pub mod marker;
pub mod signals;

pub use context::{BridgeConfig, BridgeContext};
pub use error::{HostError, Result};
pub use lifecycle::{
    LifecycleState, ShutdownCoordinator, ShutdownTrigger, EXIT_FATAL, EXIT_GRACEFUL,
};
pub use manager::ProcessLifecycleManager;
pub use marker::{process_alive, MarkerGuard, MarkerStatus, ProcessMarker, DEFAULT_MARKER_NAME};
