//! Native-messaging host that bridges a browser extension to external
//! HTTP JSON-RPC clients.
//!
//! # Crate Structure
//!
//! - [`frame`]: length-prefixed JSON framing over stdio
//! - [`router`]: request/response correlation and handler dispatch
//! - [`gateway`]: capability registry and HTTP JSON-RPC endpoint
//! - [`host`]: single-instance marker, signals, and shutdown sequencing

/// Re-export frame types.
pub mod frame {
    pub use nativebridge_frame::*;
}

/// Re-export router types.
pub mod router {
    pub use nativebridge_router::*;
}

/// Re-export gateway types.
pub mod gateway {
    pub use nativebridge_gateway::*;
}

/// Re-export lifecycle types.
pub mod host {
    pub use nativebridge_host::*;
}
