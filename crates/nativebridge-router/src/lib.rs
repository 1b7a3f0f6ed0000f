//! Request/response correlation over a native-messaging channel.
//!
//! [`MessageRouter`] sits on top of the framed transport. It pairs outbound
//! calls with their responses by id, runs locally registered RPC methods for
//! inbound calls, and hands notifications to listeners keyed by `type`.

pub mod error;
mod handler;
mod pending;
pub mod router;

pub use error::{codes, Result, RouterError, RpcError};
pub use router::{MessageRouter, RouterConfig, RpcRequest, DEFAULT_REQUEST_TIMEOUT};
