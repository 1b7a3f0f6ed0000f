//! External RPC gateway for the native bridge.
//!
//! A [`CapabilityRegistry`] holds named, schema-checked operations; an
//! [`ExternalServiceGateway`] serves them over HTTP JSON-RPC. The
//! [`catalog`] module wires the standard browser-automation set to a
//! [`MessageRouter`](nativebridge_router::MessageRouter) so each external call
//! becomes one native request.

pub mod capability;
pub mod catalog;
pub mod config;
pub mod error;
mod protocol;
pub mod server;

pub use capability::{Capability, CapabilityRegistry, DEFAULT_CAPABILITY_TIMEOUT};
pub use catalog::{catalog_names, register_catalog, CALL_TOOL_METHOD};
pub use config::{GatewayConfig, DEFAULT_PORT};
pub use error::{CapabilityError, GatewayError, RegistryError, Result};
pub use protocol::{CAPABILITY_NOT_FOUND, PROTOCOL_VERSION};
pub use server::{ExternalServiceGateway, StartOutcome, PING_ENDPOINT, RPC_ENDPOINT};
