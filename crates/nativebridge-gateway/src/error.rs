use std::net::SocketAddr;
use std::time::Duration;

use nativebridge_router::RouterError;

/// Listener lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Another process holds the port. The native channel keeps working
    /// without the gateway.
    #[error("gateway address {addr} already in use")]
    AddressInUse {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Any other bind failure.
    #[error("failed to bind gateway on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl GatewayError {
    /// Whether startup may continue with the gateway absent.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GatewayError::AddressInUse { .. })
    }

    pub(crate) fn from_bind(addr: SocketAddr, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::AddrInUse {
            GatewayError::AddressInUse { addr, source }
        } else {
            GatewayError::Bind { addr, source }
        }
    }
}

/// Errors raised while building the capability registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A capability with this name is already registered.
    #[error("capability '{0}' is already registered")]
    Duplicate(String),

    /// The input schema is not valid JSON or not a valid JSON Schema.
    #[error("invalid input schema for capability '{name}': {message}")]
    InvalidSchema { name: String, message: String },
}

/// Errors raised while invoking a capability.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// No capability is registered under this name.
    #[error("capability not found: {0}")]
    NotFound(String),

    /// The arguments failed the capability's input schema.
    #[error("invalid arguments for '{name}': {message}")]
    InvalidArguments { name: String, message: String },

    /// The capability did not finish within its deadline.
    #[error("capability '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The native call behind the capability failed.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// The capability failed for another reason.
    #[error("{0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
