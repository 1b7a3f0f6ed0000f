use std::path::PathBuf;

use nativebridge_gateway::{GatewayError, RegistryError};

/// Errors that stop the bridge from starting or running.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The marker names a live process.
    #[error("another instance is running (pid {pid}, marker {})", path.display())]
    DuplicateInstance { pid: u32, path: PathBuf },

    /// The marker file could not be read, written, or removed.
    #[error("marker file {}: {source}", path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The gateway failed to bind for a reason other than a busy port.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The capability catalog could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// OS signal listeners could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

impl HostError {
    pub(crate) fn marker(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HostError::Marker {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
