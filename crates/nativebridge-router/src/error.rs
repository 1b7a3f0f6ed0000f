use std::time::Duration;

use nativebridge_frame::{ErrorObject, FrameError};
use serde_json::Value;

/// Standard error codes used in native-channel error responses.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Errors returned to callers of [`MessageRouter`](crate::MessageRouter).
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Frame-level error while writing the request.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// No response arrived before the deadline.
    #[error("request '{method}' timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    /// The counterpart answered with an error response.
    #[error("counterpart error {}: {}", .0.code, .0.message)]
    Remote(ErrorObject),

    /// The counterpart's response broke the result-xor-error rule.
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),

    /// The native channel closed before the request settled.
    #[error("native channel disconnected")]
    Disconnected,
}

impl RouterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RouterError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

/// Error produced by a locally registered RPC method.
///
/// Converted into the `{code, message}` error shape on the wire with the
/// caller's id preserved.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_params(err.to_string())
    }
}

impl From<RpcError> for ErrorObject {
    fn from(err: RpcError) -> Self {
        ErrorObject {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}
