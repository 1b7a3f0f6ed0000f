use std::fmt;
use std::io;

use nativebridge_host::{HostError, EXIT_FATAL, EXIT_GRACEFUL};

pub const SUCCESS: i32 = EXIT_GRACEFUL;
pub const FAILURE: i32 = EXIT_FATAL;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(FAILURE, format!("{context}: {err}"))
}

pub fn host_error(context: &str, err: HostError) -> CliError {
    CliError::new(FAILURE, format!("{context}: {err}"))
}
