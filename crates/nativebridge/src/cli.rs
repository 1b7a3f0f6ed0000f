use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use nativebridge_gateway::{GatewayConfig, DEFAULT_PORT};
use nativebridge_host::{BridgeConfig, ProcessMarker};

use crate::logging::{LogFormat, LogLevel};
use crate::output::OutputFormat;

/// The browser launches the host with its own positional arguments (caller
/// origin, manifest path, extension id), so there are no subcommands.
#[derive(Parser, Debug)]
#[command(
    name = "nativebridge",
    version,
    about = "Native-messaging host bridging a browser extension to HTTP JSON-RPC clients"
)]
pub struct Cli {
    /// Gateway listening port.
    #[arg(long, env = "NATIVEBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Gateway listening address.
    #[arg(long, env = "NATIVEBRIDGE_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Also expose network capture, script injection, and console capture.
    #[arg(long, env = "NATIVEBRIDGE_EXTENDED")]
    pub extended_capabilities: bool,

    /// Deployment label recorded in logs and status.
    #[arg(long, env = "NATIVEBRIDGE_MODE", default_value = "production")]
    pub mode: String,

    /// Pid marker location. Default: <tmp>/nativebridge.pid.
    #[arg(long, env = "NATIVEBRIDGE_MARKER", value_name = "PATH")]
    pub marker_path: Option<PathBuf>,

    /// Default native request timeout (e.g. 30s, 500ms).
    #[arg(
        long,
        env = "NATIVEBRIDGE_REQUEST_TIMEOUT",
        default_value = "30s",
        value_parser = parse_duration
    )]
    pub request_timeout: Duration,

    /// Log output format (stderr).
    #[arg(long, env = "NATIVEBRIDGE_LOG_FORMAT", value_name = "FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, env = "NATIVEBRIDGE_LOG_LEVEL", value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Print the marker status and exit (0 when an instance is live).
    #[arg(long)]
    pub status: bool,

    /// Output format for --status.
    #[arg(long, value_name = "FORMAT", requires = "status")]
    pub format: Option<OutputFormat>,

    /// Window handle passed by Chrome on Windows.
    #[arg(long, hide = true)]
    pub parent_window: Option<String>,

    /// Arguments supplied by the browser; ignored.
    #[arg(value_name = "BROWSER_ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub browser_args: Vec<String>,
}

impl Cli {
    pub fn marker_path(&self) -> PathBuf {
        self.marker_path
            .clone()
            .unwrap_or_else(ProcessMarker::default_path)
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            gateway: GatewayConfig {
                host: self.host,
                port: self.port,
                ..GatewayConfig::default()
            },
            extended_capabilities: self.extended_capabilities,
            marker_path: self.marker_path(),
            request_timeout: self.request_timeout,
            mode: self.mode.clone(),
            ..BridgeConfig::default()
        }
    }
}

fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
