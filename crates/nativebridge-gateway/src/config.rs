use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default listening port for the external RPC endpoint.
pub const DEFAULT_PORT: u16 = 12306;

/// Where and how the gateway listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Interface to bind. Loopback by default.
    pub host: IpAddr,
    /// TCP port; `0` picks an ephemeral port.
    pub port: u16,
    /// Time allowed for in-flight HTTP requests to finish on shutdown.
    pub drain_timeout: Duration,
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            drain_timeout: Duration::from_secs(5),
        }
    }
}
