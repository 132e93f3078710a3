//! Network module - Owns the single outbound connection to the effect viewer
//!
//! Provides:
//! - Client for connecting, pushing frames and disconnecting
//! - Shared connection state with a single guarded teardown path
//! - Liveness watcher that notices when the viewer goes away

mod client;
mod connection;
mod watcher;

pub use client::*;
pub use connection::{ConnectionState, ConnectionStats};

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Connection timeout in milliseconds (0 leaves it to the OS)
    pub connect_timeout_ms: u64,
    /// Disable Nagle's algorithm on the connection
    pub nodelay: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            nodelay: true,
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

/// Maps a host string to a connectable address
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr>;
}

/// Resolver backed by the system: IP literals first, DNS second
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr> {
        resolve_host(host, port).await
    }
}

/// Resolve a hostname to a socket address
///
/// IPv4 results are preferred when DNS returns several families.
pub async fn resolve_host(host: &str, port: u16) -> io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Could not resolve host: {}", host),
            )
        })
}
