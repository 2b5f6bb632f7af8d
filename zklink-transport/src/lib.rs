//! Transport layer for ZKTeco protocol
//!
//! Provides TCP/UDP communication with devices and the reachability
//! checks used to pick between them.

pub mod error;
pub mod probe;
pub mod tcp;
pub mod udp;

pub use error::{Error, Result};
pub use probe::{HostProbe, SystemProbe};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use async_trait::async_trait;
use bytes::BytesMut;

/// Byte-level socket seam
///
/// Implementations never interpret what they carry; framing is left to the
/// caller. Reads honour the transport's configured read timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive at most `max_len` bytes
    ///
    /// Stream transports return whatever a single read yields; datagram
    /// transports return one datagram truncated to `max_len`.
    async fn receive(&mut self, max_len: usize) -> Result<BytesMut>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}

/// Resolve `host:port` to the first socket address it names
pub(crate) async fn resolve(host: &str, port: u16) -> Result<std::net::SocketAddr> {
    let addr_str = format!("{}:{}", host, port);

    let mut addrs = tokio::net::lookup_host(&addr_str)
        .await
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?;

    addrs
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))
}
