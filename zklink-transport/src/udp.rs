//! UDP transport for ZKTeco devices
//!
//! Older firmware (ZK6) only answers on UDP 4370. Each packet travels as a
//! single datagram without the TCP frame.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use zklink_core::constants::DEFAULT_TIMEOUT;

use crate::{error::*, resolve, Transport};

/// Largest datagram accepted from a device
const MAX_DATAGRAM: usize = 65_535;

/// UDP transport for ZKTeco devices
pub struct UdpTransport {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
    remote_addr: Option<SocketAddr>,
    read_timeout: Duration,
}

impl UdpTransport {
    /// Create new UDP transport
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket: None,
            remote_addr: None,
            read_timeout: Duration::from_secs(DEFAULT_TIMEOUT),
        }
    }

    /// Set read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let remote = match self.remote_addr {
            Some(addr) => addr,
            None => resolve(&self.host, self.port).await?,
        };

        debug!("Connecting to {} via UDP...", remote);

        let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;

        // Fixes the peer for send/recv; datagrams from anyone else are dropped
        socket.connect(remote).await?;

        debug!("Connected to {} via UDP", remote);

        self.remote_addr = Some(remote);
        self.socket = Some(socket);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            debug!("Disconnecting from {}...", self.remote_addr());
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        trace!(
            len = data.len(),
            bytes = %hex::encode(&data[..data.len().min(32)]),
            "UDP send"
        );

        socket.send(data).await?;

        Ok(())
    }

    async fn receive(&mut self, max_len: usize) -> Result<BytesMut> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        // Read the whole datagram; a short buffer would fail on some platforms
        let mut buf = BytesMut::zeroed(MAX_DATAGRAM);

        let n = timeout(self.read_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| {
                warn!("Read timeout after {:?}", self.read_timeout);
                Error::ReadTimeout
            })?
            .map_err(|e| {
                warn!("Read error: {}", e);
                Error::Io(e)
            })?;

        if n > max_len {
            debug!(received = n, max_len, "Truncating oversized datagram");
        }
        buf.truncate(n.min(max_len));

        trace!(
            len = buf.len(),
            bytes = %hex::encode(&buf[..buf.len().min(32)]),
            "UDP receive"
        );

        Ok(buf)
    }

    fn remote_addr(&self) -> String {
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }
}
