//! TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use zklink_core::constants::DEFAULT_TIMEOUT;

use crate::{error::*, resolve, Transport};

/// TCP transport for ZKTeco devices
///
/// Newer firmware (ZK8) listens on TCP 4370 and wraps every packet in an
/// 8-byte frame. The transport itself only moves bytes.
pub struct TcpTransport {
    host: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            read_timeout: Duration::from_secs(DEFAULT_TIMEOUT),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = match self.socket_addr {
            Some(addr) => addr,
            None => resolve(&self.host, self.port).await?,
        };

        debug!("Connecting to {} via TCP...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)??;

        // Small request/response packets; don't let Nagle hold them back
        stream.set_nodelay(true)?;

        debug!("Connected to {} via TCP", addr);

        self.socket_addr = Some(addr);
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            let _ = stream.shutdown().await;
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!(
            len = data.len(),
            bytes = %hex::encode(&data[..data.len().min(32)]),
            "TCP send"
        );

        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&mut self, max_len: usize) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::zeroed(max_len);

        let n = timeout(self.read_timeout, stream.read(&mut buf))
            .await
            .map_err(|_| {
                warn!("Read timeout after {:?}", self.read_timeout);
                Error::ReadTimeout
            })??;

        if n == 0 && max_len > 0 {
            return Err(Error::ConnectionClosed);
        }

        buf.truncate(n);

        trace!(
            len = n,
            bytes = %hex::encode(&buf[..n.min(32)]),
            "TCP receive"
        );

        Ok(buf)
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            debug!("TCP transport to {} dropped while connected", self.remote_addr());
        }
    }
}
