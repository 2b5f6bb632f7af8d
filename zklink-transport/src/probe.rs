//! Reachability checks run before a session picks its transport

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;
use zklink_core::constants::PROBE_TIMEOUT;

/// Answers "is the device there, and does it speak TCP?"
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// True when the host answers an ICMP echo
    async fn ping(&self, host: &str) -> bool;

    /// True when a TCP connection to `host:port` can be opened
    async fn tcp_open(&self, host: &str, port: u16) -> bool;
}

/// Probe backed by the system `ping` binary and a plain TCP connect
#[derive(Debug, Clone)]
pub struct SystemProbe {
    connect_timeout: Duration,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(PROBE_TIMEOUT),
        }
    }

    /// Set how long the TCP probe waits for the handshake
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn ping_args(host: &str) -> Vec<&str> {
    if cfg!(windows) {
        vec!["-n", "1", host]
    } else {
        vec!["-c", "1", "-W", "5", host]
    }
}

#[async_trait]
impl HostProbe for SystemProbe {
    async fn ping(&self, host: &str) -> bool {
        let status = Command::new("ping")
            .args(ping_args(host))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("Can't run ping: {}", e);
                false
            }
        }
    }

    async fn tcp_open(&self, host: &str, port: u16) -> bool {
        let addr = format!("{}:{}", host, port);
        match timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("TCP probe to {} failed: {}", addr, e);
                false
            }
            Err(_) => {
                debug!("TCP probe to {} timed out", addr);
                false
            }
        }
    }
}
