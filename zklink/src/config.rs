//! Connection settings

use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use zklink_core::{constants::DEFAULT_TIMEOUT, DEFAULT_PORT};

use crate::error::{Error, Result};

/// How to reach and talk to one terminal
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use zklink::DeviceConfig;
///
/// let config = DeviceConfig::new("192.168.1.201")
///     .with_password(1234)
///     .with_timeout(Duration::from_secs(5))
///     .with_force_udp(true);
///
/// assert_eq!(config.port(), 4370);
/// assert!(config.force_udp());
/// ```
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    host: String,
    port: u16,
    timeout: Duration,
    password: u32,
    force_udp: bool,
    omit_ping: bool,
    encoding: &'static Encoding,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            password: 0,
            force_udp: false,
            omit_ping: false,
            encoding: UTF_8,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Socket connect and read deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set CommKey password (default: 0)
    pub fn with_password(mut self, password: u32) -> Self {
        self.password = password;
        self
    }

    /// Skip the TCP probe and always use UDP
    pub fn with_force_udp(mut self, force_udp: bool) -> Self {
        self.force_udp = force_udp;
        self
    }

    /// Skip the ICMP reachability check
    pub fn with_omit_ping(mut self, omit_ping: bool) -> Self {
        self.omit_ping = omit_ping;
        self
    }

    /// Text encoding of names and ids stored on the device
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Select the text encoding by WHATWG label, e.g. `"cp1252"` or `"gbk"`
    pub fn with_encoding_label(self, label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| Error::Config(format!("unknown encoding '{}'", label)))?;
        Ok(self.with_encoding(encoding))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn password(&self) -> u32 {
        self.password
    }

    pub fn force_udp(&self) -> bool {
        self.force_udp
    }

    pub fn omit_ping(&self) -> bool {
        self.omit_ping
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}
