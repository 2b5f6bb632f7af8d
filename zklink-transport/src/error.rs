//! Socket-level errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the socket itself
///
/// Every variant counts as a network failure one level up: the session
/// drops the link when it sees any of them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Socket not open")]
    NotConnected,

    #[error("Socket already open")]
    AlreadyConnected,

    /// Connect did not finish within the configured deadline
    #[error("Timed out connecting to device")]
    ConnectionTimeout,

    /// No reply within the configured deadline
    #[error("Timed out waiting for device reply")]
    ReadTimeout,

    #[error("Device closed the connection")]
    ConnectionClosed,

    #[error("Socket I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Can't resolve device address: {0}")]
    InvalidAddress(String),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout | Self::ReadTimeout)
    }
}
