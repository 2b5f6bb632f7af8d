//! High-level error types

use zklink_core::Command;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] zklink_transport::Error),

    /// Network-level failure detected by the engine itself
    #[error("Network error: {0}")]
    Network(String),

    /// Device answered, but not with success
    #[error("{operation}: device answered {}", code_name(.code))]
    Protocol { operation: &'static str, code: u16 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Can't connect: device answered {}", code_name(.code))]
    Connect { code: u16 },

    #[error("Core protocol error: {0}")]
    Core(#[from] zklink_core::Error),

    #[error("Type error: {0}")]
    Types(#[from] zklink_types::Error),

    #[error("Device not connected")]
    NotConnected,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

fn code_name(code: &u16) -> String {
    Command::describe(*code)
}

impl Error {
    pub(crate) fn protocol(operation: &'static str, code: u16) -> Self {
        Self::Protocol { operation, code }
    }

    /// True for failures of the link itself (unreachable, timeout, broken
    /// framing), as opposed to a device refusing a request
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_message_names_code() {
        let err = Error::protocol("can't disconnect", 2001);
        assert_eq!(err.to_string(), "can't disconnect: device answered CMD_ACK_ERROR(2001)");
        assert!(!err.is_network());
    }

    #[test]
    fn test_network_grouping() {
        assert!(Error::Network("TCP packet invalid".into()).is_network());
        assert!(Error::from(zklink_transport::Error::ReadTimeout).is_network());
        assert!(!Error::Authentication("Unauthenticated".into()).is_network());
    }
}
