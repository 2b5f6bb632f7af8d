//! Session bookkeeping for the ZKTeco protocol
//!
//! A session tracks:
//! - Session ID (assigned by device)
//! - Reply ID (advanced per command, echoed by the device)
//! - Connection state
//!
//! The state is a plain value owned by whoever drives the connection; nothing
//! here is shared between sessions.

use crate::{
    constants::INITIAL_REPLY_ID,
    error::{Error, Result},
    packet::{next_reply_id, PacketHeader},
};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected
    Disconnected,

    /// Socket open, CMD_CONNECT in flight
    Connecting,

    /// Device demanded a CommKey, CMD_AUTH in flight
    Unauthenticated,

    /// CommKey accepted
    Authenticated,

    /// Ready for commands
    Connected,
}

/// Session and reply ids of one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIds {
    session_id: u16,
    reply_id: u16,
    state: SessionState,
}

impl SessionIds {
    /// Create ids for a disconnected session
    pub fn new() -> Self {
        Self {
            session_id: 0,
            reply_id: INITIAL_REPLY_ID,
            state: SessionState::Disconnected,
        }
    }

    /// Get current session ID
    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    /// Reply id the next outbound packet is built from
    pub fn reply_id(&self) -> u16 {
        self.reply_id
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if ready for commands
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Start a handshake: ids go back to their initial values
    pub fn begin(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot connect from state: {:?}",
                self.state
            )));
        }

        self.session_id = 0;
        self.reply_id = INITIAL_REPLY_ID;
        self.state = SessionState::Connecting;
        Ok(())
    }

    /// Record the session id the device assigned in its CMD_CONNECT reply
    pub fn assign(&mut self, session_id: u16) {
        self.session_id = session_id;
    }

    /// Device demanded authentication
    pub fn challenge(&mut self) -> Result<()> {
        if self.state != SessionState::Connecting {
            return Err(Error::InvalidSessionState(format!(
                "Cannot authenticate from state: {:?}",
                self.state
            )));
        }

        self.state = SessionState::Unauthenticated;
        Ok(())
    }

    /// Device accepted the CommKey
    pub fn authenticate(&mut self) -> Result<()> {
        if self.state != SessionState::Unauthenticated {
            return Err(Error::InvalidSessionState(format!(
                "Cannot accept key from state: {:?}",
                self.state
            )));
        }

        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Handshake finished successfully
    pub fn establish(&mut self) -> Result<()> {
        match self.state {
            SessionState::Connecting | SessionState::Authenticated => {
                self.state = SessionState::Connected;
                Ok(())
            }
            other => Err(Error::InvalidSessionState(format!(
                "Cannot establish from state: {:?}",
                other
            ))),
        }
    }

    /// Close session
    pub fn close(&mut self) {
        self.session_id = 0;
        self.reply_id = INITIAL_REPLY_ID;
        self.state = SessionState::Disconnected;
    }

    /// Reply id for the next outbound packet
    ///
    /// The counter moves on immediately; a reply later overrides it with
    /// whatever the device echoed.
    pub fn advance(&mut self) -> u16 {
        let current = self.reply_id;
        self.reply_id = next_reply_id(current);
        current
    }

    /// Adopt the reply id echoed in a response header
    pub fn adopt(&mut self, header: &PacketHeader) {
        self.reply_id = header.reply_id;
    }
}

impl Default for SessionIds {
    fn default() -> Self {
        Self::new()
    }
}
