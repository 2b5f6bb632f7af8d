//! # zklink-core
//!
//! Core protocol implementation for ZKTeco biometric devices.
//!
//! This crate provides the low-level protocol primitives:
//! - Packet header and TCP frame encoding/decoding
//! - Checksum calculation
//! - Command codes
//! - CommKey authentication key derivation
//! - Session id / reply id bookkeeping

pub mod auth;
pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod packet;
pub mod session;

pub use auth::derive_key;
pub use command::Command;
pub use error::{Error, Result};
pub use packet::{PacketHeader, TcpFrame};
pub use session::{SessionIds, SessionState};

/// Default device port
pub const DEFAULT_PORT: u16 = 4370;

/// Packet header size
pub const HEADER_SIZE: usize = 8;

/// TCP frame prefix size
pub const TCP_FRAME_SIZE: usize = 8;
