//! # zklink
//!
//! Protocol engine for ZKTeco time-and-attendance terminals.
//!
//! ## Features
//!
//! - UDP and TCP framing, chosen automatically on connect
//! - CommKey challenge authentication
//! - Chunked buffered transfers with bounded retry
//! - Decoding of user tables, capacity counters and device time
//! - Async/await API using Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use zklink::{Device, DeviceConfig};
//!
//! #[tokio::main]
//! async fn main() -> zklink::Result<()> {
//!     // Connect to device
//!     let mut device = Device::new(DeviceConfig::new("192.168.1.201"));
//!     device.connect().await?;
//!
//!     // Read the enrolled users
//!     let listing = device.get_users().await?;
//!     for user in &listing.users {
//!         println!("{}", user);
//!     }
//!
//!     // Disconnect
//!     device.disconnect().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod link;
pub mod retry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use buffer::BufferedTransfer;
pub use config::DeviceConfig;
pub use device::Device;
pub use error::{Error, Result};
pub use link::Framing;
pub use session::{CommandResponse, Session};

// Re-export types
pub use zklink_core::{Command, SessionState};
pub use zklink_transport::{HostProbe, SystemProbe, Transport};
pub use zklink_types::{
    DecodeWarning, DeviceCapacities, DeviceInfo, NetworkParams, UserListing, UserRecord,
};
