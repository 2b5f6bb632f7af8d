//! Type definitions for zklink
//!
//! Records read from a terminal and the binary codec that produces them:
//! capacity counters, user tables in both record widths and the device's
//! packed timestamps.

pub mod capacities;
pub mod device_info;
pub mod error;
pub mod time;
pub mod user;
pub mod warning;

pub use capacities::{decode_capacities, DeviceCapacities};
pub use device_info::{DeviceInfo, NetworkParams};
pub use error::{Error, Result};
pub use time::{decode_time4, decode_time6, encode_time4};
pub use user::{decode_user_table, decode_users, UserListing, UserRecord};
pub use warning::{DecodeWarning, Decoded};
