//! Device information structures

use std::fmt;

/// Network settings stored on the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkParams {
    pub ip: String,
    pub mask: String,
    pub gateway: String,
}

/// Device information
///
/// Assembled from several option queries; a field is `None` when the
/// terminal refused to answer for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Platform name, e.g. `ZMM220_TFT`
    pub platform: String,

    /// Device name (empty when the device has none)
    pub device_name: String,

    /// MAC address
    pub mac_address: String,

    /// Fingerprint algorithm version
    pub fp_version: Option<i32>,

    /// Face algorithm version
    pub face_version: Option<i32>,

    /// Number of digits in a user PIN
    pub pin_width: u8,

    /// Network configuration
    pub network: NetworkParams,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[{} '{}' MAC: {}, IP: {}]",
            self.platform, self.device_name, self.mac_address, self.network.ip
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let info = DeviceInfo {
            platform: "ZMM220_TFT".into(),
            device_name: "Front door".into(),
            mac_address: "00:17:61:01:02:03".into(),
            network: NetworkParams {
                ip: "192.168.1.201".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(
            info.to_string(),
            "Device[ZMM220_TFT 'Front door' MAC: 00:17:61:01:02:03, IP: 192.168.1.201]"
        );
    }
}
