//! High-level device interface

use std::fmt;

use bytes::Bytes;
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use zklink_core::{constants::data_types::FCT_USER, Command};
use zklink_types::{
    decode_capacities, decode_time4, decode_user_table, encode_time4, DeviceCapacities,
    DeviceInfo, NetworkParams, UserListing,
};

use crate::{
    config::DeviceConfig,
    error::{Error, Result},
    link::Framing,
    session::{option_request, option_value, Session},
};

/// Integer value of an option, 0 when empty or not a number
fn parse_flag(value: &[u8]) -> i32 {
    String::from_utf8_lossy(value).trim().parse().unwrap_or(0)
}

fn lossy(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

/// ZKTeco device
///
/// High-level interface for communicating with ZKTeco biometric devices.
///
/// # Examples
///
/// ```no_run
/// use zklink::{Device, DeviceConfig};
///
/// #[tokio::main]
/// async fn main() -> zklink::Result<()> {
///     let mut device = Device::new(DeviceConfig::new("192.168.1.201"));
///
///     device.connect().await?;
///     println!("Connected!");
///
///     let info = device.get_device_info().await?;
///     println!("Device: {}", info);
///
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Device {
    session: Session,
    capacities: DeviceCapacities,
    next_uid: u32,
    next_user_id: String,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Self {
        Self::from_session(Session::new(config))
    }

    /// Wrap an existing session, e.g. one with a custom probe
    pub fn from_session(session: Session) -> Self {
        Self {
            session,
            capacities: DeviceCapacities::default(),
            next_uid: 1,
            next_user_id: "1".to_string(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Counters from the last `read_sizes`
    pub fn capacities(&self) -> &DeviceCapacities {
        &self.capacities
    }

    /// Uid for the next enrollment, as of the last `get_users`
    pub fn next_uid(&self) -> u32 {
        self.next_uid
    }

    pub fn next_user_id(&self) -> &str {
        &self.next_user_id
    }

    /// Connect to device
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The host is unreachable or the link fails
    /// - Authentication required and the password is wrong
    /// - The device refuses the connection
    pub async fn connect(&mut self) -> Result<()> {
        self.session.connect().await
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect().await
    }

    async fn simple(
        &mut self,
        command: Command,
        payload: &[u8],
        operation: &'static str,
    ) -> Result<()> {
        self.session
            .send_command(command, payload, 8)
            .await?
            .ensure(operation)?;
        Ok(())
    }

    /// Enable device (normal operation mode)
    pub async fn enable_device(&mut self) -> Result<()> {
        self.simple(Command::EnableDevice, &[], "can't enable device").await?;
        debug!("Device enabled");
        Ok(())
    }

    /// Disable device (show "Working..." on LCD)
    pub async fn disable_device(&mut self) -> Result<()> {
        self.simple(Command::DisableDevice, &[], "can't disable device").await?;
        debug!("Device disabled");
        Ok(())
    }

    /// Restart device
    ///
    /// The device drops the connection shortly after acknowledging.
    pub async fn restart(&mut self) -> Result<()> {
        warn!("Restarting device...");
        self.simple(Command::Restart, &[], "can't restart device").await
    }

    /// Release the door lock for `seconds`
    pub async fn unlock(&mut self, seconds: u32) -> Result<()> {
        let tenths = seconds.saturating_mul(10);
        self.simple(Command::Unlock, &tenths.to_le_bytes(), "can't open door")
            .await?;
        info!("Door unlocked for {}s", seconds);
        Ok(())
    }

    pub async fn get_time(&mut self) -> Result<NaiveDateTime> {
        let response = self
            .session
            .send_command(Command::GetTime, &[], 1032)
            .await?
            .ensure("can't get time")?;
        Ok(decode_time4(&response.payload)?)
    }

    pub async fn set_time(&mut self, time: &NaiveDateTime) -> Result<()> {
        let packed = encode_time4(time);
        self.simple(Command::SetTime, &packed.to_le_bytes(), "can't set time")
            .await
    }

    pub async fn free_data(&mut self) -> Result<()> {
        self.session.free_data().await
    }

    pub async fn read_with_buffer(
        &mut self,
        command: Command,
        fct: i32,
        ext: i32,
    ) -> Result<Bytes> {
        self.session.read_with_buffer(command, fct, ext).await
    }

    pub async fn send_with_buffer(&mut self, buffer: &[u8]) -> Result<()> {
        self.session.send_with_buffer(buffer).await
    }

    /// Option value, or `Protocol(operation)` when the device refuses
    async fn required_option(&mut self, key: &str, operation: &'static str) -> Result<Bytes> {
        let response = self.session.query_option(key).await?.ensure(operation)?;
        Ok(option_value(&response.payload))
    }

    /// Numeric flag option; a refusal is answered with `clear_error`
    async fn flag_option(&mut self, key: &str) -> Result<Option<i32>> {
        let response = self.session.query_option(key).await?;
        if response.status {
            return Ok(Some(parse_flag(&option_value(&response.payload))));
        }

        debug!("Option {} refused, clearing error state", key);
        self.clear_error(&option_request(key)).await?;
        Ok(None)
    }

    /// Get the platform name, e.g. `ZMM220_TFT`
    pub async fn get_platform(&mut self) -> Result<String> {
        let value = self.required_option("~Platform", "can't get platform").await?;
        Ok(lossy(&value).replace('=', ""))
    }

    pub async fn get_mac(&mut self) -> Result<String> {
        let value = self.required_option("MAC", "can't get mac").await?;
        Ok(lossy(&value))
    }

    /// Device name, empty when the device has none
    pub async fn get_device_name(&mut self) -> Result<String> {
        Ok(self
            .session
            .get_option("~DeviceName")
            .await?
            .map(|value| lossy(&value))
            .unwrap_or_default())
    }

    /// Fingerprint algorithm version (usually 10)
    pub async fn get_fp_version(&mut self) -> Result<Option<i32>> {
        Ok(self
            .session
            .get_option("~ZKFPVersion")
            .await?
            .map(|value| {
                let digits: Vec<u8> = value.iter().copied().filter(|&b| b != b'=').collect();
                parse_flag(&digits)
            }))
    }

    pub async fn get_face_version(&mut self) -> Result<Option<i32>> {
        Ok(self
            .session
            .get_option("ZKFaceVersion")
            .await?
            .map(|value| parse_flag(&value)))
    }

    pub async fn get_extend_fmt(&mut self) -> Result<Option<i32>> {
        self.flag_option("~ExtendFmt").await
    }

    pub async fn get_user_extend_fmt(&mut self) -> Result<Option<i32>> {
        self.flag_option("~UserExtFmt").await
    }

    pub async fn get_face_fun_on(&mut self) -> Result<Option<i32>> {
        self.flag_option("FaceFunOn").await
    }

    pub async fn get_compat_old_firmware(&mut self) -> Result<Option<i32>> {
        self.flag_option("CompatOldFirmware").await
    }

    /// Bring the device back after it refused a request
    ///
    /// ACK_ERROR once, then ACK_UNKNOWN three times, each carrying `payload`.
    /// The device answers every one with ACK_UNKNOWN.
    pub async fn clear_error(&mut self, payload: &[u8]) -> Result<()> {
        self.session.send_command(Command::AckError, payload, 1024).await?;
        for _ in 0..3 {
            self.session
                .send_command(Command::AckUnknown, payload, 1024)
                .await?;
        }
        Ok(())
    }

    /// IP address, netmask and gateway
    ///
    /// Values the device does not report fall back to the configured host
    /// (address) or stay empty.
    pub async fn get_network_params(&mut self) -> Result<NetworkParams> {
        let ip = match self.session.get_option("IPAddress").await? {
            Some(value) => lossy(&value),
            None => self.session.config().host().to_string(),
        };
        let mask = self.session.get_option("NetMask").await?;
        let gateway = self.session.get_option("GATEIPAddress").await?;

        Ok(NetworkParams {
            ip,
            mask: mask.map(|v| lossy(&v)).unwrap_or_default(),
            gateway: gateway.map(|v| lossy(&v)).unwrap_or_default(),
        })
    }

    /// Number of digits a user id may have
    pub async fn get_pin_width(&mut self) -> Result<u8> {
        let response = self
            .session
            .send_command(Command::GetPinWidth, b" P", 9)
            .await?
            .ensure("can't get pin width")?;

        let end = response
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(response.payload.len());

        response.payload[..end]
            .first()
            .copied()
            .ok_or_else(|| Error::protocol("can't get pin width", response.code))
    }

    /// Read the record counters and capacities
    pub async fn read_sizes(&mut self) -> Result<DeviceCapacities> {
        let response = self
            .session
            .send_command(Command::GetFreeSizes, &[], 1024)
            .await?
            .ensure("can't read sizes")?;

        let decoded = decode_capacities(&response.payload);
        for warning in &decoded.warnings {
            warn!("Capacity block: {}", warning);
        }

        self.capacities = decoded.into_value();
        debug!("Sizes: {}", self.capacities);
        Ok(self.capacities)
    }

    /// Read every enrolled user
    ///
    /// Refreshes the counters first; the record width found in the table
    /// becomes the session's user packet size.
    pub async fn get_users(&mut self) -> Result<UserListing> {
        self.read_sizes().await?;

        let count = self.capacities.users;
        if count <= 0 {
            debug!("Device reports no users");
            self.next_uid = 1;
            self.next_user_id = "1".to_string();
            return Ok(UserListing::empty());
        }

        let data = self
            .session
            .read_with_buffer(Command::UserTempRrq, FCT_USER, 0)
            .await?;

        let encoding = self.session.config().encoding();
        let listing = decode_user_table(&data, count as usize, encoding)?;

        if let Some(width) = listing.record_width {
            self.session.set_user_packet_size(width);
        }
        self.next_uid = listing.next_uid;
        self.next_user_id = listing.next_user_id.clone();

        info!("Read {} users", listing.users.len());
        Ok(listing)
    }

    /// Get device information
    ///
    /// Platform, name, MAC, algorithm versions, pin width and network setup.
    pub async fn get_device_info(&mut self) -> Result<DeviceInfo> {
        let info = DeviceInfo {
            platform: self.get_platform().await?,
            device_name: self.get_device_name().await?,
            mac_address: self.get_mac().await?,
            fp_version: self.get_fp_version().await?,
            face_version: self.get_face_version().await?,
            pin_width: self.get_pin_width().await?,
            network: self.get_network_params().await?,
        };

        debug!("Device info: {}", info);
        Ok(info)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.session.config();
        let framing = self.session.framing().unwrap_or(if config.force_udp() {
            Framing::Udp
        } else {
            Framing::Tcp
        });
        let caps = &self.capacities;

        write!(
            f,
            "ZK {}://{}:{} users[{}]:{}/{} fingers:{}/{}, records:{}/{} faces:{}/{}",
            framing,
            config.host(),
            config.port(),
            self.session.user_packet_size(),
            caps.users,
            caps.users_cap,
            caps.fingers,
            caps.fingers_cap,
            caps.records,
            caps.rec_cap,
            caps.faces,
            caps.faces_cap
        )
    }
}
