//! Capacity counters reported by CMD_GET_FREE_SIZES

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::warning::{DecodeWarning, Decoded};

/// Size of the counter block: 20 little-endian i32
pub const COUNTER_BLOCK: usize = 80;

/// Size of the optional face block that may follow it: 3 i32
pub const FACE_BLOCK: usize = 12;

/// Record counts and capacities of a terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCapacities {
    pub users: i32,
    pub fingers: i32,
    pub records: i32,
    /// Unknown counter, kept for completeness
    pub dummy: i32,
    pub cards: i32,
    pub fingers_cap: i32,
    pub users_cap: i32,
    pub rec_cap: i32,
    pub fingers_av: i32,
    pub users_av: i32,
    pub rec_av: i32,
    pub faces: i32,
    pub faces_cap: i32,
}

impl fmt::Display for DeviceCapacities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "users:{}/{} fingers:{}/{} records:{}/{} faces:{}/{}",
            self.users,
            self.users_cap,
            self.fingers,
            self.fingers_cap,
            self.records,
            self.rec_cap,
            self.faces,
            self.faces_cap
        )
    }
}

/// Decode the payload of a CMD_GET_FREE_SIZES reply
///
/// Blocks the input cannot cover are left at zero. A missing face block is
/// normal for fingerprint-only terminals and is not reported.
pub fn decode_capacities(bytes: &[u8]) -> Decoded<DeviceCapacities> {
    let mut decoded = Decoded::new(DeviceCapacities::default());

    if bytes.len() < COUNTER_BLOCK {
        decoded.warn(DecodeWarning::ShortCapacityBlock {
            available: bytes.len(),
        });
        return decoded;
    }

    let mut fields = [0i32; 20];
    LittleEndian::read_i32_into(&bytes[..COUNTER_BLOCK], &mut fields);

    let caps = &mut decoded.value;
    caps.users = fields[4];
    caps.fingers = fields[6];
    caps.records = fields[8];
    caps.dummy = fields[10];
    caps.cards = fields[12];
    caps.fingers_cap = fields[14];
    caps.users_cap = fields[15];
    caps.rec_cap = fields[16];
    caps.fingers_av = fields[17];
    caps.users_av = fields[18];
    caps.rec_av = fields[19];

    let rest = &bytes[COUNTER_BLOCK..];
    if rest.len() >= FACE_BLOCK {
        let mut face = [0i32; 3];
        LittleEndian::read_i32_into(&rest[..FACE_BLOCK], &mut face);
        caps.faces = face[0];
        caps.faces_cap = face[2];
    }

    decoded
}
