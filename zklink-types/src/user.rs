//! Enrolled user records
//!
//! The user table comes in two record widths:
//!
//! ```text
//! 28 bytes (ZK6)  uid:u16 privilege:u8 password[5] name[8] card:u32 pad
//!                 group:u8 timezone:i16 user_id:u32
//! 72 bytes (ZK8)  uid:u16 privilege:u8 password[8] name[24] card:u32 pad
//!                 group[7] pad user_id[24]
//! ```
//!
//! All integers are little-endian; strings are NUL-terminated.

use std::collections::HashSet;
use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use encoding_rs::Encoding;
use tracing::debug;

use crate::error::Result;
use crate::warning::{record, DecodeWarning};

/// Width of a ZK6 user record
pub const LEGACY_WIDTH: usize = 28;

/// Width of a ZK8 user record
pub const EXTENDED_WIDTH: usize = 72;

/// One enrolled user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Internal slot number on the device
    pub uid: u16,
    pub privilege: u8,
    pub password: String,
    pub name: String,
    pub card: u32,
    pub group_id: String,
    /// User-facing id, always a string even when the device stores a number
    pub user_id: String,
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<User>: [uid:{}, name:{} user_id:{}]",
            self.uid, self.name, self.user_id
        )
    }
}

/// Decoded user table plus the ids a new enrollment should use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserListing {
    pub users: Vec<UserRecord>,
    /// First uid above every uid in the table
    pub next_uid: u32,
    /// Smallest free decimal user id at or above `next_uid`
    pub next_user_id: String,
    /// Record width the table was decoded with
    pub record_width: Option<usize>,
    pub warnings: Vec<DecodeWarning>,
}

impl UserListing {
    /// Listing of a device with no users
    pub fn empty() -> Self {
        Self {
            users: Vec::new(),
            next_uid: 1,
            next_user_id: "1".to_string(),
            record_width: None,
            warnings: Vec::new(),
        }
    }
}

impl Default for UserListing {
    fn default() -> Self {
        Self::empty()
    }
}

/// Decode a NUL-terminated string, replacing undecodable bytes
fn text(raw: &[u8], encoding: &'static Encoding) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let (decoded, _had_errors) = encoding.decode_without_bom_handling(&raw[..end]);
    decoded.into_owned()
}

fn field<const N: usize>(cursor: &mut Cursor<&[u8]>) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

fn unnamed(name: String, user_id: &str) -> String {
    if name.is_empty() {
        format!("NN-{}", user_id)
    } else {
        name
    }
}

fn decode_legacy(raw: &[u8], encoding: &'static Encoding) -> Result<UserRecord> {
    let mut cursor = Cursor::new(raw);

    let uid = cursor.read_u16::<LittleEndian>()?;
    let privilege = cursor.read_u8()?;
    let password = field::<5>(&mut cursor)?;
    let name = field::<8>(&mut cursor)?;
    let card = cursor.read_u32::<LittleEndian>()?;
    cursor.read_u8()?;
    let group_id = cursor.read_u8()?;
    let _timezone = cursor.read_i16::<LittleEndian>()?;
    let user_id = cursor.read_u32::<LittleEndian>()?.to_string();

    Ok(UserRecord {
        uid,
        privilege,
        password: text(&password, encoding),
        name: unnamed(text(&name, encoding).trim().to_string(), &user_id),
        card,
        group_id: group_id.to_string(),
        user_id,
    })
}

fn decode_extended(raw: &[u8], encoding: &'static Encoding) -> Result<UserRecord> {
    let mut cursor = Cursor::new(raw);

    let uid = cursor.read_u16::<LittleEndian>()?;
    let privilege = cursor.read_u8()?;
    let password = field::<8>(&mut cursor)?;
    let name = field::<24>(&mut cursor)?;
    let card = cursor.read_u32::<LittleEndian>()?;
    cursor.read_u8()?;
    let group_id = field::<7>(&mut cursor)?;
    cursor.read_u8()?;
    let user_id = text(&field::<24>(&mut cursor)?, encoding);

    Ok(UserRecord {
        uid,
        privilege,
        password: text(&password, encoding),
        name: unnamed(text(&name, encoding).trim().to_string(), &user_id),
        card,
        group_id: text(&group_id, encoding).trim().to_string(),
        user_id,
    })
}

/// Ids for the next enrollment
///
/// The uid is one above the highest uid present. The user id starts from
/// the same number and moves up past any user id already taken.
pub fn suggest_next_ids(users: &[UserRecord]) -> (u32, String) {
    let next_uid = users.iter().map(|u| u32::from(u.uid)).max().unwrap_or(0) + 1;

    let taken: HashSet<&str> = users.iter().map(|u| u.user_id.as_str()).collect();
    let mut candidate = next_uid;
    while taken.contains(candidate.to_string().as_str()) {
        candidate += 1;
    }

    (next_uid, candidate.to_string())
}

/// Decode a user table of fixed-width records
///
/// Width 28 selects the ZK6 layout and anything else the ZK8 one; a width
/// other than 72 is reported but still decoded as 72-byte records.
pub fn decode_users(
    bytes: &[u8],
    width: usize,
    encoding: &'static Encoding,
) -> Result<UserListing> {
    let mut listing = UserListing::empty();

    let stride = if width == LEGACY_WIDTH {
        LEGACY_WIDTH
    } else {
        if width != EXTENDED_WIDTH {
            record(
                &mut listing.warnings,
                DecodeWarning::UnexpectedRecordWidth { width },
            );
        }
        EXTENDED_WIDTH
    };

    let mut records = bytes.chunks_exact(stride);
    for raw in &mut records {
        let user = if stride == LEGACY_WIDTH {
            decode_legacy(raw, encoding)?
        } else {
            decode_extended(raw, encoding)?
        };
        debug!(uid = user.uid, user_id = %user.user_id, "Decoded user");
        listing.users.push(user);
    }

    let remaining = records.remainder().len();
    if remaining > 0 {
        record(
            &mut listing.warnings,
            DecodeWarning::TrailingBytes {
                remaining,
                width: stride,
            },
        );
    }

    let (next_uid, next_user_id) = suggest_next_ids(&listing.users);
    listing.next_uid = next_uid;
    listing.next_user_id = next_user_id;
    listing.record_width = Some(stride);

    Ok(listing)
}

/// Decode the buffered user table read with CMD_USERTEMP_RRQ
///
/// The table starts with its total size as a u32; the record width is that
/// size divided by the number of users the device reported.
pub fn decode_user_table(
    bytes: &[u8],
    user_count: usize,
    encoding: &'static Encoding,
) -> Result<UserListing> {
    if user_count == 0 {
        return Ok(UserListing::empty());
    }

    if bytes.len() <= 4 {
        let mut listing = UserListing::empty();
        record(
            &mut listing.warnings,
            DecodeWarning::MissingUserData { size: bytes.len() },
        );
        return Ok(listing);
    }

    let mut prefix = &bytes[..4];
    let total_size = prefix.read_u32::<LittleEndian>()? as usize;
    let width = total_size / user_count;
    debug!(total_size, user_count, width, "User table");

    decode_users(&bytes[4..], width, encoding)
}
