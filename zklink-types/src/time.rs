//! Device timestamp formats
//!
//! Terminals count time in a calendar where every month has 31 days, packed
//! into a little-endian u32 counted from 2000-01-01. Attendance events use a
//! 6-byte form with one byte per field.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Error, Result};

fn build(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| {
            Error::Parse(format!(
                "invalid device time {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ))
        })
}

/// Decode the packed 4-byte form
///
/// # Examples
///
/// ```
/// use zklink_types::decode_time4;
///
/// let t = decode_time4(&0u32.to_le_bytes()).unwrap();
/// assert_eq!(t.to_string(), "2000-01-01 00:00:00");
/// ```
pub fn decode_time4(bytes: &[u8]) -> Result<NaiveDateTime> {
    if bytes.len() < 4 {
        return Err(Error::Parse(format!(
            "packed time needs 4 bytes, got {}",
            bytes.len()
        )));
    }

    let mut t = LittleEndian::read_u32(&bytes[..4]);

    let second = t % 60;
    t /= 60;
    let minute = t % 60;
    t /= 60;
    let hour = t % 24;
    t /= 24;
    let day = t % 31 + 1;
    t /= 31;
    let month = t % 12 + 1;
    t /= 12;
    let year = t as i32 + 2000;

    build(year, month, day, hour, minute, second)
}

/// Encode into the packed 4-byte form
///
/// Only the last two digits of the year survive.
pub fn encode_time4(t: &NaiveDateTime) -> u32 {
    let year = t.year().rem_euclid(100) as u32;
    let days = year * 12 * 31 + (t.month() - 1) * 31 + (t.day() - 1);

    days * 24 * 60 * 60 + (t.hour() * 60 + t.minute()) * 60 + t.second()
}

/// Decode the 6-byte form: year - 2000, month, day, hour, minute, second
pub fn decode_time6(bytes: &[u8]) -> Result<NaiveDateTime> {
    match bytes {
        [year, month, day, hour, minute, second, ..] => build(
            i32::from(*year) + 2000,
            u32::from(*month),
            u32::from(*day),
            u32::from(*hour),
            u32::from(*minute),
            u32::from(*second),
        ),
        _ => Err(Error::Parse(format!(
            "field time needs 6 bytes, got {}",
            bytes.len()
        ))),
    }
}
