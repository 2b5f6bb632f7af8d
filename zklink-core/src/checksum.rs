//! ZKTeco checksum algorithm
//!
//! Taken over from zkemsdk.c:
//! 1. Sum the serialized packet (checksum field zeroed) as 16-bit words
//! 2. Whenever the sum exceeds 0xFFFF, subtract 0xFFFF
//! 3. A trailing odd byte is added on its own
//! 4. Complement, then add 0xFFFF while the result is negative
//!
//! Step 4 works on signed integers, so the result is `0xFFFE - sum` rather than
//! the plain 16-bit complement. Devices expect exactly this value.

use tracing::trace;

use crate::constants::USHRT_MAX;

/// Calculate the checksum of a serialized packet
///
/// `buf` is header + payload with the checksum field set to zero.
///
/// # Examples
///
/// ```
/// use zklink_core::checksum;
///
/// // CMD_CONNECT, session 0, reply id 0xFFFE
/// let buf = [0xE8, 0x03, 0x00, 0x00, 0x00, 0x00, 0xFE, 0xFF];
/// assert_eq!(checksum::calculate(&buf), 0xFC17);
/// ```
pub fn calculate(buf: &[u8]) -> u16 {
    let max = u32::from(USHRT_MAX);
    let mut sum: u32 = 0;

    let mut words = buf.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_le_bytes([word[0], word[1]]));
        if sum > max {
            sum -= max;
        }
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last);
    }

    while sum > max {
        sum -= max;
    }

    // `sum` fits in 16 bits here, so the signed complement cannot overflow
    let mut checksum = !(sum as i32);
    while checksum < 0 {
        checksum += i32::from(USHRT_MAX);
    }

    let checksum = checksum as u16;

    trace!(
        len = buf.len(),
        checksum = format!("0x{:04X}", checksum),
        "Calculated checksum"
    );

    checksum
}

/// Verify a sealed packet
///
/// Summing a packet together with the checksum it was sealed with lands on
/// `0xFFFE`, so the checksum of the sealed bytes is zero.
pub fn verify(sealed: &[u8]) -> bool {
    calculate(sealed) == 0
}
