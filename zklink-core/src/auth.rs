//! ZKTeco authentication algorithm
//!
//! The CommKey authentication algorithm scrambles the password with the session_id
//! to create an authentication key. This algorithm was reverse-engineered from
//! ZKTeco's commpro.c - MakeKey function.

/// Create authentication key from password and session_id
///
/// # Algorithm
///
/// 1. Fold the password bits LSB first into an accumulator (bit reversal)
/// 2. Add session_id to the accumulator
/// 3. XOR the little-endian bytes with 'Z', 'K', 'S', 'O'
/// 4. Swap the two 16-bit halves
/// 5. XOR bytes 0, 1 and 3 with ticks; byte 2 becomes ticks
///
/// # Arguments
///
/// * `password` - The CommKey password (usually 0 for default)
/// * `session_id` - The session ID from CMD_ACK_UNAUTH response
/// * `ticks` - Ticks value (default: 50)
///
/// # Returns
///
/// 4-byte authentication key to send in CMD_AUTH payload
///
/// # Examples
///
/// ```
/// use zklink_core::auth;
///
/// let key = auth::derive_key(0, 0, 50);
/// assert_eq!(key, [0x61, 0x7D, 0x32, 0x79]);
/// ```
pub fn derive_key(password: u32, session_id: u32, ticks: u8) -> [u8; 4] {
    let mut k: u32 = 0;
    for i in 0..32 {
        k <<= 1;
        if password & (1 << i) != 0 {
            k |= 1;
        }
    }

    k = k.wrapping_add(session_id);

    let bytes = k.to_le_bytes();
    let xored = [
        bytes[0] ^ b'Z',
        bytes[1] ^ b'K',
        bytes[2] ^ b'S',
        bytes[3] ^ b'O',
    ];

    let low = u16::from_le_bytes([xored[0], xored[1]]);
    let high = u16::from_le_bytes([xored[2], xored[3]]);

    let mut key = [0u8; 4];
    key[0..2].copy_from_slice(&high.to_le_bytes());
    key[2..4].copy_from_slice(&low.to_le_bytes());

    key[0] ^= ticks;
    key[1] ^= ticks;
    key[2] = ticks;
    key[3] ^= ticks;

    key
}
