//! ZKTeco protocol packet header and TCP frame encoding/decoding

use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use tracing::trace;

use crate::{
    checksum,
    command::Command,
    constants::{TCP_MAGIC_1, TCP_MAGIC_2, USHRT_MAX},
    error::{Error, Result},
    HEADER_SIZE, TCP_FRAME_SIZE,
};

/// ZKTeco packet header
///
/// # Packet Structure
///
/// ```text
/// ┌─────────────┬─────────────┬─────────────┬─────────────┬─────────────┐
/// │   Command   │  Checksum   │  SessionID  │  ReplyID    │   Payload   │
/// │   2 bytes   │   2 bytes   │   2 bytes   │   2 bytes   │   N bytes   │
/// │ (LE u16)    │  (LE u16)   │  (LE u16)   │  (LE u16)   │   (bytes)   │
/// └─────────────┴─────────────┴─────────────┴─────────────┴─────────────┘
/// ```
///
/// Responses are not checksum-verified; terminals are inconsistent about it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Command or response code
    pub command: u16,

    /// Checksum as found on the wire
    pub checksum: u16,

    /// Session identifier (assigned by device on connect)
    pub session_id: u16,

    /// Reply id (echoed by the device)
    pub reply_id: u16,
}

impl PacketHeader {
    /// Header size in bytes
    pub const SIZE: usize = HEADER_SIZE;

    /// Parse the first 8 bytes of `buf`
    ///
    /// # Examples
    ///
    /// ```
    /// use zklink_core::PacketHeader;
    ///
    /// let header = PacketHeader::decode(&[0xD0, 0x07, 0, 0, 0x34, 0x12, 1, 0]).unwrap();
    /// assert_eq!(header.command, 2000);
    /// assert_eq!(header.session_id, 0x1234);
    /// assert_eq!(header.reply_id, 1);
    /// ```
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::PacketTooShort {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        Ok(Self {
            command: buf.get_u16_le(),
            checksum: buf.get_u16_le(),
            session_id: buf.get_u16_le(),
            reply_id: buf.get_u16_le(),
        })
    }

    /// Append the header to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.command);
        buf.put_u16_le(self.checksum);
        buf.put_u16_le(self.session_id);
        buf.put_u16_le(self.reply_id);
    }

    /// Known command for this header, if any
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.command).ok()
    }
}

impl fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketHeader")
            .field("command", &Command::describe(self.command))
            .field("checksum", &format!("0x{:04X}", self.checksum))
            .field("session_id", &format!("0x{:04X}", self.session_id))
            .field("reply_id", &format!("0x{:04X}", self.reply_id))
            .finish()
    }
}

/// Advance a reply id
///
/// Values reaching `0xFFFF` wrap to zero, so `0xFFFE` is followed by `0`.
pub fn next_reply_id(reply_id: u16) -> u16 {
    let next = u32::from(reply_id) + 1;
    if next >= u32::from(USHRT_MAX) {
        (next - u32::from(USHRT_MAX)) as u16
    } else {
        next as u16
    }
}

fn serialize(command: u16, session_id: u16, reply_id: u16, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    PacketHeader {
        command,
        checksum: 0,
        session_id,
        reply_id,
    }
    .encode_into(&mut buf);
    buf.put_slice(payload);
    buf
}

/// Build an outbound packet
///
/// The checksum is computed over the packet carrying the *current* reply id,
/// while the packet on the wire carries the advanced one. Terminals accept
/// this and answer with the advanced id.
///
/// Returns the packet and the advanced reply id.
///
/// # Examples
///
/// ```
/// use zklink_core::packet::encode_header;
///
/// let (packet, next) = encode_header(1000, &[], 0, 0xFFFE);
/// assert_eq!(&packet[..], &[0xE8, 0x03, 0x17, 0xFC, 0x00, 0x00, 0x00, 0x00]);
/// assert_eq!(next, 0);
/// ```
pub fn encode_header(
    command: u16,
    payload: &[u8],
    session_id: u16,
    reply_id: u16,
) -> (BytesMut, u16) {
    let mut buf = serialize(command, session_id, reply_id, payload);
    let checksum = checksum::calculate(&buf);
    let next = next_reply_id(reply_id);

    buf[2..4].copy_from_slice(&checksum.to_le_bytes());
    buf[6..8].copy_from_slice(&next.to_le_bytes());

    trace!(
        command = %Command::describe(command),
        session_id,
        reply_id = next,
        bytes = %hex::encode(&buf[..buf.len().min(32)]),
        "Encoded packet"
    );

    (buf, next)
}

/// Build a packet whose checksum covers exactly the bytes sent
///
/// This is how terminals seal their replies; the client never needs it for
/// outbound traffic.
pub fn seal(command: u16, payload: &[u8], session_id: u16, reply_id: u16) -> BytesMut {
    let mut buf = serialize(command, session_id, reply_id, payload);
    let checksum = checksum::calculate(&buf);
    buf[2..4].copy_from_slice(&checksum.to_le_bytes());
    buf
}

/// TCP frame prefix
///
/// ```text
/// ┌─────────────┬─────────────┬───────────────────────┐
/// │   0x5050    │   0x7D82    │  length of packet     │
/// │  (LE u16)   │  (LE u16)   │      (LE u32)         │
/// └─────────────┴─────────────┴───────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFrame {
    /// Size of the wrapped packet (header + payload)
    pub length: u32,
}

impl TcpFrame {
    /// Frame prefix size in bytes
    pub const SIZE: usize = TCP_FRAME_SIZE;

    /// Parse a frame prefix
    ///
    /// Fails unless more than 8 bytes are present and both magic fields match.
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() <= Self::SIZE {
            return Err(Error::InvalidTcpFrame(format!(
                "{} bytes is too short for a frame",
                buf.len()
            )));
        }

        let magic1 = buf.get_u16_le();
        let magic2 = buf.get_u16_le();
        if magic1 != TCP_MAGIC_1 || magic2 != TCP_MAGIC_2 {
            return Err(Error::InvalidTcpFrame(format!(
                "bad magic 0x{:04X} 0x{:04X}",
                magic1, magic2
            )));
        }

        Ok(Self {
            length: buf.get_u32_le(),
        })
    }

    /// Append the frame prefix to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u16_le(TCP_MAGIC_1);
        buf.put_u16_le(TCP_MAGIC_2);
        buf.put_u32_le(self.length);
    }
}

/// Prefix a packet with its TCP frame
pub fn wrap_tcp(packet: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(TCP_FRAME_SIZE + packet.len());
    TcpFrame {
        length: packet.len() as u32,
    }
    .encode_into(&mut buf);
    buf.put_slice(packet);
    buf
}

/// Declared length of a TCP frame, or `None` when the prefix is invalid
pub fn unwrap_tcp(buf: &[u8]) -> Option<u32> {
    TcpFrame::decode(buf).ok().map(|frame| frame.length)
}
