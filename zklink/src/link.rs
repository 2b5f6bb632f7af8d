//! Packet framing over an open transport
//!
//! UDP carries bare packets, one per datagram. TCP prefixes every packet
//! with an 8-byte frame and may split or merge frames across reads.

use std::fmt;

use bytes::{Bytes, BytesMut};
use tracing::trace;
use zklink_core::{
    constants::{
        chunk::{MAX_CHUNK_TCP, MAX_CHUNK_UDP, TCP_CHUNK_SLACK, UDP_PACKET},
        user_packet,
    },
    packet::{unwrap_tcp, wrap_tcp},
    PacketHeader, HEADER_SIZE, TCP_FRAME_SIZE,
};
use zklink_transport::Transport;

use crate::error::{Error, Result};

/// Wire framing of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Udp,
    Tcp,
}

impl Framing {
    /// Largest chunk requested per READ_BUFFER
    pub fn max_chunk(self) -> u32 {
        match self {
            Self::Udp => MAX_CHUNK_UDP,
            Self::Tcp => MAX_CHUNK_TCP,
        }
    }

    /// User record width this firmware family usually has
    pub fn user_packet_size(self) -> usize {
        match self {
            Self::Udp => user_packet::LEGACY,
            Self::Tcp => user_packet::EXTENDED,
        }
    }

    /// Response size asked for when reading a chunk of `size` bytes
    pub fn chunk_response_size(self, size: u32) -> usize {
        match self {
            Self::Udp => UDP_PACKET,
            Self::Tcp => size as usize + TCP_CHUNK_SLACK,
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// One reply packet as read off the link
#[derive(Debug, Clone)]
pub(crate) struct Received {
    pub header: PacketHeader,
    /// Everything read after the header, possibly including later packets
    pub payload: Bytes,
    /// Declared TCP frame length
    pub tcp_length: Option<usize>,
}

/// Open transport plus the framing it speaks
pub(crate) struct Link {
    framing: Framing,
    io: Box<dyn Transport>,
}

impl Link {
    pub fn new(framing: Framing, io: Box<dyn Transport>) -> Self {
        Self { framing, io }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn remote_addr(&self) -> String {
        self.io.remote_addr()
    }

    pub async fn open(&mut self) -> Result<()> {
        if !self.io.is_connected() {
            self.io.connect().await?;
        }
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.io.disconnect().await?;
        Ok(())
    }

    /// Send a packet with the framing of this link
    pub async fn send_framed(&mut self, packet: &[u8]) -> Result<()> {
        match self.framing {
            Framing::Udp => self.io.send(packet).await?,
            Framing::Tcp => self.io.send(&wrap_tcp(packet)).await?,
        }
        Ok(())
    }

    /// Read one reply of at most `response_size` bytes (plus the TCP frame)
    pub async fn recv_framed(&mut self, response_size: usize) -> Result<Received> {
        match self.framing {
            Framing::Udp => {
                let buf = self.io.receive(response_size).await?;
                if buf.len() < HEADER_SIZE {
                    return Err(Error::Network(format!(
                        "reply of {} bytes has no header",
                        buf.len()
                    )));
                }

                let mut buf = buf.freeze();
                let header = PacketHeader::decode(&buf)?;
                let payload = buf.split_off(HEADER_SIZE);

                Ok(Received {
                    header,
                    payload,
                    tcp_length: None,
                })
            }
            Framing::Tcp => {
                let max_len = response_size + TCP_FRAME_SIZE;
                let mut buf = self.io.receive(max_len).await?;

                // Frame prefix and header must both be present
                let minimum = TCP_FRAME_SIZE + HEADER_SIZE;
                while buf.len() < minimum {
                    let more = self.recv_raw(minimum - buf.len()).await?;
                    buf.extend_from_slice(&more);
                }

                let tcp_length = match unwrap_tcp(&buf) {
                    Some(length) if length > 0 => length as usize,
                    _ => return Err(Error::Network("TCP packet invalid".into())),
                };

                let mut buf = buf.freeze();
                let header = PacketHeader::decode(&buf[TCP_FRAME_SIZE..])?;
                let payload = buf.split_off(minimum);

                trace!(tcp_length, read = payload.len() + minimum, "TCP reply");

                Ok(Received {
                    header,
                    payload,
                    tcp_length: Some(tcp_length),
                })
            }
        }
    }

    /// Single read of at most `max_len` bytes
    pub async fn recv_raw(&mut self, max_len: usize) -> Result<BytesMut> {
        let buf = self.io.receive(max_len).await?;
        if buf.is_empty() && max_len > 0 {
            return Err(Error::Network("empty read".into()));
        }
        Ok(buf)
    }

    /// Read exactly `size` bytes, however many reads it takes
    pub async fn recv_exact(&mut self, size: usize) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(size);
        while buf.len() < size {
            let part = self.recv_raw(size - buf.len()).await?;
            trace!(got = part.len(), still = size - buf.len() - part.len(), "Partial read");
            buf.extend_from_slice(&part);
        }
        Ok(buf)
    }

    /// Grow `pending` to at least `size` bytes
    pub async fn fill(&mut self, pending: &mut BytesMut, size: usize) -> Result<()> {
        if pending.len() < size {
            let more = self.recv_exact(size - pending.len()).await?;
            pending.extend_from_slice(&more);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;
    use zklink_core::{packet::seal, Command};

    #[test]
    fn test_framing_limits() {
        assert_eq!(Framing::Tcp.max_chunk(), 0xFFC0);
        assert_eq!(Framing::Udp.max_chunk(), 16384);
        assert_eq!(Framing::Tcp.user_packet_size(), 72);
        assert_eq!(Framing::Udp.user_packet_size(), 28);
        assert_eq!(Framing::Tcp.chunk_response_size(100), 132);
        assert_eq!(Framing::Udp.chunk_response_size(100), 1032);
    }

    #[tokio::test]
    async fn test_tcp_reply_split_into_tiny_segments() {
        let mut device = FakeDevice::new(Framing::Tcp).with_segment_size(3);
        device.push_raw(&wrap_tcp(&seal(Command::AckOk.into(), &[1, 2, 3, 4], 7, 9)));

        let mut link = Link::new(Framing::Tcp, Box::new(device));
        link.open().await.unwrap();

        let reply = link.recv_framed(8).await.unwrap();
        assert_eq!(reply.header.command, 2000);
        assert_eq!(reply.header.session_id, 7);
        assert_eq!(reply.header.reply_id, 9);
        assert_eq!(reply.tcp_length, Some(12));
    }

    #[tokio::test]
    async fn test_tcp_bad_magic_is_network_error() {
        let mut device = FakeDevice::new(Framing::Tcp);
        let mut framed = wrap_tcp(&seal(Command::AckOk.into(), &[], 1, 1));
        framed[0] = 0;
        device.push_raw(&framed);

        let mut link = Link::new(Framing::Tcp, Box::new(device));
        link.open().await.unwrap();

        let err = link.recv_framed(8).await.unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_udp_short_datagram() {
        let mut device = FakeDevice::new(Framing::Udp);
        device.push_raw(&[1, 2, 3]);

        let mut link = Link::new(Framing::Udp, Box::new(device));
        link.open().await.unwrap();

        assert!(matches!(link.recv_framed(8).await, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_recv_exact_across_segments() {
        let mut device = FakeDevice::new(Framing::Tcp).with_segment_size(4);
        device.push_raw(&[0u8, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

        let mut link = Link::new(Framing::Tcp, Box::new(device));
        link.open().await.unwrap();

        let bytes = link.recv_exact(10).await.unwrap();
        assert_eq!(&bytes[..], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }
}
