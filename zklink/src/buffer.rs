//! Buffered transfers
//!
//! Payloads larger than one packet move through a device-side buffer:
//!
//! ```text
//! read:  PREPARE_BUFFER -> ACK_OK(size) -> READ_BUFFER(offset, len)* -> FREE_DATA
//!                       -> DATA(payload)            (small payloads)
//! write: FREE_DATA -> PREPARE_DATA(size) -> DATA(1024 bytes)*
//! ```
//!
//! A READ_BUFFER reply is either a single DATA packet or a PREPARE_DATA
//! packet followed by DATA packets and a closing ACK_OK.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};
use zklink_core::{
    constants::{
        chunk::{MAX_CHUNK_TCP, MAX_CHUNK_UDP, UDP_PACKET, WRITE_CHUNK},
        MAX_RETRIES,
    },
    packet::unwrap_tcp,
    Command, PacketHeader, HEADER_SIZE, TCP_FRAME_SIZE,
};

use crate::{
    error::{Error, Result},
    link::Framing,
    retry,
    session::{CommandResponse, Session},
};

/// Progress of a buffered read
#[derive(Debug)]
pub struct BufferedTransfer {
    total_size: u32,
    max_chunk: u32,
    offset: u32,
    accumulated: BytesMut,
}

impl BufferedTransfer {
    pub fn new(total_size: u32, max_chunk: u32) -> Self {
        Self {
            total_size,
            max_chunk,
            offset: 0,
            accumulated: BytesMut::with_capacity(total_size.min(max_chunk) as usize),
        }
    }

    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Offset and length of the next chunk to request
    pub fn next_chunk(&self) -> Option<(u32, u32)> {
        if self.offset >= self.total_size {
            return None;
        }
        let size = self.max_chunk.min(self.total_size - self.offset);
        Some((self.offset, size))
    }

    /// Append the bytes returned for a chunk of `requested` bytes
    pub fn push(&mut self, requested: u32, chunk: &[u8]) {
        if chunk.len() != requested as usize {
            debug!(
                offset = self.offset,
                requested,
                received = chunk.len(),
                "Chunk size differs from request"
            );
        }
        self.accumulated.extend_from_slice(chunk);
        self.offset += requested;
    }

    pub fn finish(self) -> Bytes {
        self.accumulated.freeze()
    }
}

fn read_u32_at(payload: &[u8], at: usize) -> Option<u32> {
    payload
        .get(at..at + 4)
        .map(|mut bytes| bytes.get_u32_le())
}

impl Session {
    fn require_framing(&self) -> Result<Framing> {
        self.framing().ok_or(Error::NotConnected)
    }

    /// Read a buffered table such as the user list
    ///
    /// `command` is the logical request (e.g. CMD_USERTEMP_RRQ) run inside
    /// the buffer, `fct` its data type flag.
    pub async fn read_with_buffer(
        &mut self,
        command: Command,
        fct: i32,
        ext: i32,
    ) -> Result<Bytes> {
        let framing = self.require_framing()?;

        let mut request = BytesMut::with_capacity(11);
        request.put_i8(1);
        request.put_i16_le(u16::from(command) as i16);
        request.put_i32_le(fct);
        request.put_i32_le(ext);

        let response = self
            .send_command(Command::PrepareBuffer, &request, 1024)
            .await?
            .ensure("buffered read not supported")?;

        if response.code == u16::from(Command::Data) {
            debug!(len = response.payload.len(), "Buffered read answered directly");
            return match framing {
                Framing::Tcp => self.complete_tcp_data(response).await,
                Framing::Udp => Ok(response.payload),
            };
        }

        let total_size = read_u32_at(&response.payload, 1)
            .ok_or_else(|| Error::Network("buffered read reply carries no size".into()))?;

        let mut transfer = BufferedTransfer::new(total_size, framing.max_chunk());
        debug!(
            total_size,
            max_chunk = framing.max_chunk(),
            "Reading buffer in chunks"
        );

        while let Some((offset, size)) = transfer.next_chunk() {
            let chunk = self.read_chunk(offset, size).await?;
            transfer.push(size, &chunk);
        }

        self.free_data().await?;
        Ok(transfer.finish())
    }

    /// Read one chunk of the device buffer, retrying empty replies
    pub async fn read_chunk(&mut self, offset: u32, size: u32) -> Result<Bytes> {
        retry::bounded(self, MAX_RETRIES, |session| {
            Box::pin(session.try_read_chunk(offset, size))
        })
        .await?
        .ok_or_else(|| Error::Network(format!("can't read chunk {}:[{}]", offset, size)))
    }

    async fn try_read_chunk(&mut self, offset: u32, size: u32) -> Result<Option<Bytes>> {
        let framing = self.require_framing()?;

        let mut request = BytesMut::with_capacity(8);
        request.put_i32_le(offset as i32);
        request.put_i32_le(size as i32);

        let response = self
            .send_command(
                Command::ReadBuffer,
                &request,
                framing.chunk_response_size(size),
            )
            .await?;

        self.receive_chunk(framing, response).await
    }

    /// Collect the data announced by a READ_BUFFER reply
    ///
    /// `None` means the reply was not usable and the read should be retried.
    async fn receive_chunk(
        &mut self,
        framing: Framing,
        response: CommandResponse,
    ) -> Result<Option<Bytes>> {
        match response.command() {
            Some(Command::Data) => match framing {
                Framing::Tcp => self.complete_tcp_data(response).await.map(Some),
                Framing::Udp => Ok(Some(response.payload)),
            },
            Some(Command::PrepareData) => {
                let Some(size) = read_u32_at(&response.payload, 0) else {
                    warn!("PREPARE_DATA without a size");
                    return Ok(None);
                };
                trace!(size, "Chunk prepared");

                match framing {
                    Framing::Tcp => {
                        let result = self.receive_tcp_prepared(&response, size as usize).await;
                        self.guard(result).await
                    }
                    Framing::Udp => {
                        let result = self.receive_udp_prepared(size as usize).await;
                        self.guard(result).await.map(Some)
                    }
                }
            }
            _ => {
                debug!("Invalid chunk reply {}", Command::describe(response.code));
                Ok(None)
            }
        }
    }

    /// A TCP DATA reply may be longer than the first read; fetch the rest
    async fn complete_tcp_data(&mut self, response: CommandResponse) -> Result<Bytes> {
        let expected = response
            .tcp_length
            .unwrap_or(HEADER_SIZE)
            .saturating_sub(HEADER_SIZE);
        let have = response.payload.len();

        if have >= expected {
            return Ok(response.payload);
        }

        trace!(have, expected, "DATA reply incomplete, reading the rest");
        let rest = self.receive_raw(expected - have).await?;

        let mut data = BytesMut::with_capacity(expected.min(MAX_CHUNK_TCP as usize));
        data.extend_from_slice(&response.payload);
        data.extend_from_slice(&rest);
        Ok(data.freeze())
    }

    async fn receive_tcp_prepared(
        &mut self,
        response: &CommandResponse,
        size: usize,
    ) -> Result<Option<Bytes>> {
        let link = self.link_mut()?;

        // Whatever followed the PREPARE_DATA packet in the first read
        let prepare_len = response
            .tcp_length
            .unwrap_or(HEADER_SIZE)
            .saturating_sub(HEADER_SIZE);
        let mut pending = BytesMut::new();
        if response.payload.len() >= prepare_len {
            pending.extend_from_slice(&response.payload[prepare_len..]);
        } else {
            link.recv_exact(prepare_len - response.payload.len()).await?;
        }

        let frame_head = TCP_FRAME_SIZE + HEADER_SIZE;
        let mut data = BytesMut::with_capacity(size.min(MAX_CHUNK_TCP as usize));

        while data.len() < size {
            link.fill(&mut pending, frame_head).await?;

            let Some(length) = unwrap_tcp(&pending) else {
                warn!("Broken TCP frame inside chunk");
                return Ok(None);
            };
            let header = PacketHeader::decode(&pending[TCP_FRAME_SIZE..frame_head])?;
            if header.command != u16::from(Command::Data) || (length as usize) < HEADER_SIZE {
                warn!("Expected DATA inside chunk, got {}", Command::describe(header.command));
                return Ok(None);
            }

            let frame_len = TCP_FRAME_SIZE + length as usize;
            link.fill(&mut pending, frame_len).await?;

            data.extend_from_slice(&pending[frame_head..frame_len]);
            pending.advance(frame_len);
            trace!(got = data.len(), size, "Chunk progress");
        }

        link.fill(&mut pending, frame_head).await?;
        if unwrap_tcp(&pending).is_none() {
            warn!("Invalid chunk footer frame");
            return Ok(None);
        }

        let footer = PacketHeader::decode(&pending[TCP_FRAME_SIZE..frame_head])?;
        if footer.command != u16::from(Command::AckOk) {
            warn!("Chunk closed with {}", Command::describe(footer.command));
            return Ok(None);
        }

        Ok(Some(data.freeze()))
    }

    async fn receive_udp_prepared(&mut self, size: usize) -> Result<Bytes> {
        let link = self.link_mut()?;
        let mut data = BytesMut::with_capacity(size.min(MAX_CHUNK_UDP as usize));

        loop {
            let datagram = link.recv_raw(UDP_PACKET).await?;
            let Ok(header) = PacketHeader::decode(&datagram) else {
                warn!("Runt datagram while streaming chunk");
                break;
            };

            match header.command() {
                Some(Command::Data) => {
                    data.extend_from_slice(&datagram[HEADER_SIZE..]);
                    trace!(got = data.len(), size, "Chunk progress");
                }
                Some(Command::AckOk) => break,
                _ => {
                    warn!(
                        "Chunk stream cut short by {} after {} of {} bytes",
                        Command::describe(header.command),
                        data.len(),
                        size
                    );
                    break;
                }
            }
        }

        Ok(data.freeze())
    }

    /// Write `buffer` into the device-side buffer
    pub async fn send_with_buffer(&mut self, buffer: &[u8]) -> Result<()> {
        self.free_data().await?;

        let size = buffer.len() as u32;
        self.send_command(Command::PrepareData, &size.to_le_bytes(), 8)
            .await?
            .ensure("can't prepare data")?;

        for chunk in buffer.chunks(WRITE_CHUNK) {
            self.send_command(Command::Data, chunk, 8)
                .await?
                .ensure("can't send chunk")?;
        }

        debug!(size, "Buffer written");
        Ok(())
    }
}
