//! Scripted in-memory terminal
//!
//! Answers commands the way a device does and records every request. TCP
//! output is one byte stream that can be handed out in small segments; UDP
//! output is a queue of datagrams. An empty outbox reads as a timeout.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use zklink_core::{
    constants::DEFAULT_TICKS,
    derive_key,
    packet::{seal, unwrap_tcp, wrap_tcp},
    Command, PacketHeader, HEADER_SIZE, TCP_FRAME_SIZE,
};
use zklink_transport::{Error, Result, Transport};

use crate::link::Framing;

/// One packet the client sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Request {
    pub command: u16,
    pub session_id: u16,
    pub reply_id: u16,
    pub payload: Vec<u8>,
}

/// Shared view of the requests a [`FakeDevice`] received
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestLog(Arc<Mutex<Vec<Request>>>);

impl RequestLog {
    fn push(&self, request: Request) {
        self.0.lock().unwrap().push(request);
    }

    pub fn all(&self) -> Vec<Request> {
        self.0.lock().unwrap().clone()
    }

    pub fn of(&self, command: Command) -> Vec<Request> {
        let code = u16::from(command);
        self.all().into_iter().filter(|r| r.command == code).collect()
    }
}

/// How READ_BUFFER is answered
#[derive(Debug, Clone, Copy)]
pub(crate) enum ChunkReply {
    /// One DATA packet holding the whole chunk
    Data,
    /// PREPARE_DATA, DATA packets of `frame_size` bytes (1024 on UDP), ACK_OK
    Prepared { frame_size: usize },
}

pub(crate) struct FakeDevice {
    framing: Framing,
    connected: bool,
    silent: bool,
    session_id: u16,
    password: Option<u32>,
    connect_reply_id: Option<u16>,
    stream: VecDeque<u8>,
    datagrams: VecDeque<Vec<u8>>,
    segment_size: Option<usize>,
    table: Vec<u8>,
    direct_limit: usize,
    chunk_reply: ChunkReply,
    chunk_failures: usize,
    bad_footers: usize,
    truncated_chunks: bool,
    interrupted_chunks: bool,
    announced_size: Option<u32>,
    failing: HashSet<u16>,
    options: HashMap<String, String>,
    replies: HashMap<u16, Vec<u8>>,
    log: RequestLog,
}

impl FakeDevice {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            connected: false,
            silent: false,
            session_id: 0x2F1A,
            password: None,
            connect_reply_id: None,
            stream: VecDeque::new(),
            datagrams: VecDeque::new(),
            segment_size: None,
            table: Vec::new(),
            direct_limit: 0,
            chunk_reply: ChunkReply::Data,
            chunk_failures: 0,
            bad_footers: 0,
            truncated_chunks: false,
            interrupted_chunks: false,
            announced_size: None,
            failing: HashSet::new(),
            options: HashMap::new(),
            replies: HashMap::new(),
            log: RequestLog::default(),
        }
    }

    pub fn with_session_id(mut self, session_id: u16) -> Self {
        self.session_id = session_id;
        self
    }

    /// Demand a CommKey on connect
    pub fn with_password(mut self, password: u32) -> Self {
        self.password = Some(password);
        self
    }

    /// Answer CMD_CONNECT with this reply id instead of echoing
    pub fn with_connect_reply_id(mut self, reply_id: u16) -> Self {
        self.connect_reply_id = Some(reply_id);
        self
    }

    /// Hand out TCP bytes at most `size` at a time
    pub fn with_segment_size(mut self, size: usize) -> Self {
        self.segment_size = Some(size);
        self
    }

    /// Device-side buffer served by PREPARE_BUFFER / READ_BUFFER
    pub fn with_table(mut self, table: Vec<u8>) -> Self {
        self.table = table;
        self
    }

    /// Tables up to this size are answered with a direct DATA reply
    pub fn with_direct_limit(mut self, limit: usize) -> Self {
        self.direct_limit = limit;
        self
    }

    pub fn with_chunk_reply(mut self, reply: ChunkReply) -> Self {
        self.chunk_reply = reply;
        self
    }

    /// Answer the next `count` READ_BUFFER requests with ACK_ERROR
    pub fn with_chunk_failures(mut self, count: usize) -> Self {
        self.chunk_failures = count;
        self
    }

    /// Close the next `count` prepared chunks with ACK_ERROR instead of ACK_OK
    pub fn with_bad_footers(mut self, count: usize) -> Self {
        self.bad_footers = count;
        self
    }

    /// Stop prepared chunks halfway, without a footer
    pub fn with_truncated_chunks(mut self) -> Self {
        self.truncated_chunks = true;
        self
    }

    /// Stop prepared chunks halfway with ACK_ERROR in place of the next DATA
    pub fn with_interrupted_chunks(mut self) -> Self {
        self.interrupted_chunks = true;
        self
    }

    /// Size PREPARE_DATA announces, whatever the chunk holds
    pub fn with_announced_size(mut self, size: u32) -> Self {
        self.announced_size = Some(size);
        self
    }

    /// Never answer anything
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Answer `command` with ACK_ERROR
    pub fn failing(mut self, command: Command) -> Self {
        self.failing.insert(command.into());
        self
    }

    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    /// Payload of the ACK_OK answering `command`
    pub fn with_reply(mut self, command: Command, payload: Vec<u8>) -> Self {
        self.replies.insert(command.into(), payload);
        self
    }

    pub fn log(&self) -> RequestLog {
        self.log.clone()
    }

    /// Queue bytes exactly as given (one datagram on UDP)
    pub fn push_raw(&mut self, bytes: &[u8]) {
        match self.framing {
            Framing::Tcp => self.stream.extend(bytes),
            Framing::Udp => self.datagrams.push_back(bytes.to_vec()),
        }
    }

    fn reply(&mut self, code: Command, payload: &[u8], reply_id: u16) {
        let packet = seal(code.into(), payload, self.session_id, reply_id);
        match self.framing {
            Framing::Tcp => self.push_raw(&wrap_tcp(&packet)),
            Framing::Udp => self.push_raw(&packet),
        }
    }

    fn respond(&mut self, header: PacketHeader, payload: &[u8]) {
        let reply_id = header.reply_id;

        if self.silent {
            return;
        }
        if self.failing.contains(&header.command) {
            self.reply(Command::AckError, &[], reply_id);
            return;
        }

        match Command::try_from(header.command) {
            Ok(Command::Connect) => {
                let code = if self.password.is_some() {
                    Command::AckUnauth
                } else {
                    Command::AckOk
                };
                let reply_id = self.connect_reply_id.unwrap_or(reply_id);
                self.reply(code, &[], reply_id);
            }
            Ok(Command::Auth) => {
                let expected = derive_key(
                    self.password.unwrap_or(0),
                    u32::from(self.session_id),
                    DEFAULT_TICKS,
                );
                let code = if payload == expected {
                    Command::AckOk
                } else {
                    Command::AckUnauth
                };
                self.reply(code, &[], reply_id);
            }
            Ok(Command::AckOk) => {}
            Ok(Command::AckError) | Ok(Command::AckUnknown) => {
                self.reply(Command::AckUnknown, &[], reply_id);
            }
            Ok(Command::OptionsRrq) => {
                let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
                let key = String::from_utf8_lossy(&payload[..end]).into_owned();
                match self.options.get(&key) {
                    Some(value) => {
                        let answer = format!("{}={}\0", key, value);
                        self.reply(Command::AckOk, answer.as_bytes(), reply_id);
                    }
                    None => self.reply(Command::AckError, &[], reply_id),
                }
            }
            Ok(Command::PrepareBuffer) => {
                if self.table.len() <= self.direct_limit {
                    let table = self.table.clone();
                    self.reply(Command::Data, &table, reply_id);
                } else {
                    let mut answer = vec![0u8];
                    answer.extend_from_slice(&(self.table.len() as u32).to_le_bytes());
                    answer.extend_from_slice(&[0; 4]);
                    self.reply(Command::AckOk, &answer, reply_id);
                }
            }
            Ok(Command::ReadBuffer) => self.serve_chunk(payload, reply_id),
            Ok(command) => {
                let answer = self.replies.get(&u16::from(command)).cloned().unwrap_or_default();
                self.reply(Command::AckOk, &answer, reply_id);
            }
            Err(_) => self.reply(Command::AckUnknown, &[], reply_id),
        }
    }

    fn serve_chunk(&mut self, mut payload: &[u8], reply_id: u16) {
        let offset = payload.get_i32_le() as usize;
        let size = payload.get_i32_le() as usize;

        if self.chunk_failures > 0 {
            self.chunk_failures -= 1;
            self.reply(Command::AckError, &[], reply_id);
            return;
        }

        let end = (offset + size).min(self.table.len());
        let chunk = self.table[offset.min(end)..end].to_vec();

        match self.chunk_reply {
            ChunkReply::Data => self.reply(Command::Data, &chunk, reply_id),
            ChunkReply::Prepared { frame_size } => {
                let announced = self.announced_size.unwrap_or(chunk.len() as u32);
                let mut prepare = announced.to_le_bytes().to_vec();
                prepare.extend_from_slice(&[0; 4]);
                self.reply(Command::PrepareData, &prepare, reply_id);

                let frame_size = match self.framing {
                    Framing::Tcp => frame_size,
                    Framing::Udp => 1024,
                };
                let pieces: Vec<&[u8]> = chunk.chunks(frame_size).collect();
                let sent = if self.truncated_chunks || self.interrupted_chunks {
                    pieces.len() / 2
                } else {
                    pieces.len()
                };
                let pieces: Vec<Vec<u8>> = pieces[..sent].iter().map(|p| p.to_vec()).collect();
                for piece in pieces {
                    self.reply(Command::Data, &piece, reply_id);
                }
                if self.truncated_chunks {
                    return;
                }
                if self.interrupted_chunks {
                    self.reply(Command::AckError, &[], reply_id);
                    return;
                }

                if self.bad_footers > 0 {
                    self.bad_footers -= 1;
                    self.reply(Command::AckError, &[], reply_id);
                } else {
                    self.reply(Command::AckOk, &[], reply_id);
                }
            }
        }
    }
}

#[async_trait]
impl Transport for FakeDevice {
    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let packet = match self.framing {
            Framing::Tcp => {
                assert_eq!(
                    unwrap_tcp(data),
                    Some((data.len() - TCP_FRAME_SIZE) as u32),
                    "client sent a broken TCP frame"
                );
                &data[TCP_FRAME_SIZE..]
            }
            Framing::Udp => data,
        };

        let header = PacketHeader::decode(packet).expect("client sent a runt packet");
        let payload = &packet[HEADER_SIZE..];
        self.log.push(Request {
            command: header.command,
            session_id: header.session_id,
            reply_id: header.reply_id,
            payload: payload.to_vec(),
        });

        self.respond(header, payload);
        Ok(())
    }

    async fn receive(&mut self, max_len: usize) -> Result<BytesMut> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        match self.framing {
            Framing::Tcp => {
                if self.stream.is_empty() {
                    return Err(Error::ReadTimeout);
                }
                let n = max_len
                    .min(self.segment_size.unwrap_or(usize::MAX))
                    .min(self.stream.len());
                Ok(self.stream.drain(..n).collect())
            }
            Framing::Udp => {
                let mut datagram = self.datagrams.pop_front().ok_or(Error::ReadTimeout)?;
                datagram.truncate(max_len);
                Ok(BytesMut::from(&datagram[..]))
            }
        }
    }

    fn remote_addr(&self) -> String {
        "fake-device:4370".to_string()
    }
}
