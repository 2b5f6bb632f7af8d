//! Protocol constants

/// TCP frame magic (first u16 of every TCP-wrapped packet)
pub const TCP_MAGIC_1: u16 = 0x5050;

/// TCP frame magic (second u16)
pub const TCP_MAGIC_2: u16 = 0x7D82;

/// Largest value a reply id counter reaches before wrapping
pub const USHRT_MAX: u16 = 0xFFFF;

/// Reply id a fresh session starts from
pub const INITIAL_REPLY_ID: u16 = USHRT_MAX - 1;

/// Default socket timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 60;

/// Timeout used by the TCP reachability probe (seconds)
pub const PROBE_TIMEOUT: u64 = 10;

/// Attempts per chunk in a buffered read
pub const MAX_RETRIES: usize = 3;

/// Default tick value mixed into the CommKey
pub const DEFAULT_TICKS: u8 = 50;

/// Chunking limits for buffered transfers
pub mod chunk {
    /// Largest chunk requested per READ_BUFFER over TCP (below 0x10008)
    pub const MAX_CHUNK_TCP: u32 = 0xFFC0;

    /// Largest chunk requested per READ_BUFFER over UDP
    pub const MAX_CHUNK_UDP: u32 = 16 * 1024;

    /// Chunk size used when writing a buffer to the device
    pub const WRITE_CHUNK: usize = 1024;

    /// Size of one UDP data datagram (payload + header)
    pub const UDP_PACKET: usize = 1024 + 8;

    /// Extra bytes requested on top of a TCP chunk (header, footer)
    pub const TCP_CHUNK_SLACK: usize = 32;
}

/// User record widths
pub mod user_packet {
    /// ZK6 firmware, usually reached over UDP
    pub const LEGACY: usize = 28;

    /// ZK8 firmware, usually reached over TCP
    pub const EXTENDED: usize = 72;
}

/// Data type flags (for CMD_PREPARE_BUFFER, etc.)
pub mod data_types {
    /// Attendance log
    pub const FCT_ATTLOG: i32 = 1;

    /// Fingerprint template
    pub const FCT_FINGERTMP: i32 = 2;

    /// Operation log
    pub const FCT_OPLOG: i32 = 4;

    /// User record
    pub const FCT_USER: i32 = 5;

    /// SMS
    pub const FCT_SMS: i32 = 6;

    /// User data
    pub const FCT_UDATA: i32 = 7;

    /// Work code
    pub const FCT_WORKCODE: i32 = 8;
}
