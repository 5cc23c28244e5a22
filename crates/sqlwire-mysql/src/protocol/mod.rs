//! MySQL wire protocol implementation.
//!
//! MySQL packets have a 4-byte header:
//! - 3 bytes: payload length (little-endian)
//! - 1 byte: sequence number
//!
//! Maximum packet payload is 2^24 - 1 (16MB - 1). Larger incoming payloads
//! arrive as continuation packets; outgoing payloads are never split.

pub mod buffer;
pub mod capabilities;
pub mod stream;

pub use buffer::{Direction, PacketBuffer};
pub use stream::PacketStream;

use sqlwire_core::Error;
use sqlwire_core::error::{
    ProtocolError, QueryError, QueryErrorKind, UnsupportedError, UnsupportedFeature,
};

/// Maximum payload size for a single MySQL packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// Size of the packet header (3-byte length + 1-byte sequence).
pub const HEADER_SIZE: usize = 4;

/// Max packet size announced in the handshake response (1 MiB).
pub const CLIENT_MAX_PACKET_SIZE: u32 = 1 << 20;

/// Error code the server uses for progress-report ERR packets.
pub const PROGRESS_REPORT_CODE: u16 = 0xFFFF;

/// MySQL command codes (COM_xxx) issued by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Quit connection
    Quit = 0x01,
    /// Switch database
    InitDb = 0x02,
    /// Text protocol query
    Query = 0x03,
    /// Ping server
    Ping = 0x0e,
    /// Reset session state
    ResetConnection = 0x1f,
}

impl Command {
    /// Name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Command::Quit => "COM_QUIT",
            Command::InitDb => "COM_INIT_DB",
            Command::Query => "COM_QUERY",
            Command::Ping => "COM_PING",
            Command::ResetConnection => "COM_RESET_CONNECTION",
        }
    }
}

/// First payload byte of the packet kinds the classifier knows.
pub mod marker {
    pub const OK: u8 = 0x00;
    pub const LOCAL_INFILE: u8 = 0xFB;
    pub const EOF: u8 = 0xFE;
    pub const ERR: u8 = 0xFF;
}

/// A MySQL packet header.
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    /// Payload length (3 bytes, max 16MB - 1)
    pub payload_length: u32,
    /// Sequence number (wraps at 255)
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Parse a packet header from 4 bytes.
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        let payload_length =
            u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16);
        Self {
            payload_length,
            sequence_id: bytes[3],
        }
    }

    /// Encode the header to 4 bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(&self) -> [u8; 4] {
        [
            (self.payload_length & 0xFF) as u8,
            ((self.payload_length >> 8) & 0xFF) as u8,
            ((self.payload_length >> 16) & 0xFF) as u8,
            self.sequence_id,
        ]
    }
}

/// Parsed OK packet.
#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    /// Number of affected rows
    pub affected_rows: u64,
    /// Last insert ID
    pub last_insert_id: u64,
    /// Server status flags
    pub status_flags: u16,
    /// Number of warnings
    pub warnings: u16,
}

/// Parsed Error packet.
#[derive(Debug, Clone)]
pub struct ErrPacket {
    /// Error code
    pub error_code: u16,
    /// SQL state (5 characters), if the server sent one
    pub sql_state: Option<String>,
    /// Error message
    pub error_message: String,
}

impl ErrPacket {
    /// Check if this is a progress report rather than a real error.
    pub fn is_progress_report(&self) -> bool {
        self.error_code == PROGRESS_REPORT_CODE
    }
}

impl ErrPacket {
    /// Classify the server error code.
    pub fn kind(&self) -> QueryErrorKind {
        match self.error_code {
            1062 | 1169 | 1216 | 1217 | 1451 | 1452 | 1048 | 3819 => QueryErrorKind::Constraint,
            1064 | 1149 => QueryErrorKind::Syntax,
            1049 | 1051 | 1054 | 1146 => QueryErrorKind::NotFound,
            1044 | 1045 | 1142 | 1143 | 1227 => QueryErrorKind::Permission,
            1205 | 1213 => QueryErrorKind::Deadlock,
            _ => QueryErrorKind::Database,
        }
    }
}

pub(crate) fn protocol_error(msg: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: None,
        source: None,
    })
}

pub(crate) fn unsupported(feature: UnsupportedFeature, msg: impl Into<String>) -> Error {
    Error::Unsupported(UnsupportedError {
        feature,
        message: msg.into(),
    })
}

pub(crate) fn large_packet_error(len: usize) -> Error {
    unsupported(
        UnsupportedFeature::LargePacket,
        format!("payload of {len} bytes would need splitting across packets"),
    )
}

/// Turn an ERR packet into the error reported to the caller.
pub(crate) fn server_error(err: ErrPacket) -> Error {
    if err.is_progress_report() {
        return protocol_error("progress reporting is not supported");
    }
    Error::Query(QueryError {
        kind: err.kind(),
        code: Some(err.error_code),
        sqlstate: err.sql_state,
        sql: None,
        message: err.error_message,
        source: None,
    })
}
