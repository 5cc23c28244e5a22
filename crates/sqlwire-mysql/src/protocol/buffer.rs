//! Wire buffer: a byte cursor over one MySQL packet.
//!
//! A `PacketBuffer` always carries its 4-byte header in front of the payload.
//! Outgoing buffers reserve the header with [`PacketBuffer::write_empty_header`]
//! and fill it in with [`PacketBuffer::update_header`] once the payload is
//! complete. Incoming buffers are created from the raw packet bytes and the
//! read cursor starts right after the header.
//!
//! All reads are bounds-checked: reading past the end of the packet is a
//! protocol error, never a fabricated zero.

#![allow(clippy::cast_possible_truncation)]

use sqlwire_core::Result;

use super::{
    ErrPacket, HEADER_SIZE, MAX_PACKET_SIZE, OkPacket, large_packet_error, marker, protocol_error,
};

/// NULL marker in a length-encoded string context.
pub const LENENC_NULL: u8 = 0xFB;

/// Which way a packet travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Built by the client, to be written to the server
    Outgoing,
    /// Read from the server
    Incoming,
}

/// A MySQL packet with a read cursor.
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    data: Vec<u8>,
    pos: usize,
    direction: Direction,
    has_header: bool,
}

impl PacketBuffer {
    /// Create an empty outgoing packet.
    pub fn outgoing() -> Self {
        Self::with_capacity(256)
    }

    /// Create an empty outgoing packet with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pos: 0,
            direction: Direction::Outgoing,
            has_header: false,
        }
    }

    /// Wrap a packet read from the server. `data` must start with the header.
    pub fn incoming(data: Vec<u8>) -> Self {
        let pos = HEADER_SIZE.min(data.len());
        Self {
            data,
            pos,
            direction: Direction::Incoming,
            has_header: true,
        }
    }

    /// Direction of this packet.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whole packet, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer and return the packet bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Total length, header included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload length, header excluded.
    pub fn payload_len(&self) -> usize {
        if self.has_header {
            self.data.len().saturating_sub(HEADER_SIZE)
        } else {
            self.data.len()
        }
    }

    /// Payload bytes, header excluded.
    pub fn payload(&self) -> &[u8] {
        if self.has_header {
            self.data.get(HEADER_SIZE..).unwrap_or(&[])
        } else {
            &self.data
        }
    }

    /// Current read position (absolute, header included).
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move the read cursor back to the first payload byte.
    pub fn rewind(&mut self) {
        self.pos = if self.has_header {
            HEADER_SIZE.min(self.data.len())
        } else {
            0
        };
    }

    // === Header ===

    /// Reserve a zeroed 4-byte header in front of the payload.
    ///
    /// Calling this more than once, or after `write_header`, has no effect.
    pub fn write_empty_header(&mut self) {
        if self.has_header {
            return;
        }
        let mut data = Vec::with_capacity(self.data.len() + HEADER_SIZE);
        data.extend_from_slice(&[0u8; HEADER_SIZE]);
        data.append(&mut self.data);
        self.data = data;
        self.pos += HEADER_SIZE;
        self.has_header = true;
    }

    /// Prepend a header computed from the bytes written so far.
    ///
    /// Calling this more than once, or after `write_empty_header`, only
    /// refreshes the length and sequence.
    pub fn write_header(&mut self, sequence: u8) -> Result<()> {
        self.write_empty_header();
        self.update_header()?;
        self.set_sequence(sequence);
        Ok(())
    }

    /// Recompute the 3-byte length field from the current payload size.
    pub fn update_header(&mut self) -> Result<()> {
        if !self.has_header {
            return Err(protocol_error("packet header was never reserved"));
        }
        // Payloads of MAX_PACKET_SIZE or more need continuation packets.
        let len = self.payload_len();
        if len >= MAX_PACKET_SIZE {
            return Err(large_packet_error(len));
        }
        self.data[0] = (len & 0xFF) as u8;
        self.data[1] = ((len >> 8) & 0xFF) as u8;
        self.data[2] = ((len >> 16) & 0xFF) as u8;
        Ok(())
    }

    /// Length recorded in the header, if there is one.
    pub fn header_length(&self) -> Option<usize> {
        if !self.has_header || self.data.len() < HEADER_SIZE {
            return None;
        }
        Some(
            usize::from(self.data[0])
                | (usize::from(self.data[1]) << 8)
                | (usize::from(self.data[2]) << 16),
        )
    }

    /// Set the sequence number (4th header byte).
    pub fn set_sequence(&mut self, sequence: u8) {
        if self.has_header && self.data.len() >= HEADER_SIZE {
            self.data[3] = sequence;
        }
    }

    /// Sequence number (4th header byte).
    pub fn sequence(&self) -> Option<u8> {
        if self.has_header {
            self.data.get(3).copied()
        } else {
            None
        }
    }

    // === Writes ===

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Write a u16 (little-endian).
    pub fn write_u16_le(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u24 (little-endian, 3 bytes).
    pub fn write_u24_le(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    /// Write a u32 (little-endian).
    pub fn write_u32_le(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u64 (little-endian).
    pub fn write_u64_le(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Write `n` zero bytes.
    pub fn write_zeros(&mut self, n: usize) {
        self.data.resize(self.data.len() + n, 0);
    }

    /// Write a null-terminated string.
    pub fn write_null_string(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
    }

    /// Write a length-encoded integer.
    ///
    /// - below 0xFB: 1 byte
    /// - 0xFC + 2 bytes: up to 0xFFFF
    /// - 0xFD + 3 bytes: up to 0xFFFFFF
    /// - 0xFE + 8 bytes: everything else
    pub fn write_lenenc_int(&mut self, value: u64) {
        if value < 0xFB {
            self.write_u8(value as u8);
        } else if value <= 0xFFFF {
            self.write_u8(0xFC);
            self.write_u16_le(value as u16);
        } else if value <= 0xFF_FFFF {
            self.write_u8(0xFD);
            self.write_u24_le(value as u32);
        } else {
            self.write_u8(0xFE);
            self.write_u64_le(value);
        }
    }

    /// Write a length-encoded byte string.
    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.data.extend_from_slice(data);
    }

    /// Write a length-encoded string.
    pub fn write_lenenc_string(&mut self, s: &str) {
        self.write_lenenc_bytes(s.as_bytes());
    }

    // === Reads ===

    /// Read a byte at an absolute offset without advancing.
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    /// Read the next byte without advancing.
    pub fn peek(&self) -> Option<u8> {
        self.peek_at(self.pos)
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        if self.remaining() < len {
            return Err(protocol_error(format!(
                "packet truncated: wanted {len} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Skip a number of bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    /// Read a u16 (little-endian).
    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Read a u24 (little-endian, 3 bytes).
    pub fn read_u24_le(&mut self) -> Result<u32> {
        let [a, b, c] = self.read_array::<3>()?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    /// Read a u32 (little-endian).
    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Read a u64 (little-endian).
    pub fn read_u64_le(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Read a length-encoded integer.
    ///
    /// `0xFB` (NULL) and `0xFF` are not integers; callers that accept NULL
    /// check for it with [`PacketBuffer::read_nullable_lenenc_bytes`].
    pub fn read_lenenc_int(&mut self) -> Result<u64> {
        let first = self.read_u8()?;
        match first {
            0x00..=0xFA => Ok(u64::from(first)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => self.read_u24_le().map(u64::from),
            0xFE => self.read_u64_le(),
            0xFB | 0xFF => Err(protocol_error(format!(
                "0x{first:02x} is not a length-encoded integer"
            ))),
        }
    }

    /// Read a length-encoded byte string.
    pub fn read_lenenc_bytes(&mut self) -> Result<&[u8]> {
        let len = self.read_lenenc_int()?;
        let len = usize::try_from(len)
            .map_err(|_| protocol_error(format!("string length {len} overflows usize")))?;
        self.read_bytes(len)
    }

    /// Read a length-encoded string, NULL marker included.
    pub fn read_nullable_lenenc_bytes(&mut self) -> Result<Option<&[u8]>> {
        if self.peek() == Some(LENENC_NULL) {
            self.pos += 1;
            return Ok(None);
        }
        self.read_lenenc_bytes().map(Some)
    }

    /// Read a length-encoded string.
    pub fn read_lenenc_string(&mut self) -> Result<String> {
        self.read_lenenc_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Skip a length-encoded string.
    pub fn skip_lenenc_string(&mut self) -> Result<()> {
        self.read_lenenc_bytes().map(|_| ())
    }

    /// Read a null-terminated string.
    pub fn read_null_string(&mut self) -> Result<String> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| protocol_error("unterminated string"))?;
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(s)
    }

    /// Read a fixed-length string.
    pub fn read_string(&mut self, len: usize) -> Result<String> {
        self.read_bytes(len)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read everything up to the end of the packet.
    pub fn read_rest(&mut self) -> &[u8] {
        let start = self.pos.min(self.data.len());
        self.pos = self.data.len();
        &self.data[start..]
    }

    // === Classification ===

    fn kind_byte(&self) -> Option<u8> {
        self.peek_at(HEADER_SIZE)
    }

    /// OK packet: incoming, `0x00` type byte.
    pub fn is_ok(&self) -> bool {
        self.direction == Direction::Incoming
            && self.kind_byte() == Some(marker::OK)
            && self.payload_len() < MAX_PACKET_SIZE
    }

    /// ERR packet: `0xFF` type byte.
    pub fn is_err(&self) -> bool {
        self.kind_byte() == Some(marker::ERR)
    }

    /// EOF packet: `0xFE` type byte and a payload shorter than 9 bytes.
    ///
    /// The length matters: a row can start with `0xFE` as the prefix of an
    /// 8-byte length-encoded integer.
    pub fn is_eof(&self) -> bool {
        self.kind_byte() == Some(marker::EOF) && self.payload_len() < 9
    }

    /// LOAD DATA LOCAL INFILE request: `0xFB` type byte.
    pub fn is_local_infile(&self) -> bool {
        self.kind_byte() == Some(marker::LOCAL_INFILE)
    }

    /// End of a result set's rows.
    ///
    /// With `DEPRECATE_EOF` the terminator is an OK packet carrying the
    /// `0xFE` marker, which may be longer than a classic EOF.
    pub fn is_result_terminator(&self, deprecate_eof: bool) -> bool {
        let limit = if deprecate_eof { MAX_PACKET_SIZE } else { 9 };
        self.kind_byte() == Some(marker::EOF) && self.payload_len() < limit
    }

    /// Error code of an ERR packet.
    pub fn error_code(&self) -> Option<u16> {
        if !self.is_err() {
            return None;
        }
        let lo = self.peek_at(HEADER_SIZE + 1)?;
        let hi = self.peek_at(HEADER_SIZE + 2)?;
        Some(u16::from(lo) | (u16::from(hi) << 8))
    }

    // === Packet decoding ===

    /// Decode an OK packet (or a `DEPRECATE_EOF` terminator).
    ///
    /// Layout: marker, affected rows (lenenc), last insert id (lenenc),
    /// status flags (u16), warnings (u16), then optional info.
    pub fn parse_ok(&mut self) -> Result<OkPacket> {
        self.rewind();
        let marker_byte = self.read_u8()?;
        if marker_byte != marker::OK && marker_byte != marker::EOF {
            return Err(protocol_error(format!(
                "expected OK packet, found type 0x{marker_byte:02x}"
            )));
        }
        let affected_rows = self.read_lenenc_int()?;
        let last_insert_id = self.read_lenenc_int()?;
        let status_flags = self.read_u16_le()?;
        let warnings = self.read_u16_le()?;

        Ok(OkPacket {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
        })
    }

    /// Decode an ERR packet.
    ///
    /// Layout: `0xFF`, error code (u16), optional `#` + 5-byte SQL state,
    /// then the message.
    pub fn parse_err(&mut self) -> Result<ErrPacket> {
        self.rewind();
        let marker_byte = self.read_u8()?;
        if marker_byte != marker::ERR {
            return Err(protocol_error(format!(
                "expected ERR packet, found type 0x{marker_byte:02x}"
            )));
        }
        let error_code = self.read_u16_le()?;

        let sql_state = if self.peek() == Some(b'#') {
            self.skip(1)?;
            Some(self.read_string(5)?)
        } else {
            None
        };

        let error_message = String::from_utf8_lossy(self.read_rest()).into_owned();

        Ok(ErrPacket {
            error_code,
            sql_state,
            error_message,
        })
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::outgoing()
    }
}
