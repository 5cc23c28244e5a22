//! Packet framing over an async byte stream.
//!
//! `PacketStream` owns the transport and the sequence counter. Every packet
//! read is checked for the server ERR marker here, so callers above this
//! layer only ever see ERR packets as `Error::Query`.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sqlwire_core::error::{ConnectionError, ConnectionErrorKind};
use sqlwire_core::{Error, Result};

use super::{HEADER_SIZE, MAX_PACKET_SIZE, PacketBuffer, PacketHeader, server_error};

/// A framed MySQL packet stream.
#[derive(Debug)]
pub struct PacketStream<S> {
    stream: S,
    sequence_id: u8,
}

impl<S> PacketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected transport.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            sequence_id: 0,
        }
    }

    /// Sequence number the next outgoing packet will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence_id
    }

    /// Start a new command exchange (sequence back to 0).
    pub fn reset_sequence(&mut self) {
        self.sequence_id = 0;
    }

    /// Read one logical packet.
    ///
    /// A payload of exactly `0xFFFFFF` bytes is followed by continuation
    /// packets; they are concatenated into the returned buffer. ERR packets
    /// are returned as `Error::Query`.
    pub async fn read_packet(&mut self) -> Result<PacketBuffer> {
        let packet = self.read_packet_raw().await?;
        if packet.is_err() {
            let err = packet.clone().parse_err()?;
            tracing::debug!(
                code = err.error_code,
                sqlstate = err.sql_state.as_deref().unwrap_or(""),
                "server returned ERR packet"
            );
            return Err(server_error(err));
        }
        Ok(packet)
    }

    /// Read one logical packet without ERR conversion.
    pub async fn read_packet_raw(&mut self) -> Result<PacketBuffer> {
        let header = self.read_header().await?;
        let mut data = Vec::with_capacity(HEADER_SIZE + header.payload_length as usize);
        data.extend_from_slice(&header.to_bytes());
        self.read_payload(&mut data, header.payload_length as usize)
            .await?;

        let mut last_len = header.payload_length as usize;
        while last_len == MAX_PACKET_SIZE {
            let cont = self.read_header().await?;
            last_len = cont.payload_length as usize;
            self.read_payload(&mut data, last_len).await?;
        }

        let packet = PacketBuffer::incoming(data);
        tracing::trace!(
            len = packet.payload_len(),
            seq = header.sequence_id,
            "read packet"
        );
        Ok(packet)
    }

    async fn read_header(&mut self) -> Result<PacketHeader> {
        let mut header_buf = [0u8; HEADER_SIZE];
        self.stream
            .read_exact(&mut header_buf)
            .await
            .map_err(|e| read_error("failed to read packet header", e))?;

        let header = PacketHeader::from_bytes(&header_buf);
        if header.sequence_id != self.sequence_id {
            tracing::warn!(
                expected = self.sequence_id,
                got = header.sequence_id,
                "packet sequence mismatch"
            );
        }
        self.sequence_id = header.sequence_id.wrapping_add(1);
        Ok(header)
    }

    async fn read_payload(&mut self, data: &mut Vec<u8>, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let start = data.len();
        data.resize(start + len, 0);
        self.stream
            .read_exact(&mut data[start..])
            .await
            .map_err(|e| read_error("failed to read packet payload", e))?;
        Ok(())
    }

    /// Finalize the header of `packet` and write it.
    ///
    /// The packet takes the stream's current sequence number.
    pub async fn write_packet(&mut self, packet: &mut PacketBuffer) -> Result<()> {
        packet.write_empty_header();
        packet.update_header()?;
        packet.set_sequence(self.sequence_id);

        tracing::trace!(
            len = packet.payload_len(),
            seq = self.sequence_id,
            "write packet"
        );

        self.stream
            .write_all(packet.as_bytes())
            .await
            .map_err(write_error)?;
        self.stream.flush().await.map_err(write_error)?;
        self.sequence_id = self.sequence_id.wrapping_add(1);
        Ok(())
    }
}

fn read_error(context: &str, e: io::Error) -> Error {
    let kind = if e.kind() == io::ErrorKind::UnexpectedEof {
        ConnectionErrorKind::Disconnected
    } else {
        ConnectionErrorKind::Read
    };
    Error::Connection(ConnectionError {
        kind,
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    })
}

fn write_error(e: io::Error) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Write,
        message: format!("failed to write packet: {e}"),
        source: Some(Box::new(e)),
    })
}

/// True when `err` means the peer closed the connection.
pub(crate) fn is_disconnect(err: &Error) -> bool {
    matches!(
        err,
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            ..
        })
    )
}
