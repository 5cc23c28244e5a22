//! Scripted MySQL server over an in-memory duplex pipe.

#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use sqlwire_mysql::protocol::capabilities::{
    CLIENT_CONNECT_WITH_DB, CLIENT_DEPRECATE_EOF, CLIENT_LONG_FLAG, CLIENT_MYSQL,
    CLIENT_PLUGIN_AUTH, CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA, CLIENT_PROTOCOL_41,
    CLIENT_SECURE_CONNECTION, CLIENT_TRANSACTIONS,
};

pub const FIELD_TYPE_LONG: u8 = 0x03;
pub const FIELD_TYPE_LONGLONG: u8 = 0x08;
pub const FIELD_TYPE_VAR_STRING: u8 = 0xFD;

/// What a recent MariaDB server announces.
pub const MARIADB_CAPS: u64 = CLIENT_LONG_FLAG
    | CLIENT_CONNECT_WITH_DB
    | CLIENT_PROTOCOL_41
    | CLIENT_TRANSACTIONS
    | CLIENT_SECURE_CONNECTION
    | CLIENT_PLUGIN_AUTH
    | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
    | CLIENT_DEPRECATE_EOF;

/// A MySQL server that still sends EOF packets.
pub const LEGACY_MYSQL_CAPS: u64 = CLIENT_MYSQL
    | CLIENT_LONG_FLAG
    | CLIENT_CONNECT_WITH_DB
    | CLIENT_PROTOCOL_41
    | CLIENT_TRANSACTIONS
    | CLIENT_SECURE_CONNECTION
    | CLIENT_PLUGIN_AUTH
    | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA;

pub const SCRAMBLE: [u8; 20] = [
    0x3a, 0x28, 0x5f, 0x2c, 0x68, 0x41, 0x6e, 0x2b, 0x55, 0x4c, 0x7e, 0x7b, 0x31, 0x3e, 0x65,
    0x70, 0x49, 0x24, 0x6d, 0x5a,
];

pub struct FakeServer {
    stream: DuplexStream,
}

impl FakeServer {
    pub fn new(stream: DuplexStream) -> Self {
        Self { stream }
    }

    /// Read one packet; returns its sequence number and payload.
    pub async fn read_packet(&mut self) -> (u8, Vec<u8>) {
        let mut header = [0u8; 4];
        self.stream
            .read_exact(&mut header)
            .await
            .expect("read packet header");
        let len = usize::from(header[0]) | usize::from(header[1]) << 8 | usize::from(header[2]) << 16;
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .expect("read packet payload");
        (header[3], payload)
    }

    /// Read a command packet and check it is the start of a new exchange.
    pub async fn read_command(&mut self) -> Vec<u8> {
        let (seq, payload) = self.read_packet().await;
        assert_eq!(seq, 0, "commands start a new sequence");
        payload
    }

    pub async fn write_packet(&mut self, seq: u8, payload: &[u8]) {
        let len = u32::try_from(payload.len()).expect("payload length");
        let mut frame = Vec::with_capacity(payload.len() + 4);
        frame.extend_from_slice(&len.to_le_bytes()[..3]);
        frame.push(seq);
        frame.extend_from_slice(payload);
        self.stream.write_all(&frame).await.expect("write packet");
        self.stream.flush().await.expect("flush");
    }

    /// Write a whole response, numbering packets from 1.
    pub async fn respond(&mut self, packets: &[Vec<u8>]) {
        for (seq, packet) in (1u8..).zip(packets) {
            self.write_packet(seq, packet).await;
        }
    }

    /// Send the initial handshake and return the client's response payload.
    pub async fn greet(&mut self, caps: u64, plugin: &str) -> Vec<u8> {
        let initial = handshake_packet(caps, plugin);
        self.write_packet(0, &initial).await;
        let (seq, response) = self.read_packet().await;
        assert_eq!(seq, 1, "handshake response follows the greeting");
        response
    }

    /// Full handshake ending in an auth OK.
    pub async fn accept(&mut self, caps: u64) -> Vec<u8> {
        let response = self.greet(caps, "mysql_native_password").await;
        self.write_packet(2, &ok_packet(0, 0)).await;
        response
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

pub fn handshake_packet(caps: u64, plugin: &str) -> Vec<u8> {
    let mut p = vec![10];
    p.extend_from_slice(b"5.5.5-10.11.6-MariaDB\0");
    p.extend_from_slice(&7u32.to_le_bytes());
    p.extend_from_slice(&SCRAMBLE[..8]);
    p.push(0);
    p.extend_from_slice(&(caps as u16).to_le_bytes());
    p.push(45);
    p.extend_from_slice(&2u16.to_le_bytes());
    p.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());
    p.push(21);
    p.extend_from_slice(&[0; 6]);
    if caps & CLIENT_MYSQL == 0 {
        p.extend_from_slice(&((caps >> 32) as u32).to_le_bytes());
    } else {
        p.extend_from_slice(&[0; 4]);
    }
    p.extend_from_slice(&SCRAMBLE[8..]);
    p.push(0);
    p.extend_from_slice(plugin.as_bytes());
    p.push(0);
    p
}

pub fn put_lenenc_int(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=250 => buf.push(value as u8),
        251..=0xFFFF => {
            buf.push(0xFC);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFF_FFFF => {
            buf.push(0xFD);
            buf.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
        }
        _ => {
            buf.push(0xFE);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

pub fn put_lenenc_str(buf: &mut Vec<u8>, s: &str) {
    put_lenenc_int(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

pub fn ok_packet(affected_rows: u64, last_insert_id: u64) -> Vec<u8> {
    let mut p = vec![0x00];
    put_lenenc_int(&mut p, affected_rows);
    put_lenenc_int(&mut p, last_insert_id);
    p.extend_from_slice(&2u16.to_le_bytes());
    p.extend_from_slice(&0u16.to_le_bytes());
    p
}

pub fn err_packet(code: u16, state: &str, message: &str) -> Vec<u8> {
    let mut p = vec![0xFF];
    p.extend_from_slice(&code.to_le_bytes());
    p.push(b'#');
    p.extend_from_slice(state.as_bytes());
    p.extend_from_slice(message.as_bytes());
    p
}

/// Pre-`DEPRECATE_EOF` EOF packet.
pub fn eof_packet() -> Vec<u8> {
    vec![0xFE, 0, 0, 0x02, 0]
}

/// OK-style result set terminator used with `DEPRECATE_EOF`.
pub fn terminator_packet() -> Vec<u8> {
    vec![0xFE, 0, 0, 0x02, 0, 0, 0]
}

pub fn column_count_packet(count: u64) -> Vec<u8> {
    let mut p = Vec::new();
    put_lenenc_int(&mut p, count);
    p
}

pub fn column_def_packet(name: &str, type_code: u8) -> Vec<u8> {
    let mut p = Vec::new();
    put_lenenc_str(&mut p, "def");
    put_lenenc_str(&mut p, "lab01");
    put_lenenc_str(&mut p, "numbers");
    put_lenenc_str(&mut p, "numbers");
    put_lenenc_str(&mut p, name);
    put_lenenc_str(&mut p, name);
    put_lenenc_int(&mut p, 0x0c);
    p.extend_from_slice(&63u16.to_le_bytes());
    p.extend_from_slice(&11u32.to_le_bytes());
    p.push(type_code);
    p.extend_from_slice(&0u16.to_le_bytes());
    p.push(0);
    p.extend_from_slice(&[0, 0]);
    p
}

pub fn row_packet(cells: &[Option<&str>]) -> Vec<u8> {
    let mut p = Vec::new();
    for cell in cells {
        match cell {
            Some(text) => put_lenenc_str(&mut p, text),
            None => p.push(0xFB),
        }
    }
    p
}

/// A complete text result set in the layout the capabilities call for.
pub fn result_set(
    columns: &[(&str, u8)],
    rows: &[Vec<Option<&str>>],
    deprecate_eof: bool,
) -> Vec<Vec<u8>> {
    let mut packets = vec![column_count_packet(columns.len() as u64)];
    for (name, type_code) in columns {
        packets.push(column_def_packet(name, *type_code));
    }
    if !deprecate_eof {
        packets.push(eof_packet());
    }
    for row in rows {
        packets.push(row_packet(row));
    }
    packets.push(if deprecate_eof {
        terminator_packet()
    } else {
        eof_packet()
    });
    packets
}
