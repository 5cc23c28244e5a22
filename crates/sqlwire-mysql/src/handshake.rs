//! Connection handshake: initial packet, capability negotiation and auth.
//!
//! The exchange is linear with no retries:
//! 1. Read the server's initial handshake packet
//! 2. Negotiate client capabilities
//! 3. Send the handshake response with the auth token
//! 4. Read the auth result; an auth switch request is fatal

#![allow(clippy::cast_possible_truncation)]

use tokio::io::{AsyncRead, AsyncWrite};

use sqlwire_core::error::{ConnectionError, ConnectionErrorKind, UnsupportedFeature};
use sqlwire_core::{Error, Result};

use crate::auth::{AuthPlugin, plugins};
use crate::config::MySqlConfig;
use crate::protocol::capabilities::{
    self, CLIENT_CONNECT_ATTRS, CLIENT_CONNECT_WITH_DB, CLIENT_MYSQL, CLIENT_PLUGIN_AUTH,
    CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA, CLIENT_SECURE_CONNECTION, has,
};
use crate::protocol::{
    CLIENT_MAX_PACKET_SIZE, PacketBuffer, PacketStream, marker, protocol_error, unsupported,
};

/// Protocol version spoken by every supported server.
pub const PROTOCOL_VERSION: u8 = 10;

/// Contents of the server's initial handshake packet.
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    /// Protocol version
    pub protocol_version: u8,
    /// Server version string
    pub server_version: String,
    /// Connection ID
    pub connection_id: u32,
    /// Scramble (both fragments joined)
    pub scramble: Vec<u8>,
    /// Server capability flags, MariaDB extended bits included
    pub capabilities: u64,
    /// Default collation
    pub collation: u8,
    /// Server status flags
    pub status_flags: u16,
    /// Authentication plugin announced by the server
    pub auth_plugin: String,
}

impl HandshakeInfo {
    /// Parse the initial handshake packet.
    pub fn parse(packet: &mut PacketBuffer) -> Result<Self> {
        packet.rewind();

        let protocol_version = packet.read_u8()?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(protocol_error(format!(
                "unsupported protocol version: {protocol_version}"
            )));
        }

        let server_version = packet.read_null_string()?;
        let connection_id = packet.read_u32_le()?;

        let mut scramble = packet.read_bytes(8)?.to_vec();
        packet.skip(1)?;

        let caps_lower = packet.read_u16_le()?;
        let collation = packet.read_u8()?;
        let status_flags = packet.read_u16_le()?;
        let caps_upper = packet.read_u16_le()?;
        let mut caps = u64::from(caps_lower) | (u64::from(caps_upper) << 16);

        let auth_data_len = if has(caps, CLIENT_PLUGIN_AUTH) {
            usize::from(packet.read_u8()?)
        } else {
            packet.skip(1)?;
            0
        };

        packet.skip(6)?;

        // MySQL servers set bit 0 and leave these 4 bytes reserved; MariaDB
        // clears it and sends its extended capabilities here.
        if has(caps, CLIENT_MYSQL) {
            packet.skip(4)?;
        } else {
            caps |= u64::from(packet.read_u32_le()?) << 32;
        }

        if has(caps, CLIENT_SECURE_CONNECTION) {
            let len = auth_data_len.saturating_sub(9).max(12);
            scramble.extend_from_slice(packet.read_bytes(len)?);
            packet.skip(1)?;
        }

        let auth_plugin = if has(caps, CLIENT_PLUGIN_AUTH) {
            read_plugin_name(packet)
        } else {
            plugins::MYSQL_NATIVE_PASSWORD.to_string()
        };

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            scramble,
            capabilities: caps,
            collation,
            status_flags,
            auth_plugin,
        })
    }
}

// Some servers omit the terminator after the plugin name.
fn read_plugin_name(packet: &mut PacketBuffer) -> String {
    let rest = packet.read_rest();
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

/// Build the handshake response packet.
///
/// Optional fields are written according to `client_caps`, the mask the
/// client negotiated.
pub fn build_handshake_response(
    info: &HandshakeInfo,
    config: &MySqlConfig,
    client_caps: u64,
    plugin: AuthPlugin,
) -> Result<PacketBuffer> {
    let token = plugin.token(config.password_str(), &info.scramble);

    let mut packet = PacketBuffer::outgoing();
    packet.write_empty_header();

    packet.write_u32_le(client_caps as u32);
    packet.write_u32_le(CLIENT_MAX_PACKET_SIZE);
    packet.write_u8(info.collation);
    packet.write_zeros(19);
    packet.write_u32_le((client_caps >> 32) as u32);

    packet.write_null_string(&config.user);

    if has(client_caps, CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA) {
        packet.write_lenenc_bytes(&token);
    } else if has(client_caps, CLIENT_SECURE_CONNECTION) {
        let len = u8::try_from(token.len())
            .map_err(|_| protocol_error(format!("auth token of {} bytes", token.len())))?;
        packet.write_u8(len);
        packet.write_bytes(&token);
    } else {
        packet.write_bytes(&token);
        packet.write_u8(0);
    }

    if has(client_caps, CLIENT_CONNECT_WITH_DB) {
        packet.write_null_string(config.database.as_deref().unwrap_or(""));
    }

    if has(client_caps, CLIENT_PLUGIN_AUTH) {
        packet.write_null_string(plugin.name());
    }

    if has(client_caps, CLIENT_CONNECT_ATTRS) {
        packet.write_u8(0);
    }

    packet.update_header()?;
    packet.set_sequence(1);
    Ok(packet)
}

/// Result of a successful handshake.
#[derive(Debug, Clone)]
pub struct Negotiated {
    /// The server's initial handshake
    pub server: HandshakeInfo,
    /// Capability mask the client sent
    pub client_capabilities: u64,
    /// Plugin used to authenticate
    pub auth_plugin: AuthPlugin,
    /// Status flags from the auth OK packet
    pub status_flags: u16,
}

/// Run the handshake on a freshly connected stream.
pub async fn perform<S>(stream: &mut PacketStream<S>, config: &MySqlConfig) -> Result<Negotiated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut initial = stream.read_packet().await.map_err(handshake_error)?;
    let server = HandshakeInfo::parse(&mut initial).map_err(handshake_error)?;

    tracing::debug!(
        server_version = %server.server_version,
        connection_id = server.connection_id,
        plugin = %server.auth_plugin,
        capabilities = ?capabilities::describe(server.capabilities),
        "received initial handshake"
    );

    let client_caps = capabilities::negotiate(server.capabilities, config.database.as_deref());
    let plugin = AuthPlugin::from_name(&server.auth_plugin)?;

    let mut response = build_handshake_response(&server, config, client_caps, plugin)?;
    stream.write_packet(&mut response).await?;

    let mut result = stream.read_packet().await.map_err(auth_error)?;
    if result.peek_at(crate::protocol::HEADER_SIZE) == Some(marker::EOF) {
        return Err(unsupported(
            UnsupportedFeature::AuthSwitch,
            "server requested an authentication switch",
        ));
    }

    let status_flags = if result.is_ok() {
        result.parse_ok()?.status_flags
    } else {
        tracing::debug!(
            kind = ?result.peek_at(crate::protocol::HEADER_SIZE),
            "auth result is not an OK packet"
        );
        server.status_flags
    };

    tracing::debug!(
        user = %config.user,
        plugin = plugin.name(),
        "authenticated"
    );

    Ok(Negotiated {
        server,
        client_capabilities: client_caps,
        auth_plugin: plugin,
        status_flags,
    })
}

fn handshake_error(err: Error) -> Error {
    match err {
        Error::Connection(_) => err,
        other => Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Handshake,
            message: format!("handshake failed: {other}"),
            source: Some(Box::new(other)),
        }),
    }
}

fn auth_error(err: Error) -> Error {
    match err {
        Error::Query(q) => Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Authentication,
            message: format!(
                "authentication failed: {} ({})",
                q.message,
                q.code.unwrap_or_default()
            ),
            source: Some(Box::new(Error::Query(q))),
        }),
        other => other,
    }
}
