//! MySQL/MariaDB client protocol engine for sqlwire.
//!
//! This crate implements the client side of the MySQL wire protocol from
//! scratch on top of tokio. It provides:
//!
//! - Packet framing with sequence numbers and continuation packets
//! - Capability negotiation, including MariaDB's extended flags
//! - Authentication (`mysql_native_password`, `mysql_clear_password`)
//! - A dispatcher task that owns the socket, serializes commands and keeps
//!   the connection alive with periodic pings
//! - Text-protocol queries decoded into [`sqlwire_core::Row`]s
//!
//! # Protocol Overview
//!
//! Every packet carries a 3-byte payload length and a 1-byte sequence
//! number. A command resets the sequence; each packet of the exchange
//! increments it. Payloads of exactly 16 MiB - 1 bytes continue in the
//! next packet.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlwire_mysql::{MySqlConfig, MySqlConnection};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = MySqlConfig::new()
//!     .host("localhost")
//!     .user("root")
//!     .password("123123")
//!     .database("lab01");
//!
//! let lifetime = CancellationToken::new();
//! let conn = MySqlConnection::connect(config, &lifetime).await?;
//! let rows = conn.query("SELECT id, digit FROM numbers").await?;
//! conn.close().await?;
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod handshake;
pub mod protocol;
pub mod query;
pub mod types;

pub use auth::AuthPlugin;
pub use config::MySqlConfig;
pub use connection::MySqlConnection;
pub use dispatcher::{Command, ResponseStream};
pub use query::{QueryResponse, ResultOptions};
pub use types::{ColumnDef, FieldType};
