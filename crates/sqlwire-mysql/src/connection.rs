//! MySQL connection handle.
//!
//! A [`MySqlConnection`] is a thin front over the dispatcher task. Every
//! operation builds a command, enqueues it, and reads the response stream;
//! the socket itself is owned by the dispatcher.

use std::io;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sqlwire_core::error::{ConnectionError, ConnectionErrorKind};
use sqlwire_core::{Error, Result, Row};

use crate::auth::AuthPlugin;
use crate::config::MySqlConfig;
use crate::dispatcher::{Command, Dispatcher, ResponseStream, closed_error};
use crate::handshake::{self, HandshakeInfo};
use crate::protocol::capabilities::{
    CLIENT_DEPRECATE_EOF, MARIADB_CLIENT_EXTENDED_TYPE_INFO, has,
};
use crate::protocol::{OkPacket, PacketStream, protocol_error};
use crate::query::{self, QueryResponse, ResultOptions};

/// An established MySQL/MariaDB connection.
///
/// The handle is `Send + Sync`; concurrent callers are serialized by the
/// dispatcher, one command at a time. Dropping the handle cancels the
/// connection lifetime, which stops the dispatcher and closes the socket
/// without a `COM_QUIT`; use [`close`](Self::close) for an orderly shutdown.
pub struct MySqlConnection {
    commands: mpsc::Sender<Command>,
    lifetime: CancellationToken,
    task: Option<JoinHandle<()>>,
    config: MySqlConfig,
    server: HandshakeInfo,
    client_capabilities: u64,
    auth_plugin: AuthPlugin,
    options: ResultOptions,
    affected_rows: AtomicU64,
    last_insert_id: AtomicU64,
    status_flags: AtomicU16,
    warnings: AtomicU16,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("connection_id", &self.server.connection_id)
            .field("server_version", &self.server.server_version)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl MySqlConnection {
    /// Dial the server and run the handshake.
    ///
    /// The connection lives on a child of `lifetime`: cancelling `lifetime`
    /// tears down this connection and every other one derived from it. When
    /// `connect_timeout` is set it bounds the dial and the handshake together.
    pub async fn connect(config: MySqlConfig, lifetime: &CancellationToken) -> Result<Self> {
        config.validate()?;
        let limit = config.connect_timeout;
        let establish = async {
            let stream = dial(&config).await?;
            Self::establish(stream, config, lifetime).await
        };

        match limit {
            Some(limit) => tokio::time::timeout(limit, establish)
                .await
                .map_err(|_| Error::Timeout)?,
            None => establish.await,
        }
    }

    /// Run the handshake over an already connected transport.
    ///
    /// `connect_timeout`, when set, bounds the handshake.
    pub async fn connect_with_stream<S>(
        stream: S,
        config: MySqlConfig,
        lifetime: &CancellationToken,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        config.validate()?;
        match config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, Self::establish(stream, config, lifetime))
                .await
                .map_err(|_| Error::Timeout)?,
            None => Self::establish(stream, config, lifetime).await,
        }
    }

    async fn establish<S>(
        stream: S,
        config: MySqlConfig,
        lifetime: &CancellationToken,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let lifetime = lifetime.child_token();
        let mut packets = PacketStream::new(stream);

        let negotiated = tokio::select! {
            biased;
            () = lifetime.cancelled() => return Err(Error::Cancelled),
            result = handshake::perform(&mut packets, &config) => result?,
        };

        let options = ResultOptions {
            deprecate_eof: has(negotiated.client_capabilities, CLIENT_DEPRECATE_EOF)
                && has(negotiated.server.capabilities, CLIENT_DEPRECATE_EOF),
            extended_type_info: has(
                negotiated.client_capabilities,
                MARIADB_CLIENT_EXTENDED_TYPE_INFO,
            ) && has(
                negotiated.server.capabilities,
                MARIADB_CLIENT_EXTENDED_TYPE_INFO,
            ),
        };

        let (dispatcher, commands) = Dispatcher::new(
            packets,
            lifetime.clone(),
            config.keepalive_interval,
            options.deprecate_eof,
        );
        let task = tokio::spawn(dispatcher.run());

        tracing::debug!(
            connection_id = negotiated.server.connection_id,
            deprecate_eof = options.deprecate_eof,
            "connection established"
        );

        Ok(Self {
            commands,
            lifetime,
            task: Some(task),
            config,
            server: negotiated.server,
            client_capabilities: negotiated.client_capabilities,
            auth_plugin: negotiated.auth_plugin,
            options,
            affected_rows: AtomicU64::new(0),
            last_insert_id: AtomicU64::new(0),
            status_flags: AtomicU16::new(negotiated.status_flags),
            warnings: AtomicU16::new(0),
        })
    }

    /// Run one SQL statement through the text protocol.
    ///
    /// A statement without a result set returns no rows and updates
    /// [`affected_rows`](Self::affected_rows) and
    /// [`last_insert_id`](Self::last_insert_id).
    pub async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        tracing::debug!(sql = %sql, "query");

        let (cmd, response) = self.command(Command::query(sql));
        self.submit(cmd).await?;
        let outcome = query::read_response(response, self.options)
            .await
            .map_err(|e| attach_sql(e, sql))?;

        match outcome {
            QueryResponse::Ok(ok) => {
                self.record(&ok);
                Ok(Vec::new())
            }
            QueryResponse::Rows(rows) => Ok(rows),
        }
    }

    /// Check that the server is alive.
    pub async fn ping(&self) -> Result<()> {
        let (cmd, response) = self.command(Command::ping());
        self.simple_command(cmd, response).await.map(|_| ())
    }

    /// Change the default database.
    pub async fn use_database(&self, database: &str) -> Result<()> {
        let (cmd, response) = self.command(Command::init_db(database));
        self.simple_command(cmd, response).await.map(|_| ())
    }

    /// Reset session state (variables, temporary tables, open transaction).
    pub async fn reset(&self) -> Result<()> {
        let (cmd, response) = self.command(Command::reset_connection());
        self.simple_command(cmd, response).await.map(|_| ())
    }

    /// Send `COM_QUIT`, wait for the acknowledgement, and release the socket.
    ///
    /// The server either answers with an OK packet or closes the connection;
    /// both count as acknowledged.
    pub async fn close(mut self) -> Result<()> {
        let (cmd, response) = self.command(Command::quit());
        let result = match self.submit(cmd).await {
            Ok(()) => response.drain().await,
            Err(e) => Err(e),
        };

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "dispatcher task failed");
            }
        }
        tracing::debug!(connection_id = self.server.connection_id, "connection closed");
        result
    }

    /// Affected rows reported by the last statement without a result set.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows.load(Ordering::Acquire)
    }

    /// Insert id reported by the last statement without a result set.
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id.load(Ordering::Acquire)
    }

    /// Warning count from the last OK packet.
    pub fn warnings(&self) -> u16 {
        self.warnings.load(Ordering::Acquire)
    }

    /// Server status flags from the last OK packet.
    pub fn status_flags(&self) -> u16 {
        self.status_flags.load(Ordering::Acquire)
    }

    pub fn server_version(&self) -> &str {
        &self.server.server_version
    }

    pub fn protocol_version(&self) -> u8 {
        self.server.protocol_version
    }

    pub fn connection_id(&self) -> u32 {
        self.server.connection_id
    }

    /// Capability flags the server announced.
    pub fn server_capabilities(&self) -> u64 {
        self.server.capabilities
    }

    /// Capability flags this client sent in the handshake response.
    pub fn client_capabilities(&self) -> u64 {
        self.client_capabilities
    }

    pub fn auth_plugin(&self) -> AuthPlugin {
        self.auth_plugin
    }

    /// True once the dispatcher has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Tie a command's response stream to this connection's lifetime.
    fn command(&self, (cmd, response): (Command, ResponseStream)) -> (Command, ResponseStream) {
        (cmd, response.cancelled_by(self.lifetime.clone()))
    }

    async fn submit(&self, cmd: Command) -> Result<()> {
        self.commands.send(cmd).await.map_err(|_| {
            if self.lifetime.is_cancelled() {
                Error::Cancelled
            } else {
                closed_error()
            }
        })
    }

    /// Send a command whose whole response is one OK packet.
    async fn simple_command(&self, cmd: Command, mut response: ResponseStream) -> Result<OkPacket> {
        self.submit(cmd).await?;
        let mut packet = response.expect_packet().await?;
        if !packet.is_ok() {
            return Err(protocol_error("expected an OK packet"));
        }
        let ok = packet.parse_ok()?;
        self.status_flags.store(ok.status_flags, Ordering::Release);
        self.warnings.store(ok.warnings, Ordering::Release);
        Ok(ok)
    }

    fn record(&self, ok: &OkPacket) {
        self.affected_rows.store(ok.affected_rows, Ordering::Release);
        self.last_insert_id.store(ok.last_insert_id, Ordering::Release);
        self.status_flags.store(ok.status_flags, Ordering::Release);
        self.warnings.store(ok.warnings, Ordering::Release);
    }
}

impl Drop for MySqlConnection {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

async fn dial(config: &MySqlConfig) -> Result<TcpStream> {
    let addr = config.socket_addr();
    let stream = TcpStream::connect(&addr).await.map_err(|e| {
        let kind = if e.kind() == io::ErrorKind::ConnectionRefused {
            ConnectionErrorKind::Refused
        } else {
            ConnectionErrorKind::Connect
        };
        Error::Connection(ConnectionError {
            kind,
            message: format!("failed to connect to {addr}: {e}"),
            source: Some(Box::new(e)),
        })
    })?;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(error = %e, "failed to set TCP_NODELAY");
    }
    tracing::debug!(addr = %addr, "dialed server");
    Ok(stream)
}

fn attach_sql(err: Error, sql: &str) -> Error {
    match err {
        Error::Query(mut q) => {
            q.sql = Some(sql.to_string());
            Error::Query(q)
        }
        other => other,
    }
}
