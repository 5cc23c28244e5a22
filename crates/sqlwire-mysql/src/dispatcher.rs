//! Command dispatcher: the single task that owns the socket.
//!
//! Callers never touch the transport. They enqueue a [`Command`] (request
//! packet plus a delivery channel) and read the response packets back from
//! the matching [`ResponseStream`]. The dispatcher services one command at a
//! time, so packets of two commands never interleave on the wire.
//!
//! Each loop iteration handles exactly one of:
//! - cancellation of the connection lifetime (the loop exits)
//! - a queued command (write, then drain the response)
//! - a keep-alive tick (a `COM_PING` whose response is discarded)

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use sqlwire_core::error::UnsupportedFeature;
use sqlwire_core::{Error, Result};

use crate::protocol::stream::is_disconnect;
use crate::protocol::{self, PacketBuffer, PacketStream, protocol_error, unsupported};

/// Buffered response packets per command.
pub const DELIVERY_CAPACITY: usize = 10;

/// Queued commands waiting for the dispatcher.
pub const QUEUE_CAPACITY: usize = 1;

type Delivery = Result<PacketBuffer>;

/// A request packet plus the channel its response is delivered on.
#[derive(Debug)]
pub struct Command {
    kind: protocol::Command,
    packet: PacketBuffer,
    reply: mpsc::Sender<Delivery>,
}

impl Command {
    /// Build a command with `body` following the command byte.
    ///
    /// The header is finalized when the packet is written; a body too large
    /// for one packet is reported on the response stream.
    pub fn new(kind: protocol::Command, body: &[u8]) -> (Self, ResponseStream) {
        let mut packet = PacketBuffer::with_capacity(protocol::HEADER_SIZE + 1 + body.len());
        packet.write_empty_header();
        packet.write_u8(kind as u8);
        packet.write_bytes(body);

        let (reply, rx) = mpsc::channel(DELIVERY_CAPACITY);
        let stream = ResponseStream { rx, lifetime: None };
        (Self { kind, packet, reply }, stream)
    }

    /// `COM_QUERY` with the SQL text as payload (no terminator).
    pub fn query(sql: &str) -> (Self, ResponseStream) {
        Self::new(protocol::Command::Query, sql.as_bytes())
    }

    /// `COM_PING`.
    pub fn ping() -> (Self, ResponseStream) {
        Self::new(protocol::Command::Ping, &[])
    }

    /// `COM_INIT_DB`.
    pub fn init_db(database: &str) -> (Self, ResponseStream) {
        Self::new(protocol::Command::InitDb, database.as_bytes())
    }

    /// `COM_RESET_CONNECTION`.
    pub fn reset_connection() -> (Self, ResponseStream) {
        Self::new(protocol::Command::ResetConnection, &[])
    }

    /// `COM_QUIT`.
    pub fn quit() -> (Self, ResponseStream) {
        Self::new(protocol::Command::Quit, &[])
    }

    /// Command code.
    pub fn kind(&self) -> protocol::Command {
        self.kind
    }
}

/// Receiving end of a command's response.
///
/// Yields response packets in wire order and ends when the dispatcher closes
/// the channel: after the final packet, after an error, or on shutdown.
#[derive(Debug)]
pub struct ResponseStream {
    rx: mpsc::Receiver<Delivery>,
    lifetime: Option<CancellationToken>,
}

impl ResponseStream {
    /// Report a stream cut short by cancelling `lifetime` as
    /// [`Error::Cancelled`] rather than a disconnect.
    ///
    /// The dispatcher cannot always queue the cancellation error itself: the
    /// buffer may be full of packets the caller has not read yet.
    #[must_use]
    pub fn cancelled_by(mut self, lifetime: CancellationToken) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Next response packet, or `None` once the response is complete.
    pub async fn next(&mut self) -> Option<Result<PacketBuffer>> {
        self.rx.recv().await
    }

    /// Next response packet; a closed stream is an error.
    pub async fn expect_packet(&mut self) -> Result<PacketBuffer> {
        match self.next().await {
            Some(item) => item,
            None if self.lifetime.as_ref().is_some_and(CancellationToken::is_cancelled) => {
                Err(Error::Cancelled)
            }
            None => Err(closed_error()),
        }
    }

    /// Consume the rest of the response, returning the first error.
    pub async fn drain(mut self) -> Result<()> {
        let mut first_err = None;
        while let Some(item) = self.next().await {
            if let Err(e) = item {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

pub(crate) fn closed_error() -> Error {
    Error::Connection(sqlwire_core::error::ConnectionError {
        kind: sqlwire_core::error::ConnectionErrorKind::Disconnected,
        message: "connection is closed".to_string(),
        source: None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the first packet
    First,
    /// Column definitions still to come
    Columns(u64),
    /// EOF after the column definitions (no `DEPRECATE_EOF`)
    ColumnsEof,
    /// Row packets until the terminator
    Rows,
    Done,
}

/// Decides when a command's response is complete.
///
/// Single-packet commands end after the first packet. A `COM_QUERY` response
/// ends at an OK first packet or at the result-set terminator after the
/// column definitions and rows. Counting column definitions keeps a row that
/// starts with `0x00` or `0xFB` from being taken for an OK or LOCAL INFILE
/// packet.
#[derive(Debug, Clone)]
pub struct ResponseTracker {
    kind: protocol::Command,
    deprecate_eof: bool,
    phase: Phase,
}

impl ResponseTracker {
    pub fn new(kind: protocol::Command, deprecate_eof: bool) -> Self {
        Self {
            kind,
            deprecate_eof,
            phase: Phase::First,
        }
    }

    /// Only the first packet of a query can be a LOCAL INFILE request.
    pub fn expects_local_infile(&self) -> bool {
        self.kind == protocol::Command::Query && self.phase == Phase::First
    }

    /// Record one response packet. Returns true when it was the last one.
    pub fn observe(&mut self, packet: &PacketBuffer) -> Result<bool> {
        self.phase = match self.phase {
            Phase::First if self.kind != protocol::Command::Query => Phase::Done,
            Phase::First if packet.is_ok() => Phase::Done,
            Phase::First => match packet.clone().read_lenenc_int()? {
                0 => Phase::Done,
                n => Phase::Columns(n),
            },
            Phase::Columns(1) if self.deprecate_eof => Phase::Rows,
            Phase::Columns(1) => Phase::ColumnsEof,
            Phase::Columns(n) => Phase::Columns(n - 1),
            Phase::ColumnsEof if packet.is_eof() => Phase::Rows,
            Phase::ColumnsEof => {
                return Err(protocol_error("expected EOF after column definitions"));
            }
            Phase::Rows if packet.is_result_terminator(self.deprecate_eof) => Phase::Done,
            Phase::Rows => Phase::Rows,
            Phase::Done => return Err(protocol_error("packet after end of response")),
        };
        Ok(self.phase == Phase::Done)
    }

    /// True once the final packet has been observed.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

/// The dispatcher task state.
pub struct Dispatcher<S> {
    stream: PacketStream<S>,
    commands: mpsc::Receiver<Command>,
    lifetime: CancellationToken,
    keepalive_interval: Duration,
    deprecate_eof: bool,
}

impl<S> Dispatcher<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a dispatcher and the queue used to reach it.
    pub fn new(
        stream: PacketStream<S>,
        lifetime: CancellationToken,
        keepalive_interval: Duration,
        deprecate_eof: bool,
    ) -> (Self, mpsc::Sender<Command>) {
        let (tx, commands) = mpsc::channel(QUEUE_CAPACITY);
        let dispatcher = Self {
            stream,
            commands,
            lifetime,
            keepalive_interval,
            deprecate_eof,
        };
        (dispatcher, tx)
    }

    /// Run until cancelled, until every sender is dropped, or until the
    /// connection fails.
    ///
    /// On exit the queue is closed; queued commands are dropped, which closes
    /// their response streams.
    pub async fn run(mut self) {
        // interval_at panics on a zero period
        let period = self.keepalive_interval.max(Duration::from_millis(1));
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.lifetime.cancelled() => {
                    tracing::debug!("dispatcher cancelled");
                    break;
                }
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        tracing::debug!("all connection handles dropped");
                        break;
                    };
                    if !self.execute(cmd).await {
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    tracing::debug!("keep-alive ping");
                    // Nobody reads the response; the drain still runs to completion.
                    let (cmd, _) = Command::ping();
                    if !self.execute(cmd).await {
                        break;
                    }
                }
            }
        }

        self.commands.close();
        tracing::debug!("dispatcher stopped");
    }

    /// Write one command and drain its response.
    ///
    /// Returns false when the connection can no longer be used.
    async fn execute(&mut self, cmd: Command) -> bool {
        let Command {
            kind,
            mut packet,
            reply,
        } = cmd;

        tracing::debug!(
            command = kind.name(),
            len = packet.payload_len(),
            "dispatching command"
        );

        self.stream.reset_sequence();
        if let Err(err) = self.stream.write_packet(&mut packet).await {
            // Nothing reached the wire when the packet was refused up front
            let usable = matches!(err, Error::Unsupported(_));
            return deliver(&self.lifetime, &reply, Err(err)).await && usable;
        }

        let mut tracker = ResponseTracker::new(kind, self.deprecate_eof);
        loop {
            let read = tokio::select! {
                biased;
                () = self.lifetime.cancelled() => {
                    // A full buffer drops this; the stream reports it on close
                    let _ = reply.try_send(Err(Error::Cancelled));
                    return false;
                }
                read = self.stream.read_packet() => read,
            };

            let packet = match read {
                Ok(packet) => packet,
                Err(err) if kind == protocol::Command::Quit && is_disconnect(&err) => {
                    tracing::debug!("server closed the connection after COM_QUIT");
                    return false;
                }
                Err(err) => {
                    let usable = !err.is_connection_error();
                    return deliver(&self.lifetime, &reply, Err(err)).await && usable;
                }
            };

            if tracker.expects_local_infile() && packet.is_local_infile() {
                return self.refuse_local_infile(&reply).await;
            }

            let done = match tracker.observe(&packet) {
                Ok(done) => done,
                Err(err) => {
                    deliver(&self.lifetime, &reply, Err(err)).await;
                    return false;
                }
            };

            if !deliver(&self.lifetime, &reply, Ok(packet)).await {
                return false;
            }
            if done {
                return kind != protocol::Command::Quit;
            }
        }
    }

    /// Answer a LOCAL INFILE request with an empty packet (no file) and
    /// consume the server's reply.
    async fn refuse_local_infile(&mut self, reply: &mpsc::Sender<Delivery>) -> bool {
        let mut empty = PacketBuffer::outgoing();
        empty.write_empty_header();

        let usable = match self.stream.write_packet(&mut empty).await {
            Ok(()) => match self.stream.read_packet().await {
                Ok(_) => true,
                Err(err) => !err.is_connection_error(),
            },
            Err(_) => false,
        };

        let err = unsupported(
            UnsupportedFeature::LocalInfile,
            "LOAD DATA LOCAL INFILE is not supported",
        );
        deliver(&self.lifetime, reply, Err(err)).await && usable
    }
}

/// Hand one item to the caller.
///
/// Waits while the caller's buffer is full. A dropped receiver is not an
/// error. Returns false if the lifetime was cancelled while waiting; the item
/// is then dropped and the caller sees the stream close.
async fn deliver(
    lifetime: &CancellationToken,
    reply: &mpsc::Sender<Delivery>,
    item: Delivery,
) -> bool {
    if reply.is_closed() {
        if let Err(err) = &item {
            tracing::warn!(error = %err, "command failed with no one waiting for it");
        }
        return true;
    }
    tokio::select! {
        biased;
        () = lifetime.cancelled() => false,
        _ = reply.send(item) => true,
    }
}
