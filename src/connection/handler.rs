//! Connection Handler Module
//!
//! This module handles individual client connections to FlashResp.
//! Each client gets its own handler task that runs in a loop,
//! reading requests and sending responses.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects
//!        │
//!        ├── handler closing? ──> close immediately (Refused)
//!        ▼
//! 2. Registered in the active set
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  parse next payload          │
//!    │  begin drain unit            │
//!    │  execute request             │
//!    │  write + flush reply         │
//!    │  end drain unit              │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. EOF / QUIT / shutdown / transport error
//!        │
//!        ▼
//! 5. Deregistered, socket shut down
//! ```
//!
//! ## Shutdown
//!
//! [`ConnectionHandler::close`] stops admitting connections, then for every
//! registered client waits for its in-flight replies to drain (bounded by the
//! drain timeout) before telling it to close. A client that does not drain in
//! time is closed even if a write is still pending.

use crate::commands::{is_quit, CommandExecutor};
use crate::connection::drain::DrainTracker;
use crate::protocol::{ParseError, ParserLimits, RespParser, RespValue};
use dashmap::DashMap;
use futures::future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How long shutdown waits for a connection's in-flight replies.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Connections closed on arrival because the handler was closing
    pub connections_refused: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests processed
    pub requests_processed: AtomicU64,
    /// Malformed frames answered with a protocol error
    pub protocol_errors: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_refused(&self) {
        self.connections_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// The shutdown-facing side of one registered connection.
#[derive(Debug)]
pub struct ClientHandle {
    id: u64,
    addr: SocketAddr,
    drain: DrainTracker,
    /// Stop reading once the current reply is out
    close: CancellationToken,
    /// Abandon a reply that is still being written
    force_close: CancellationToken,
}

impl ClientHandle {
    fn new(id: u64, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            drain: DrainTracker::new(),
            close: CancellationToken::new(),
            force_close: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn drain(&self) -> &DrainTracker {
        &self.drain
    }

    /// Waits for in-flight replies, then asks the connection to close.
    ///
    /// Returns `false` if the drain timed out and the connection was closed
    /// with a write still pending.
    pub async fn close(&self, timeout: Duration) -> bool {
        let drained = self.drain.wait_drained(timeout).await;
        if !drained {
            warn!(
                client = %self.addr,
                in_flight = self.drain.in_flight(),
                "Drain timed out, forcing close"
            );
            self.force_close.cancel();
        }
        self.close.cancel();
        drained
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Arrived while the handler was closing; never read from
    Refused,
    /// The client closed the stream
    Disconnected,
    /// The client sent `QUIT`
    Quit,
    /// Closed by the shutdown sequence
    ShutDown,
    /// Torn down after a transport error
    Failed,
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// A pending write was abandoned by the shutdown sequence
    #[error("Connection force-closed during shutdown")]
    ForceClosed,
}

/// Serves RESP connections against a [`CommandExecutor`].
///
/// One instance is shared by every connection task. It owns the registry of
/// active connections and the closing flag used by shutdown.
pub struct ConnectionHandler<E> {
    executor: E,
    active: DashMap<u64, Arc<ClientHandle>>,
    closing: CancellationToken,
    next_id: AtomicU64,
    limits: ParserLimits,
    drain_timeout: Duration,
    stats: Arc<ConnectionStats>,
}

impl<E: CommandExecutor> ConnectionHandler<E> {
    /// Creates a handler with default limits and drain timeout.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            active: DashMap::new(),
            closing: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            limits: ParserLimits::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn with_limits(mut self, limits: ParserLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_stats(mut self, stats: Arc<ConnectionStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Number of connections currently registered.
    pub fn active_connections(&self) -> usize {
        self.active.len()
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Runs the request/response loop for one connection.
    ///
    /// Returns when the client disconnects or quits, the connection is closed
    /// by shutdown, or the transport fails. The stream is shut down before
    /// returning.
    pub async fn handle<S>(&self, mut stream: S, addr: SocketAddr) -> ConnectionOutcome
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        if self.is_closing() {
            return self.refuse(&mut stream, addr).await;
        }

        let client = Arc::new(ClientHandle::new(
            self.next_id.fetch_add(1, Ordering::Relaxed),
            addr,
        ));
        self.active.insert(client.id, Arc::clone(&client));

        // `close` may have snapshotted the registry between the check above
        // and the insert.
        if self.is_closing() {
            self.active.remove(&client.id);
            return self.refuse(&mut stream, addr).await;
        }

        self.stats.connection_opened();
        info!(client = %addr, id = client.id, "Client connected");

        let (reader, writer) = tokio::io::split(stream);
        let mut parser = RespParser::with_limits(reader, self.limits);
        let mut writer = BufWriter::new(writer);

        let result = self.serve(&client, &mut parser, &mut writer).await;

        self.active.remove(&client.id);
        self.stats.connection_closed();

        // A force-closed writer still has a reply it cannot flush; just drop it.
        if !matches!(result, Err(ConnectionError::ForceClosed)) {
            if let Err(e) = writer.shutdown().await {
                warn!(client = %addr, error = %e, "Failed to close connection");
            }
        }

        match result {
            Ok(outcome) => {
                info!(client = %addr, outcome = ?outcome, "Client disconnected");
                outcome
            }
            Err(ConnectionError::UnexpectedEof) => {
                debug!(client = %addr, "Client disconnected mid-request");
                ConnectionOutcome::Disconnected
            }
            Err(ConnectionError::IoError(ref io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %addr, "Connection reset by client");
                ConnectionOutcome::Failed
            }
            Err(e) => {
                warn!(client = %addr, error = %e, "Connection error");
                ConnectionOutcome::Failed
            }
        }
    }

    /// Stops admitting connections and closes every registered one.
    ///
    /// Each connection gets up to the drain timeout to finish the reply it is
    /// writing. Connections are drained concurrently, so the whole call is
    /// bounded by a single drain timeout.
    pub async fn close(&self) {
        info!(active = self.active.len(), "Handler shutting down");
        self.closing.cancel();

        let clients: Vec<Arc<ClientHandle>> = self
            .active
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let timeout = self.drain_timeout;
        let results = future::join_all(clients.iter().map(|client| client.close(timeout))).await;

        let forced = results.iter().filter(|drained| !**drained).count();
        if forced > 0 {
            warn!(forced, "Some connections were closed before draining");
        }
    }

    async fn refuse<S>(&self, stream: &mut S, addr: SocketAddr) -> ConnectionOutcome
    where
        S: AsyncWrite + Unpin,
    {
        self.stats.connection_refused();
        debug!(client = %addr, "Refusing connection, handler is closing");
        if let Err(e) = stream.shutdown().await {
            debug!(client = %addr, error = %e, "Failed to close refused connection");
        }
        ConnectionOutcome::Refused
    }

    /// The main read-execute-respond loop.
    async fn serve<R, W>(
        &self,
        client: &ClientHandle,
        parser: &mut RespParser<R>,
        writer: &mut BufWriter<W>,
    ) -> Result<ConnectionOutcome, ConnectionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let payload = tokio::select! {
                biased;
                _ = client.close.cancelled() => return Ok(ConnectionOutcome::ShutDown),
                payload = parser.next_payload() => payload,
            };

            let request = match payload {
                None | Some(Err(ParseError::Eof)) => return Ok(ConnectionOutcome::Disconnected),
                Some(Err(ParseError::UnexpectedEof)) => return Err(ConnectionError::UnexpectedEof),
                Some(Err(ParseError::Io(e))) => return Err(ConnectionError::IoError(e)),
                Some(Err(e)) => {
                    warn!(client = %client.addr, error = %e, "Protocol error");
                    self.stats.protocol_error();
                    let _unit = client.drain.begin();
                    let reply = RespValue::error(format!("ERR Protocol error: {}", e));
                    self.send_response(client, writer, &reply).await?;
                    continue;
                }
                Some(Ok(request)) => request,
            };

            trace!(client = %client.addr, request = ?request, "Parsed request");

            let _unit = client.drain.begin();
            let quit = is_quit(&request);
            let response = if quit {
                RespValue::ok()
            } else {
                self.executor
                    .execute(request)
                    .unwrap_or_else(RespValue::from)
            };
            self.stats.request_processed();

            self.send_response(client, writer, &response).await?;

            if quit {
                return Ok(ConnectionOutcome::Quit);
            }
        }
    }

    /// Sends a response to the client.
    async fn send_response<W>(
        &self,
        client: &ClientHandle,
        writer: &mut BufWriter<W>,
        response: &RespValue,
    ) -> Result<(), ConnectionError>
    where
        W: AsyncWrite + Unpin,
    {
        let bytes = response.serialize();

        tokio::select! {
            biased;
            res = async {
                writer.write_all(&bytes).await?;
                writer.flush().await
            } => res?,
            _ = client.force_close.cancelled() => return Err(ConnectionError::ForceClosed),
        }

        self.stats.bytes_written(bytes.len());
        trace!(
            client = %client.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}
