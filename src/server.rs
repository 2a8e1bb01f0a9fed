//! TCP Listener and Shutdown Orchestration
//!
//! [`Server`] owns the listening socket and the shared [`ConnectionHandler`].
//! It accepts connections, spawns one task per connection, and when the
//! shutdown future resolves it runs the shutdown sequence:
//!
//! ```text
//! shutdown signal
//!       │
//!       ▼
//! 1. drop the listener          (new connects are refused by the OS)
//!       │
//!       ▼
//! 2. handler.close()            (late arrivals are refused by the handler,
//!       │                        active connections drain, then close)
//!       ▼
//! 3. wait for connection tasks  (bounded by the drain timeout)
//! ```

use crate::commands::CommandExecutor;
use crate::config::ServerConfig;
use crate::connection::ConnectionHandler;
use futures::future;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// First delay after a failed `accept`
const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Longest delay between `accept` retries
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// A bound listener plus the handler serving its connections.
pub struct Server<E> {
    listener: TcpListener,
    handler: Arc<ConnectionHandler<E>>,
}

impl<E: CommandExecutor> Server<E> {
    /// Binds to the configured address.
    pub async fn bind(config: &ServerConfig, executor: E) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        let handler = ConnectionHandler::new(executor)
            .with_limits(config.limits)
            .with_drain_timeout(config.drain_timeout);
        Ok(Self::new(listener, handler))
    }

    /// Wraps an already bound listener.
    pub fn new(listener: TcpListener, handler: ConnectionHandler<E>) -> Self {
        Self {
            listener,
            handler: Arc::new(handler),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handler(&self) -> &Arc<ConnectionHandler<E>> {
        &self.handler
    }

    /// Serves until a termination signal arrives.
    pub async fn run(self) {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then shuts down gracefully.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let Server { listener, handler } = self;
        let tracker = TaskTracker::new();

        match listener.local_addr() {
            Ok(addr) => info!(addr = %addr, "Listening"),
            Err(e) => debug!(error = %e, "Listening on unknown address"),
        }

        tokio::select! {
            _ = accept_loop(&listener, &handler, &tracker) => {}
            _ = shutdown => info!("Shutdown signal received, stopping server..."),
        }

        drop(listener);
        handler.close().await;

        tracker.close();
        if time::timeout(handler.drain_timeout(), tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = tracker.len(),
                "Connection tasks still running after shutdown"
            );
        }

        info!("Server shutdown complete");
    }
}

/// Accepts connections forever, spawning one tracked task per connection.
async fn accept_loop<E: CommandExecutor>(
    listener: &TcpListener,
    handler: &Arc<ConnectionHandler<E>>,
    tracker: &TaskTracker,
) {
    let mut backoff = MIN_ACCEPT_BACKOFF;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                backoff = MIN_ACCEPT_BACKOFF;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }

                let handler = Arc::clone(handler);
                tracker.spawn(async move {
                    handler.handle(stream, addr).await;
                });
            }
            Err(e) => {
                error!(
                    error = %e,
                    retry_in_ms = backoff.as_millis() as u64,
                    "Failed to accept connection"
                );
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
            }
        }
    }
}

/// Resolves on Ctrl+C, or on SIGTERM, SIGQUIT or SIGHUP on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut streams = Vec::new();
        for kind in [
            SignalKind::terminate(),
            SignalKind::quit(),
            SignalKind::hangup(),
        ] {
            match signal(kind) {
                Ok(stream) => streams.push(stream),
                Err(e) => warn!(error = %e, "Failed to install signal handler"),
            }
        }

        if streams.is_empty() {
            future::pending::<()>().await;
        }
        future::select_all(streams.iter_mut().map(|s| Box::pin(s.recv()))).await;
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
