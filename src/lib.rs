//! # FlashResp - The Network Core of a Redis-Compatible Server
//!
//! FlashResp is the part of a Redis-compatible server that talks to the
//! network: a streaming RESP parser, a per-connection request loop, and a
//! listener that shuts down without truncating replies that are already on
//! their way out.
//!
//! ## Features
//!
//! - **Streaming RESP parser**: Pull-based, binary-safe, bounded by
//!   configurable limits, and able to recover from a malformed frame
//! - **Pluggable execution**: Requests are handed to any [`CommandExecutor`]
//! - **Graceful shutdown**: Every reply is tracked in flight; shutdown waits
//!   for them (up to a timeout) before closing sockets
//! - **Async I/O**: Built on Tokio for handling thousands of concurrent connections
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashResp                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────────────────────┐    ┌─────────────┐  │
//! │  │ TCP Server  │───>│     ConnectionHandler       │───>│  Command    │  │
//! │  │ (Listener)  │    │  ┌───────────┐ ┌─────────┐  │    │  Executor   │  │
//! │  └──────┬──────┘    │  │RespParser │ │ Drain   │  │    └─────────────┘  │
//! │         │           │  │           │ │ Tracker │  │                     │
//! │         │           │  └───────────┘ └─────────┘  │                     │
//! │         │           │   active connections (map)  │                     │
//! │         │           └──────────────▲──────────────┘                     │
//! │         │     shutdown: close()    │                                    │
//! │         └──────────────────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashresp::{CommandHandler, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(&ServerConfig::default(), CommandHandler::new()).await?;
//!
//!     // Serves until Ctrl+C / SIGTERM, then drains and closes every connection
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP types, serialization and the streaming parser
//! - [`connection`]: Per-connection loop, active set, and drain tracking
//! - [`commands`]: The executor interface and a minimal built-in executor
//! - [`server`]: Accept loop and shutdown orchestration
//! - [`config`]: Command-line and runtime configuration
//!
//! ## Design Highlights
//!
//! ### Recoverable Parsing
//!
//! A malformed frame yields one error payload, which the client receives as a
//! `-ERR Protocol error: ...` reply. The parse state is then reset and the
//! connection keeps going. Only end of stream and I/O failures end a parser.
//!
//! ### Ordered, Drained Replies
//!
//! Requests on one connection are answered strictly in arrival order. Each
//! reply is bracketed by a drain unit, and shutdown waits for the count to
//! reach zero before closing the socket.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use commands::{CommandError, CommandExecutor, CommandHandler};
pub use config::{Args, ServerConfig};
pub use connection::{ConnectionHandler, ConnectionOutcome, ConnectionStats, DrainTracker};
pub use protocol::{ParseError, ParserLimits, Payload, RespParser, RespValue};
pub use server::{shutdown_signal, Server};

/// The default port FlashResp listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host FlashResp binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FlashResp
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
