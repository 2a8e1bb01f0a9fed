//! Connection Handler Module
//!
//! This module manages individual client connections to FlashResp.
//! Each client connection is handled by its own async task, allowing
//! the server to handle thousands of concurrent clients efficiently.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Parse RESP  │───>│ Execute cmd │───>│ Send resp   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                            │                                │
//! │                     ┌──────┴──────┐                         │
//! │                     │DrainTracker │ <── shutdown waits here │
//! │                     └─────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Transport-agnostic**: Any `AsyncRead + AsyncWrite` stream works
//! - **Pipelining**: Multiple requests in one packet are answered in order
//! - **Graceful close**: In-flight replies are drained before a socket closes
//! - **Statistics**: Tracks connection and request metrics

pub mod drain;
pub mod handler;

// Re-export commonly used types
pub use drain::{DrainGuard, DrainTracker};
pub use handler::{
    ClientHandle, ConnectionError, ConnectionHandler, ConnectionOutcome, ConnectionStats,
    DEFAULT_DRAIN_TIMEOUT,
};
