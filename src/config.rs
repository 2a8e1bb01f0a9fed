//! Server configuration.
//!
//! Command-line flags (with environment fallbacks) are parsed by clap into
//! [`Args`], which is then turned into the library-level [`ServerConfig`].

use crate::connection::DEFAULT_DRAIN_TIMEOUT;
use crate::protocol::parser::{MAX_ARRAY_LEN, MAX_BULK_SIZE, MAX_INLINE_LEN, MAX_NESTING_DEPTH};
use crate::protocol::ParserLimits;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::time::Duration;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "flashresp")]
#[command(version)]
#[command(about = "A Redis-protocol server core with graceful shutdown", long_about = None)]
pub struct Args {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST, env = "FLASHRESP_HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "FLASHRESP_PORT")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Seconds shutdown waits for each connection's in-flight replies
    #[arg(long, default_value_t = DEFAULT_DRAIN_TIMEOUT.as_secs())]
    pub drain_timeout_secs: u64,

    /// Largest accepted bulk string, in bytes
    #[arg(long, default_value_t = MAX_BULK_SIZE)]
    pub max_bulk_len: usize,

    /// Largest accepted array element count
    #[arg(long, default_value_t = MAX_ARRAY_LEN)]
    pub max_array_len: usize,

    /// Deepest accepted array nesting
    #[arg(long, default_value_t = MAX_NESTING_DEPTH)]
    pub max_depth: usize,

    /// Longest accepted protocol line, in bytes
    #[arg(long, default_value_t = MAX_INLINE_LEN)]
    pub max_inline_len: usize,
}

/// Runtime settings for a server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Per-connection drain timeout during shutdown
    pub drain_timeout: Duration,
    /// Parser size limits
    pub limits: ParserLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            limits: ParserLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            drain_timeout: Duration::from_secs(args.drain_timeout_secs),
            limits: ParserLimits {
                max_bulk_len: args.max_bulk_len,
                max_array_len: args.max_array_len,
                max_depth: args.max_depth,
                max_inline_len: args.max_inline_len,
            },
        }
    }
}
