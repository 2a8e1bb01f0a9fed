//! Command Execution Layer
//!
//! The connection handler does not interpret requests. It hands every decoded
//! request to a [`CommandExecutor`] and writes back whatever reply comes out.
//! Real deployments plug their own dispatch table and storage in here.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandExecutor │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//!    RespValue reply
//! ```
//!
//! [`CommandHandler`] is the minimal executor the binary ships with:
//! `PING [message]` and `ECHO message`.

pub mod handler;

use crate::protocol::RespValue;
use thiserror::Error;

// Re-export the built-in executor
pub use handler::CommandHandler;

/// Command-level failures, sent to the client as `-ERR ...` replies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The request was not an array
    #[error("ERR invalid command format")]
    InvalidFormat,

    /// The request was an empty array
    #[error("ERR empty command")]
    EmptyCommand,

    /// The command name was not a string
    #[error("ERR invalid command name")]
    InvalidCommandName,

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// Any other failure reported by an executor
    #[error("{0}")]
    Failed(String),
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(err.to_string())
    }
}

/// Executes decoded requests.
///
/// Called from the connection task, once per request and in arrival order.
pub trait CommandExecutor: Send + Sync + 'static {
    /// Produces the reply for one request.
    fn execute(&self, request: RespValue) -> Result<RespValue, CommandError>;
}

impl<F> CommandExecutor for F
where
    F: Fn(RespValue) -> Result<RespValue, CommandError> + Send + Sync + 'static,
{
    fn execute(&self, request: RespValue) -> Result<RespValue, CommandError> {
        self(request)
    }
}

/// Splits a request into its upper-cased command name and arguments.
pub fn split_command(request: RespValue) -> Result<(String, Vec<RespValue>), CommandError> {
    let mut args = request.into_array().ok_or(CommandError::InvalidFormat)?;
    if args.is_empty() {
        return Err(CommandError::EmptyCommand);
    }

    let name = args
        .remove(0)
        .as_str()
        .map(str::to_uppercase)
        .ok_or(CommandError::InvalidCommandName)?;

    Ok((name, args))
}

/// Returns true if `request` is a `QUIT` command.
pub fn is_quit(request: &RespValue) -> bool {
    request
        .as_array()
        .and_then(<[RespValue]>::first)
        .and_then(RespValue::as_str)
        .is_some_and(|name| name.eq_ignore_ascii_case("QUIT"))
}
