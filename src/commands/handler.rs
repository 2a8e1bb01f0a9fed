//! Built-in Command Handler
//!
//! A deliberately small executor so the server answers something useful out
//! of the box. Storage-backed commands belong to a separate layer.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//!
//! `QUIT` never reaches an executor; the connection handler answers it.

use crate::commands::{split_command, CommandError, CommandExecutor};
use crate::protocol::RespValue;

/// Answers `PING` and `ECHO`; everything else is an unknown command.
#[derive(Debug, Clone, Default)]
pub struct CommandHandler;

impl CommandHandler {
    pub fn new() -> Self {
        Self
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, cmd: &str, args: &[RespValue]) -> Result<RespValue, CommandError> {
        match cmd {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            _ => Err(CommandError::UnknownCommand(cmd.to_string())),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[RespValue]) -> Result<RespValue, CommandError> {
        match args {
            [] => Ok(RespValue::pong()),
            [msg] => Ok(message(msg)),
            _ => Err(CommandError::WrongArity("PING".to_string())),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[RespValue]) -> Result<RespValue, CommandError> {
        match args {
            [msg] => Ok(message(msg)),
            _ => Err(CommandError::WrongArity("ECHO".to_string())),
        }
    }
}

impl CommandExecutor for CommandHandler {
    fn execute(&self, request: RespValue) -> Result<RespValue, CommandError> {
        let (name, args) = split_command(request)?;
        self.dispatch(&name, &args)
    }
}

/// Echoes an argument back as a bulk string.
fn message(arg: &RespValue) -> RespValue {
    match arg {
        RespValue::SimpleString(s) => RespValue::bulk_string(s.clone()),
        other => other.clone(),
    }
}
