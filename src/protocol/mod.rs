//! RESP Protocol Implementation
//!
//! This module provides the Redis Serialization Protocol (RESP) used on every
//! FlashResp connection.
//!
//! ## Overview
//!
//! RESP is a simple, binary-safe protocol used by Redis for client-server communication.
//! It supports several data types and is designed to be easy to parse and serialize.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Streaming parser that turns a byte stream into payloads
//!
//! ## Example
//!
//! ```ignore
//! use flashresp::protocol::{RespParser, RespValue};
//! use bytes::Bytes;
//!
//! // Parsing incoming data
//! let mut parser = RespParser::new(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
//! let request = parser.next_payload().await.unwrap()?;
//!
//! // Creating responses
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! let bytes = response.serialize();
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{
    parse_stream, ParseError, ParseResult, ParseState, ParserLimits, Payload, RespParser,
};
pub use types::RespValue;
