//! The RESP Reply Model
//!
//! [`RespValue`] is both what the parser yields for a request and what an
//! executor hands back as a reply. Every value serializes to exactly one RESP
//! unit:
//!
//! | Variant        | Wire form                      |
//! |----------------|--------------------------------|
//! | `SimpleString` | `+OK\r\n`                      |
//! | `Error`        | `-ERR unknown command\r\n`     |
//! | `Integer`      | `:1000\r\n`                    |
//! | `BulkString`   | `$5\r\nhello\r\n`              |
//! | `Null`         | `$-1\r\n`                      |
//! | `NullArray`    | `*-1\r\n`                      |
//! | `Array`        | `*2\r\n$3\r\nGET\r\n:1\r\n`    |
//!
//! ## Two kinds of null
//!
//! Clients tell `$-1` (a missing key) apart from `*-1` (a timed out blocking
//! pop, an aborted transaction), and both apart from their empty counterparts.
//! Each gets its own variant so a reply round-trips byte for byte:
//!
//! ```
//! use flashresp::protocol::RespValue;
//!
//! assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
//! assert_eq!(RespValue::null_array().serialize(), b"*-1\r\n");
//! assert_eq!(RespValue::array(vec![]).serialize(), b"*0\r\n");
//! assert!(RespValue::null_array().is_null());
//! assert_ne!(RespValue::null(), RespValue::null_array());
//! ```
//!
//! ## Line-oriented text
//!
//! Simple strings and errors are single lines on the wire. CR and LF inside
//! them are written as spaces, so an executor cannot split one reply into
//! two. Bulk strings carry any bytes verbatim:
//!
//! ```
//! use bytes::Bytes;
//! use flashresp::protocol::RespValue;
//!
//! let err = RespValue::error("ERR bad\r\n+OK");
//! assert_eq!(err.serialize(), b"-ERR bad  +OK\r\n");
//!
//! let bulk = RespValue::bulk_string(Bytes::from_static(b"a\r\nb"));
//! assert_eq!(bulk.serialize(), b"$4\r\na\r\nb\r\n");
//! ```

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// Represents a value in the RESP protocol.
///
/// This enum covers all RESP data types and can be used for both
/// parsing incoming data and serializing outgoing responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// A single line of text. `+<string>\r\n`
    ///
    /// Parsed input that is not valid UTF-8 is decoded lossily (invalid
    /// sequences become U+FFFD); use a bulk string for arbitrary bytes.
    SimpleString(String),

    /// An error line, conventionally starting with a code such as `ERR`.
    /// `-<message>\r\n`, decoded like a simple string.
    Error(String),

    /// 64-bit signed integers.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe payload; the parser caps its length with
    /// `ParserLimits::max_bulk_len`.
    /// Format: `$<length>\r\n<data>\r\n`
    /// A null bulk string is represented by [`RespValue::Null`].
    BulkString(Bytes),

    /// Null bulk string, distinct from an empty bulk string.
    /// Format: `$-1\r\n`
    Null,

    /// Null array, distinct from an empty array.
    /// Format: `*-1\r\n`
    NullArray,

    /// Arrays can contain any RESP type, including nested arrays.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new simple string response.
    ///
    /// # Example
    /// ```
    /// use flashresp::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error response.
    ///
    /// # Example
    /// ```
    /// use flashresp::protocol::types::RespValue;
    /// let err = RespValue::error("ERR unknown command");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Creates a new integer response.
    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string response.
    ///
    /// # Example
    /// ```
    /// use flashresp::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// let bulk = RespValue::bulk_string(Bytes::from("hello"));
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Creates a null bulk string response.
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Creates a null array response.
    pub fn null_array() -> Self {
        RespValue::NullArray
    }

    /// Creates an array response.
    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Common response for PONG
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Serializes the value into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Appends the wire form to `buf`, so callers can reuse one buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                extend_single_line(buf, s);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(prefix::ERROR);
                extend_single_line(buf, s);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::NullArray => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Returns true if this value is a null bulk string or a null array.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null | RespValue::NullArray)
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Attempts to extract the inner string from SimpleString or BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner bytes from BulkString.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

/// Writes a simple string or error payload, replacing CR and LF with spaces
/// so the value stays on a single line.
fn extend_single_line(buf: &mut Vec<u8>, s: &str) {
    buf.extend(
        s.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            RespValue::Null | RespValue::NullArray => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
