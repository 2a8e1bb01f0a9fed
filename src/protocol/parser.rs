//! Streaming RESP Protocol Parser
//!
//! This module implements an incremental parser that reads RESP units
//! directly off an async byte stream (a socket, a pipe, or an in-memory
//! buffer in tests) and yields one [`Payload`] per complete unit.
//!
//! ## Design Philosophy
//!
//! 1. **Pull-based**: Nothing is read until the caller asks for the next
//!    payload, so backpressure is simply "don't ask yet".
//! 2. **Line-oriented**: Headers are read up to `\r\n`; bulk payloads are read
//!    as exactly `len + 2` bytes, so they may contain any byte at all.
//! 3. **Bounded**: Declared lengths, array sizes, nesting depth and line
//!    lengths are all checked against [`ParserLimits`] before allocating.
//! 4. **Recoverable**: A malformed frame produces one error payload and resets
//!    the [`ParseState`]; the stream keeps going. The body of a rejected bulk
//!    string is skipped, never parsed as requests.
//!
//! ## How the Parser Works
//!
//! ```text
//!              ┌──────────────┐
//!   bytes ───> │  read line   │──── bulk pending? ──> read len + 2 bytes
//!              └──────┬───────┘                              │
//!                     │ classify by prefix                   │
//!                     ▼                                      ▼
//!   + - : $-1 *-1 *0  ──────────────> value ───> frame stack ──> Payload
//!   $n                ──> pending bulk            (arrays)
//!   *n                ──> push frame
//! ```
//!
//! Arrays are assembled on an explicit stack of frames instead of by
//! recursion, so a deeply nested request cannot blow the native stack.
//!
//! ## Termination
//!
//! End of stream (clean or in the middle of a frame) and I/O failures are
//! terminal: the parser yields a final error payload and then `None` forever.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use futures::stream::{self, Stream};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::trace;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The stream ended cleanly between two frames
    #[error("connection closed")]
    Eof,

    /// The stream ended in the middle of a frame
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// The underlying reader failed
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// Unknown type prefix byte inside a multi-bulk
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// An empty line where a RESP unit was expected
    #[error("unexpected empty line")]
    EmptyLine,

    /// Invalid integer format
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// A line or bulk payload was not terminated by CRLF
    #[error("missing CRLF terminator")]
    MissingCrlf,

    /// A text line grew past the inline limit without a terminator
    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },

    /// A declared bulk length or array count exceeds the configured ceiling
    #[error("message too large: {size} (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Arrays nested deeper than the configured maximum
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),
}

impl ParseError {
    /// Returns true if the stream cannot produce any more payloads.
    ///
    /// Everything else is a protocol violation confined to one frame.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParseError::Eof | ParseError::UnexpectedEof | ParseError::Io(_)
        )
    }
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ParseError::UnexpectedEof
        } else {
            ParseError::Io(err)
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// One parser output unit: a decoded value or the reason a frame failed.
pub type Payload = ParseResult<RespValue>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in a single array
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of a header or inline line (64 KB, same as Redis)
pub const MAX_INLINE_LEN: usize = 64 * 1024;

/// Upper bound on capacity reserved up front for an array, whatever its
/// declared count.
const ARRAY_PREALLOC_LIMIT: usize = 1024;

/// Upper bound on capacity reserved up front for a bulk body; the buffer
/// grows only as bytes actually arrive.
const BULK_PREALLOC_LIMIT: usize = 64 * 1024;

/// Size limits enforced before any allocation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Largest accepted bulk string, in bytes
    pub max_bulk_len: usize,
    /// Largest accepted array element count
    pub max_array_len: usize,
    /// Deepest accepted array nesting
    pub max_depth: usize,
    /// Longest accepted text line, excluding CRLF
    pub max_inline_len: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_bulk_len: MAX_BULK_SIZE,
            max_array_len: MAX_ARRAY_LEN,
            max_depth: MAX_NESTING_DEPTH,
            max_inline_len: MAX_INLINE_LEN,
        }
    }
}

/// A partially read array.
#[derive(Debug)]
struct ArrayFrame {
    expected: usize,
    items: Vec<RespValue>,
}

/// Per-connection parser state.
///
/// Holds the pending bulk length and the stack of arrays currently being
/// filled. A fresh (default) state means "between frames".
///
/// When a bulk header is rejected for exceeding the ceiling, the body the
/// peer is still sending is skipped unread, so none of it is ever mistaken
/// for a request of its own.
#[derive(Debug, Default)]
pub struct ParseState {
    bulk_len: Option<usize>,
    frames: Vec<ArrayFrame>,
    discard: u64,
}

impl ParseState {
    /// Returns true while at least one array is being filled.
    pub fn is_reading_multi_bulk(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Number of elements the innermost open array still expects.
    pub fn expected_remaining(&self) -> usize {
        self.frames
            .last()
            .map_or(0, |frame| frame.expected - frame.items.len())
    }

    /// The declared length of the bulk string about to be read, if any.
    pub fn pending_bulk_len(&self) -> Option<usize> {
        self.bulk_len
    }

    /// Current array nesting depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bytes of a rejected bulk body still to be skipped.
    pub fn pending_discard(&self) -> u64 {
        self.discard
    }

    /// Returns true if no frame is in progress.
    pub fn is_idle(&self) -> bool {
        self.bulk_len.is_none() && self.frames.is_empty() && self.discard == 0
    }

    /// Drops any partial frame. A pending discard survives: those bytes
    /// are still on the wire.
    pub fn reset(&mut self) {
        self.bulk_len = None;
        self.frames.clear();
    }

    fn open_array(&mut self, expected: usize) {
        self.frames.push(ArrayFrame {
            expected,
            items: Vec::with_capacity(expected.min(ARRAY_PREALLOC_LIMIT)),
        });
    }

    /// Feeds a finished value into the innermost open array.
    ///
    /// Returns the top-level value once it is complete.
    fn complete(&mut self, mut value: RespValue) -> Option<RespValue> {
        loop {
            let frame = match self.frames.last_mut() {
                Some(frame) => frame,
                None => return Some(value),
            };

            frame.items.push(value);
            if frame.items.len() < frame.expected {
                return None;
            }

            let items = self.frames.pop().map(|f| f.items).unwrap_or_default();
            value = RespValue::Array(items);
        }
    }
}

/// An incremental RESP parser bound to one byte stream.
///
/// # Example
///
/// ```ignore
/// use flashresp::protocol::RespParser;
///
/// let mut parser = RespParser::new(socket);
/// while let Some(payload) = parser.next_payload().await {
///     match payload {
///         Ok(request) => println!("Parsed: {:?}", request),
///         Err(e) if e.is_terminal() => break,
///         Err(e) => println!("Bad frame: {}", e),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct RespParser<R> {
    reader: BufReader<R>,
    state: ParseState,
    limits: ParserLimits,
    line: Vec<u8>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> RespParser<R> {
    /// Creates a parser with the default limits.
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, ParserLimits::default())
    }

    /// Creates a parser with custom limits.
    pub fn with_limits(reader: R, limits: ParserLimits) -> Self {
        Self {
            reader: BufReader::new(reader),
            state: ParseState::default(),
            limits,
            line: Vec::new(),
            finished: false,
        }
    }

    /// The current parse state.
    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Returns true once a terminal payload has been yielded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reads until the next payload is available.
    ///
    /// Returns `None` after the terminal payload. Not cancellation safe: if
    /// the future is dropped mid-frame, the partial frame is lost.
    pub async fn next_payload(&mut self) -> Option<Payload> {
        if self.finished {
            return None;
        }

        loop {
            match self.step().await {
                Ok(Some(value)) => return Some(Ok(value)),
                Ok(None) => continue,
                Err(e) => {
                    if e.is_terminal() {
                        self.finished = true;
                    } else {
                        trace!(error = %e, depth = self.state.depth(), "Resetting parse state");
                        self.state.reset();
                    }
                    return Some(Err(e));
                }
            }
        }
    }

    /// Turns the parser into a [`Stream`] of payloads.
    pub fn into_stream(self) -> impl Stream<Item = Payload> {
        stream::unfold(self, |mut parser| async move {
            let payload = parser.next_payload().await?;
            Some((payload, parser))
        })
    }

    /// Reads one line or bulk body and folds it into the state.
    async fn step(&mut self) -> ParseResult<Option<RespValue>> {
        if self.state.discard > 0 {
            self.skip_rejected_bulk().await?;
        }

        let value = match self.state.bulk_len {
            Some(len) => {
                let data = self.read_bulk(len).await?;
                self.state.bulk_len = None;
                Some(RespValue::BulkString(data))
            }
            None => {
                self.read_line().await?;
                let line = &self.line[..self.line.len() - CRLF.len()];
                parse_line(line, &mut self.state, &self.limits)?
            }
        };

        Ok(value.and_then(|v| self.state.complete(v)))
    }

    /// Reads a CRLF-terminated line into `self.line`, terminator included.
    async fn read_line(&mut self) -> ParseResult<()> {
        self.line.clear();
        let limit = (self.limits.max_inline_len + CRLF.len()) as u64;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.line)
            .await?;

        if n == 0 {
            return Err(if self.state.is_idle() {
                ParseError::Eof
            } else {
                ParseError::UnexpectedEof
            });
        }

        if self.line.last() != Some(&b'\n') {
            if n as u64 == limit {
                self.discard_line().await?;
                return Err(ParseError::LineTooLong {
                    max: self.limits.max_inline_len,
                });
            }
            return Err(ParseError::UnexpectedEof);
        }

        if !self.line.ends_with(CRLF) {
            return Err(ParseError::MissingCrlf);
        }

        Ok(())
    }

    /// Skips input up to and including the next `\n`.
    async fn discard_line(&mut self) -> io::Result<()> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.reader.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = buf.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    /// Consumes the body of a bulk string whose header was rejected.
    async fn skip_rejected_bulk(&mut self) -> ParseResult<()> {
        let remaining = self.state.discard;
        let mut body = (&mut self.reader).take(remaining);
        let skipped = tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
        self.state.discard = 0;
        trace!(skipped, "Skipped rejected bulk body");

        if skipped < remaining {
            return Err(ParseError::UnexpectedEof);
        }
        Ok(())
    }

    /// Reads a bulk body of exactly `len` bytes plus its CRLF.
    ///
    /// Memory is committed as the body arrives, not when the header does.
    async fn read_bulk(&mut self, len: usize) -> ParseResult<Bytes> {
        let total = len + CRLF.len();
        let mut buf = Vec::with_capacity(total.min(BULK_PREALLOC_LIMIT));
        let n = (&mut self.reader)
            .take(total as u64)
            .read_to_end(&mut buf)
            .await?;

        if n < total {
            return Err(ParseError::UnexpectedEof);
        }

        if !buf.ends_with(CRLF) {
            return Err(ParseError::MissingCrlf);
        }

        buf.truncate(len);
        Ok(Bytes::from(buf))
    }
}

/// Creates a payload stream over `reader` with the default limits.
pub fn parse_stream<R>(reader: R) -> impl Stream<Item = Payload>
where
    R: AsyncRead + Unpin,
{
    RespParser::new(reader).into_stream()
}

/// Classifies one text line (without CRLF).
///
/// Returns `Some` for a finished leaf value and `None` when the line only
/// opened a bulk string or an array, or was a blank inline line.
fn parse_line(
    line: &[u8],
    state: &mut ParseState,
    limits: &ParserLimits,
) -> ParseResult<Option<RespValue>> {
    let (&first, rest) = match line.split_first() {
        Some(split) => split,
        None if state.is_reading_multi_bulk() => return Err(ParseError::EmptyLine),
        None => return Ok(None),
    };

    match first {
        prefix::SIMPLE_STRING => Ok(Some(RespValue::SimpleString(lossy(rest)))),
        prefix::ERROR => Ok(Some(RespValue::Error(lossy(rest)))),
        prefix::INTEGER => Ok(Some(RespValue::Integer(parse_integer(rest)?))),
        prefix::BULK_STRING => match parse_integer(rest)? {
            -1 => Ok(Some(RespValue::Null)),
            len if len < 0 => Err(ParseError::InvalidBulkLength(len)),
            len => match checked_len(len, limits.max_bulk_len) {
                Ok(len) => {
                    state.bulk_len = Some(len);
                    Ok(None)
                }
                Err(e) => {
                    state.discard = (len as u64).saturating_add(CRLF.len() as u64);
                    Err(e)
                }
            },
        },
        prefix::ARRAY => match parse_integer(rest)? {
            -1 => Ok(Some(RespValue::NullArray)),
            0 => Ok(Some(RespValue::Array(Vec::new()))),
            count if count < 0 => Err(ParseError::InvalidArrayLength(count)),
            count => {
                let count = checked_len(count, limits.max_array_len)?;
                if state.depth() >= limits.max_depth {
                    return Err(ParseError::NestingTooDeep(limits.max_depth));
                }
                state.open_array(count);
                Ok(None)
            }
        },
        _ if state.is_reading_multi_bulk() => Err(ParseError::UnknownPrefix(first)),
        _ => Ok(parse_inline(line)),
    }
}

/// Splits an inline command (`SET key value\r\n`) into bulk string arguments.
fn parse_inline(line: &[u8]) -> Option<RespValue> {
    let args: Vec<RespValue> = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| RespValue::BulkString(Bytes::copy_from_slice(part)))
        .collect();

    if args.is_empty() {
        None
    } else {
        Some(RespValue::Array(args))
    }
}

/// Simple strings and errors are plain text; invalid UTF-8 becomes U+FFFD.
fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_integer(bytes: &[u8]) -> ParseResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(bytes).into_owned()))
}

fn checked_len(declared: i64, max: usize) -> ParseResult<usize> {
    match usize::try_from(declared) {
        Ok(size) if size <= max => Ok(size),
        Ok(size) => Err(ParseError::MessageTooLarge { size, max }),
        Err(_) => Err(ParseError::MessageTooLarge {
            size: usize::MAX,
            max,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use proptest::prelude::*;

    async fn parse_all(input: &[u8]) -> Vec<Payload> {
        parse_all_with(input, ParserLimits::default()).await
    }

    async fn parse_all_with(input: &[u8], limits: ParserLimits) -> Vec<Payload> {
        let mut parser = RespParser::with_limits(input, limits);
        let mut out = Vec::new();
        while let Some(payload) = parser.next_payload().await {
            out.push(payload);
        }
        out
    }

    fn bulk(s: &'static [u8]) -> RespValue {
        RespValue::BulkString(Bytes::from_static(s))
    }

    #[tokio::test]
    async fn test_parse_simple_types() {
        let out = parse_all(b"+OK\r\n-ERR unknown command\r\n:1000\r\n:-42\r\n").await;
        assert_eq!(out.len(), 5);
        assert_eq!(out[0].as_ref().unwrap(), &RespValue::simple_string("OK"));
        assert_eq!(
            out[1].as_ref().unwrap(),
            &RespValue::error("ERR unknown command")
        );
        assert_eq!(out[2].as_ref().unwrap(), &RespValue::Integer(1000));
        assert_eq!(out[3].as_ref().unwrap(), &RespValue::Integer(-42));
        assert!(matches!(out[4], Err(ParseError::Eof)));
    }

    #[tokio::test]
    async fn test_parse_bulk_string() {
        let out = parse_all(b"$5\r\nhello\r\n").await;
        assert_eq!(out[0].as_ref().unwrap(), &bulk(b"hello"));
    }

    #[tokio::test]
    async fn test_null_bulk_differs_from_empty() {
        let out = parse_all(b"$-1\r\n$0\r\n\r\n").await;
        assert_eq!(out[0].as_ref().unwrap(), &RespValue::Null);
        assert_eq!(out[1].as_ref().unwrap(), &bulk(b""));
    }

    #[tokio::test]
    async fn test_null_array_differs_from_empty() {
        let out = parse_all(b"*-1\r\n*0\r\n").await;
        assert_eq!(out[0].as_ref().unwrap(), &RespValue::NullArray);
        assert_eq!(out[1].as_ref().unwrap(), &RespValue::Array(vec![]));
    }

    #[tokio::test]
    async fn test_binary_safe_bulk_string() {
        let out = parse_all(b"$5\r\na\r\n\x00b\r\n").await;
        assert_eq!(out[0].as_ref().unwrap(), &bulk(b"a\r\n\x00b"));
    }

    #[tokio::test]
    async fn test_parse_command_array() {
        let out = parse_all(b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$4\r\nAriz\r\n").await;
        assert_eq!(
            out[0].as_ref().unwrap(),
            &RespValue::Array(vec![bulk(b"SET"), bulk(b"user:101"), bulk(b"Ariz")])
        );
    }

    #[tokio::test]
    async fn test_parse_nested_array() {
        let out = parse_all(b"*1\r\n*1\r\n:5\r\n").await;
        assert_eq!(
            out[0].as_ref().unwrap(),
            &RespValue::Array(vec![RespValue::Array(vec![RespValue::Integer(5)])])
        );
    }

    #[tokio::test]
    async fn test_parse_array_with_nulls_and_empties() {
        let out = parse_all(b"*4\r\n$-1\r\n*0\r\n*-1\r\n+OK\r\n").await;
        assert_eq!(
            out[0].as_ref().unwrap(),
            &RespValue::Array(vec![
                RespValue::Null,
                RespValue::Array(vec![]),
                RespValue::NullArray,
                RespValue::simple_string("OK"),
            ])
        );
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let out = parse_all(b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n").await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap(), &RespValue::Array(vec![bulk(b"PING")]));
        assert_eq!(
            out[1].as_ref().unwrap(),
            &RespValue::Array(vec![bulk(b"ECHO"), bulk(b"hi")])
        );
        assert!(matches!(out[2], Err(ParseError::Eof)));
    }

    #[tokio::test]
    async fn test_malformed_frame_recovery() {
        let out = parse_all(b"*2\r\nbad\r\n+OK\r\n").await;
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0], Err(ParseError::UnknownPrefix(b'b'))));
        assert_eq!(out[1].as_ref().unwrap(), &RespValue::simple_string("OK"));
        assert!(matches!(out[2], Err(ParseError::Eof)));
    }

    #[tokio::test]
    async fn test_non_numeric_count_recovery() {
        let out = parse_all(b"*two\r\n$x\r\n:1\r\n").await;
        assert!(matches!(out[0], Err(ParseError::InvalidInteger(ref s)) if s == "two"));
        assert!(matches!(out[1], Err(ParseError::InvalidInteger(_))));
        assert_eq!(out[2].as_ref().unwrap(), &RespValue::Integer(1));
    }

    #[tokio::test]
    async fn test_missing_carriage_return() {
        let out = parse_all(b"+OK\n+PONG\r\n").await;
        assert!(matches!(out[0], Err(ParseError::MissingCrlf)));
        assert_eq!(out[1].as_ref().unwrap(), &RespValue::pong());
    }

    #[tokio::test]
    async fn test_bad_bulk_terminator() {
        let out = parse_all(b"$3\r\nfooXX+OK\r\n").await;
        assert!(matches!(out[0], Err(ParseError::MissingCrlf)));
        assert_eq!(out[1].as_ref().unwrap(), &RespValue::ok());
    }

    #[tokio::test]
    async fn test_negative_lengths() {
        let out = parse_all(b"$-2\r\n*-5\r\n").await;
        assert!(matches!(out[0], Err(ParseError::InvalidBulkLength(-2))));
        assert!(matches!(out[1], Err(ParseError::InvalidArrayLength(-5))));
    }

    #[tokio::test]
    async fn test_bulk_length_ceiling() {
        let limits = ParserLimits {
            max_bulk_len: 4,
            ..ParserLimits::default()
        };
        let out = parse_all_with(b"$5\r\n", limits).await;
        assert!(matches!(
            out[0],
            Err(ParseError::MessageTooLarge { size: 5, max: 4 })
        ));
        // The announced body never arrived.
        assert!(matches!(out[1], Err(ParseError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_oversized_bulk_body_is_never_executed() {
        let limits = ParserLimits {
            max_bulk_len: 4,
            ..ParserLimits::default()
        };
        let out = parse_all_with(b"$8\r\nFLUSHALL\r\n+OK\r\n", limits).await;
        assert_eq!(out.len(), 3);
        assert!(matches!(
            out[0],
            Err(ParseError::MessageTooLarge { size: 8, max: 4 })
        ));
        assert_eq!(out[1].as_ref().unwrap(), &RespValue::ok());
        assert!(matches!(out[2], Err(ParseError::Eof)));
    }

    #[tokio::test]
    async fn test_oversized_bulk_body_skipped_across_reads() {
        let limits = ParserLimits {
            max_bulk_len: 4,
            ..ParserLimits::default()
        };
        let reader = tokio_test::io::Builder::new()
            .read(b"*2\r\n$3\r\nSET\r\n$10\r\nQUIT\r\n")
            .read(b"QUIT\r\n")
            .read(b"PING\r\n")
            .build();
        let mut parser = RespParser::with_limits(reader, limits);

        assert!(matches!(
            parser.next_payload().await,
            Some(Err(ParseError::MessageTooLarge { size: 10, max: 4 }))
        ));
        assert_eq!(parser.state().pending_discard(), 12);
        assert!(!parser.state().is_idle());

        let value = parser.next_payload().await.unwrap().unwrap();
        assert_eq!(value, RespValue::Array(vec![bulk(b"PING")]));
        assert!(parser.state().is_idle());
    }

    #[tokio::test]
    async fn test_huge_bulk_header_with_short_body() {
        let out = parse_all(b"$536870912\r\nabc").await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(ParseError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_large_bulk_arrives_in_pieces() {
        let body = vec![b'x'; 200 * 1024];
        let mut builder = tokio_test::io::Builder::new();
        builder.read(b"$204800\r\n");
        for chunk in body.chunks(50 * 1024) {
            builder.read(chunk);
        }
        builder.read(b"\r\n");
        let mut parser = RespParser::new(builder.build());

        let value = parser.next_payload().await.unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from(body)));
    }

    #[tokio::test]
    async fn test_non_utf8_simple_string_is_kept() {
        let out = parse_all(b"+caf\xe9\r\n-ERR \xff\r\n").await;
        assert_eq!(
            out[0].as_ref().unwrap(),
            &RespValue::SimpleString("caf\u{fffd}".to_string())
        );
        assert_eq!(
            out[1].as_ref().unwrap(),
            &RespValue::Error("ERR \u{fffd}".to_string())
        );
    }

    #[tokio::test]
    async fn test_array_length_ceiling() {
        let limits = ParserLimits {
            max_array_len: 2,
            ..ParserLimits::default()
        };
        let out = parse_all_with(b"*3\r\n*2\r\n:1\r\n:2\r\n", limits).await;
        assert!(matches!(
            out[0],
            Err(ParseError::MessageTooLarge { size: 3, max: 2 })
        ));
        assert_eq!(
            out[1].as_ref().unwrap(),
            &RespValue::Array(vec![RespValue::Integer(1), RespValue::Integer(2)])
        );
    }

    #[tokio::test]
    async fn test_nesting_depth_ceiling() {
        let limits = ParserLimits {
            max_depth: 2,
            ..ParserLimits::default()
        };
        let out = parse_all_with(b"*1\r\n*1\r\n*1\r\n:1\r\n", limits).await;
        assert!(matches!(out[0], Err(ParseError::NestingTooDeep(2))));
        // The reset state picks up again at the next unit.
        assert_eq!(out[1].as_ref().unwrap(), &RespValue::Integer(1));
    }

    #[tokio::test]
    async fn test_line_too_long_is_skipped() {
        let limits = ParserLimits {
            max_inline_len: 8,
            ..ParserLimits::default()
        };
        let out = parse_all_with(b"+AAAAAAAAAAAAAAAAAAAA\r\n+OK\r\n", limits).await;
        assert!(matches!(out[0], Err(ParseError::LineTooLong { max: 8 })));
        assert_eq!(out[1].as_ref().unwrap(), &RespValue::ok());
    }

    #[tokio::test]
    async fn test_inline_command() {
        let out = parse_all(b"SET key  value\r\n\r\nPING\r\n").await;
        assert_eq!(
            out[0].as_ref().unwrap(),
            &RespValue::Array(vec![bulk(b"SET"), bulk(b"key"), bulk(b"value")])
        );
        assert_eq!(out[1].as_ref().unwrap(), &RespValue::Array(vec![bulk(b"PING")]));
    }

    #[tokio::test]
    async fn test_empty_line_inside_array() {
        let out = parse_all(b"*1\r\n\r\n:3\r\n").await;
        assert!(matches!(out[0], Err(ParseError::EmptyLine)));
        assert_eq!(out[1].as_ref().unwrap(), &RespValue::Integer(3));
    }

    #[tokio::test]
    async fn test_clean_eof() {
        let out = parse_all(b"").await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(ParseError::Eof)));
    }

    #[tokio::test]
    async fn test_abrupt_eof() {
        for input in [&b"$5\r\nhel"[..], &b"*2\r\n:1\r\n"[..], &b"+OK"[..]] {
            let out = parse_all(input).await;
            assert_eq!(out.len(), 1, "input {:?}", input);
            assert!(matches!(out[0], Err(ParseError::UnexpectedEof)));
        }
    }

    #[tokio::test]
    async fn test_fragmented_reads() {
        let reader = tokio_test::io::Builder::new()
            .read(b"*2\r\n$3\r\nfo")
            .read(b"o\r\n:4")
            .read(b"2\r\n")
            .build();
        let mut parser = RespParser::new(reader);

        let value = parser.next_payload().await.unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![bulk(b"foo"), RespValue::Integer(42)])
        );
        assert!(parser.state().is_idle());
        assert!(matches!(parser.next_payload().await, Some(Err(ParseError::Eof))));
    }

    #[tokio::test]
    async fn test_io_error_is_terminal() {
        let reader = tokio_test::io::Builder::new()
            .read(b"+OK\r\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut parser = RespParser::new(reader);

        assert!(matches!(parser.next_payload().await, Some(Ok(_))));
        assert!(matches!(parser.next_payload().await, Some(Err(ParseError::Io(_)))));
        assert!(parser.is_finished());
        assert!(parser.next_payload().await.is_none());
    }

    #[tokio::test]
    async fn test_state_tracks_multi_bulk() {
        let reader = tokio_test::io::Builder::new()
            .read(b"*3\r\n:1\r\n")
            .read(b"$2\r\n")
            .build();
        let mut parser = RespParser::new(reader);

        assert!(matches!(
            parser.next_payload().await,
            Some(Err(ParseError::UnexpectedEof))
        ));
        assert!(parser.state().is_reading_multi_bulk());
        assert_eq!(parser.state().expected_remaining(), 2);
        assert_eq!(parser.state().pending_bulk_len(), Some(2));
    }

    #[tokio::test]
    async fn test_stream_adapter() {
        let payloads: Vec<Payload> = parse_stream(&b":1\r\n:2\r\n"[..]).collect().await;
        assert_eq!(payloads.len(), 3);
        assert!(payloads[2].as_ref().is_err_and(|e| e.is_terminal()));
    }

    fn arb_value() -> impl Strategy<Value = RespValue> {
        let leaf = prop_oneof![
            "[^\r\n]{0,16}".prop_map(RespValue::SimpleString),
            "[^\r\n]{0,16}".prop_map(RespValue::Error),
            any::<i64>().prop_map(RespValue::Integer),
            proptest::collection::vec(any::<u8>(), 0..64)
                .prop_map(|b| RespValue::BulkString(Bytes::from(b))),
            Just(RespValue::Null),
            Just(RespValue::NullArray),
        ];
        leaf.prop_recursive(4, 64, 6, |inner| {
            proptest::collection::vec(inner, 0..6).prop_map(RespValue::Array)
        })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(value in arb_value()) {
            let wire = value.serialize();
            let parsed = tokio_test::block_on(async {
                RespParser::new(&wire[..]).next_payload().await
            });
            prop_assert_eq!(parsed.unwrap().unwrap(), value);
        }

        #[test]
        fn prop_bulk_payload_is_binary_safe(data in proptest::collection::vec(
            prop_oneof![Just(b'\r'), Just(b'\n'), Just(0u8), any::<u8>()],
            0..256,
        )) {
            let mut wire = format!("${}\r\n", data.len()).into_bytes();
            wire.extend_from_slice(&data);
            wire.extend_from_slice(b"\r\n");

            let parsed = tokio_test::block_on(async {
                RespParser::new(&wire[..]).next_payload().await
            });
            prop_assert_eq!(parsed.unwrap().unwrap(), RespValue::BulkString(Bytes::from(data)));
        }
    }
}
