//! RESP (Redis Serialization Protocol) Reply Types
//!
//! This module defines the closed set of replies the server reads and writes.
//! Every variant has exactly one canonical wire encoding.
//!
//! ## Protocol Format
//!
//! Each message starts with a type prefix byte:
//! - `+` Status
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk (or Null Bulk when the length is `-1`)
//! - `*` Multi-Bulk (or Empty Multi-Bulk when the count is `0`)
//!
//! All lines are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Status: `+OK\r\n`
//! Error: `-ERR unknown\r\n`
//! Integer: `:1000\r\n`
//! Bulk: `$5\r\nhello\r\n`
//! Null Bulk: `$-1\r\n`
//! Multi-Bulk: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Empty Multi-Bulk: `*0\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const MULTI_BULK: u8 = b'*';
}

/// A reply (or, for [`Reply::MultiBulk`], a client command).
///
/// Multi-Bulk is the only variant a client may legitimately send as a
/// request; the others are produced by the parser but rejected by the
/// request handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Single-line status text.
    /// Format: `+<text>\r\n`
    Status(String),

    /// Single-line error text.
    /// Format: `-<text>\r\n`
    Error(String),

    /// Signed 64-bit integer.
    /// Format: `:<decimal>\r\n`
    Integer(i64),

    /// Binary-safe, length-prefixed byte string.
    /// Format: `$<len>\r\n<bytes>\r\n`
    Bulk(Bytes),

    /// Absent bulk value.
    /// Format: `$-1\r\n`
    NullBulk,

    /// Ordered list of bulk arguments.
    /// Format: `*<count>\r\n` followed by `count` bulk strings
    MultiBulk(Vec<Bytes>),

    /// Zero-element multi-bulk.
    /// Format: `*0\r\n`
    EmptyMultiBulk,
}

impl Reply {
    /// Creates a status reply.
    ///
    /// # Example
    /// ```
    /// use respd::protocol::Reply;
    /// assert_eq!(Reply::status("OK").serialize(), b"+OK\r\n");
    /// ```
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply.
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a bulk reply.
    ///
    /// # Example
    /// ```
    /// use respd::protocol::Reply;
    /// use bytes::Bytes;
    /// let bulk = Reply::bulk(Bytes::from("hello"));
    /// assert_eq!(bulk.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Creates a multi-bulk reply from its arguments.
    pub fn multi_bulk(args: Vec<Bytes>) -> Self {
        Reply::MultiBulk(args)
    }

    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    /// Sent when the database produced no reply for a command.
    pub fn unknown_error() -> Self {
        Reply::Error("ERR unknown".to_string())
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                buf.push(prefix::STATUS);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(data) => write_bulk(buf, data),
            Reply::NullBulk => {
                buf.push(prefix::BULK);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::MultiBulk(args) => {
                buf.push(prefix::MULTI_BULK);
                buf.extend_from_slice(args.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for arg in args {
                    write_bulk(buf, arg);
                }
            }
            Reply::EmptyMultiBulk => {
                buf.push(prefix::MULTI_BULK);
                buf.push(b'0');
                buf.extend_from_slice(CRLF);
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Returns the command arguments if this is a multi-bulk.
    pub fn as_args(&self) -> Option<&[Bytes]> {
        match self {
            Reply::MultiBulk(args) => Some(args),
            _ => None,
        }
    }
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(prefix::BULK);
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(data);
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => fmt_bulk(f, data),
            Reply::NullBulk => write!(f, "(nil)"),
            Reply::MultiBulk(args) => {
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) ", i + 1)?;
                    fmt_bulk(f, arg)?;
                }
                Ok(())
            }
            Reply::EmptyMultiBulk => write!(f, "(empty array)"),
        }
    }
}

fn fmt_bulk(f: &mut fmt::Formatter<'_>, data: &[u8]) -> fmt::Result {
    match std::str::from_utf8(data) {
        Ok(s) => write!(f, "\"{}\"", s),
        Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialize() {
        assert_eq!(Reply::status("OK").serialize(), b"+OK\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = Reply::error("ERR unknown command");
        assert_eq!(value.serialize(), b"-ERR unknown command\r\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(Reply::integer(1000).serialize(), b":1000\r\n");
        assert_eq!(Reply::integer(-42).serialize(), b":-42\r\n");
    }

    #[test]
    fn test_bulk_serialize() {
        let value = Reply::bulk(Bytes::from("hello"));
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_empty_bulk_serialize() {
        assert_eq!(Reply::bulk(Bytes::new()).serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_null_bulk_serialize() {
        assert_eq!(Reply::NullBulk.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_multi_bulk_serialize() {
        let value = Reply::multi_bulk(vec![Bytes::from("GET"), Bytes::from("name")]);
        assert_eq!(value.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    }

    #[test]
    fn test_empty_multi_bulk_serialize() {
        assert_eq!(Reply::EmptyMultiBulk.serialize(), b"*0\r\n");
        assert_eq!(Reply::multi_bulk(vec![]).serialize(), b"*0\r\n");
    }

    #[test]
    fn test_constant_replies() {
        assert_eq!(Reply::ok().serialize(), b"+OK\r\n");
        assert_eq!(Reply::pong().serialize(), b"+PONG\r\n");
        assert_eq!(Reply::unknown_error().serialize(), b"-ERR unknown\r\n");
    }

    #[test]
    fn test_display() {
        let value = Reply::multi_bulk(vec![Bytes::from("a"), Bytes::from_static(&[0xff])]);
        assert_eq!(value.to_string(), "1) \"a\"\n2) (binary data, 1 bytes)");
        assert_eq!(Reply::NullBulk.to_string(), "(nil)");
    }
}
