//! RESP Protocol Implementation
//!
//! This module provides the wire side of the server: the closed set of
//! [`Reply`] values with their canonical encodings, and a streaming parser
//! that turns a socket into an ordered sequence of [`Payload`]s.
//!
//! ## Modules
//!
//! - `types`: Defines the `Reply` enum and serialization
//! - `parser`: Incremental, binary-safe stream parser
//!
//! ## Example
//!
//! ```ignore
//! use respd::protocol::{parse_stream, Payload, Reply};
//!
//! let mut payloads = parse_stream(read_half);
//! while let Some(payload) = payloads.recv().await {
//!     if let Payload::Reply(Reply::MultiBulk(args)) = payload {
//!         // dispatch args...
//!     }
//! }
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_stream, ParseError, ParseResult, Payload, MAX_BULK_SIZE};
pub use types::Reply;
