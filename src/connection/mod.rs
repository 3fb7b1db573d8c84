//! Connection Module
//!
//! This module owns everything that happens to a socket after `accept`.
//! Each connection runs two tasks for its lifetime: a parser task that
//! reads the socket, and the handler task that consumes what it decodes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Server (accept loop)                    │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ spawn per connection
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RespHandler                           │
//! │                                                             │
//! │  ┌─────────────┐  1 slot  ┌─────────────┐    ┌───────────┐  │
//! │  │ Parser task │─────────>│ Handle loop │───>│ Database  │  │
//! │  └─────────────┘          └──────┬──────┘    └───────────┘  │
//! │                                  │                          │
//! │                                  ▼                          │
//! │                           Connection::write                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `client`: the [`Connection`] wrapper with its serialized write path
//! - `handler`: [`RespHandler`], the RESP request pipeline
//! - `echo`: [`EchoHandler`], a plain line echo server

pub mod client;
pub mod echo;
pub mod handler;

// Re-export commonly used types
pub use client::{Connection, ConnectionError, CLOSE_TIMEOUT};
pub use echo::EchoHandler;
pub use handler::RespHandler;
