//! # respd - An In-Memory Key-Value Server Speaking RESP
//!
//! respd accepts Redis-compatible clients over TCP, decodes their commands
//! with a streaming, binary-safe parser and hands them to a pluggable
//! storage engine. The interesting parts are the parser and the connection
//! lifecycle: one parser task and one handler task per connection, joined
//! by a single-slot channel, and a server that shuts down gracefully.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               respd                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ RespHandler │───>│  Database   │                  │
//! │  │ (Listener)  │    │ (per conn)  │    │  (shared)   │                  │
//! │  └──────┬──────┘    └──────▲──────┘    └─────────────┘                  │
//! │         │                  │ 1-slot channel                             │
//! │         │           ┌──────┴──────┐                                     │
//! │         │           │ RESP Parser │ <── socket read half                │
//! │         │           └─────────────┘                                     │
//! │         ▼                                                               │
//! │  ┌────────────────────────────────────┐                                 │
//! │  │ Signal task -> Shutdown supervisor │ -> stop accept, close, drain    │
//! │  └────────────────────────────────────┘                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use respd::connection::RespHandler;
//! use respd::database::EchoDatabase;
//! use respd::server::{listen_and_serve_with_signal, Config};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handler = Arc::new(RespHandler::new(Arc::new(EchoDatabase::new())));
//!     let config = Config { address: "127.0.0.1:6379".to_string() };
//!     listen_and_serve_with_signal(&config, handler).await
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: reply types and the streaming RESP parser
//! - [`connection`]: the connection wrapper and request handlers
//! - [`database`]: the storage engine interface
//! - [`server`]: accept loop, signal capture and graceful shutdown
//! - [`config`]: CLI and `redis.conf` loading
//! - [`logging`]: subscriber setup and level switching
//!
//! ## Error Handling
//!
//! Transport failures end a connection. Malformed input gets a protocol
//! error reply and the session continues. A panic inside a parser task is
//! logged and ends only that connection.

pub mod config;
pub mod connection;
pub mod database;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod sync;

// Re-export commonly used types for convenience
pub use connection::{Connection, EchoHandler, RespHandler};
pub use database::{Database, EchoDatabase};
pub use protocol::{parse_stream, ParseError, Payload, Reply};
pub use server::{listen_and_serve, listen_and_serve_with_signal, Handler};

/// The default port respd listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host respd binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of respd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
