//! Storage Engine Interface
//!
//! The request handler never interprets commands itself; it hands every
//! complete command to a [`Database`]. The engine is shared by all
//! connections and must make concurrent calls to `exec` safe on its own.
//!
//! ## Example
//!
//! ```
//! use respd::database::{Database, EchoDatabase};
//! use std::sync::Arc;
//!
//! let db: Arc<dyn Database> = Arc::new(EchoDatabase::new());
//! db.close();
//! ```

pub mod echo;

use crate::connection::Connection;
use crate::protocol::Reply;
use bytes::Bytes;

pub use echo::EchoDatabase;

/// A command execution engine.
pub trait Database: Send + Sync + 'static {
    /// Executes one command on behalf of `client`.
    ///
    /// Returning `None` makes the handler answer with a generic error.
    fn exec(&self, client: &Connection, args: &[Bytes]) -> Option<Reply>;

    /// Called once after `client` has been closed and deregistered.
    fn after_client_close(&self, client: &Connection);

    /// Releases engine resources during server shutdown.
    fn close(&self);
}
