//! A database that answers every command with its own arguments.

use super::Database;
use crate::connection::Connection;
use crate::protocol::Reply;
use bytes::Bytes;
use tracing::trace;

/// Echoes each command back as a multi-bulk reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoDatabase;

impl EchoDatabase {
    pub fn new() -> Self {
        Self
    }
}

impl Database for EchoDatabase {
    fn exec(&self, client: &Connection, args: &[Bytes]) -> Option<Reply> {
        trace!(client = %client.remote_addr(), args = args.len(), "Echoing command");
        Some(Reply::multi_bulk(args.to_vec()))
    }

    fn after_client_close(&self, _client: &Connection) {}

    fn close(&self) {}
}
