//! Line echo handler, useful for checking the TCP layer without RESP.

use crate::connection::Connection;
use crate::server::Handler;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Writes every `\n`-terminated line back to its sender.
#[derive(Default)]
pub struct EchoHandler {
    active: DashMap<SocketAddr, Arc<Connection>>,
    closing: AtomicBool,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_connections(&self) -> usize {
        self.active.len()
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, stream: TcpStream, addr: SocketAddr) {
        if self.closing.load(Ordering::SeqCst) {
            return;
        }

        let (client, reader) = match Connection::new(stream, addr) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(client = %addr, error = %e, "Failed to set up connection");
                return;
            }
        };
        let client = Arc::new(client);
        self.active.insert(addr, Arc::clone(&client));

        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => {
                    info!(client = %addr, "Connection closed");
                    break;
                }
                Ok(_) => {
                    if let Err(e) = client.write(&line).await {
                        debug!(client = %addr, error = %e, "Echo write failed");
                        break;
                    }
                }
                Err(e) => {
                    warn!(client = %addr, error = %e, "Read failed");
                    break;
                }
            }
        }

        let _ = client.close().await;
        self.active.remove(&addr);
    }

    async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Handler shutting down");

        let clients: Vec<Arc<Connection>> = self
            .active
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        join_all(clients.iter().map(|client| client.close())).await;
    }
}
