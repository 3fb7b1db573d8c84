//! RESP Request Handler
//!
//! One `handle` call runs for the lifetime of each accepted connection.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects
//!        │
//!        ▼
//! 2. Refused if the handler is closing, otherwise registered
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────┐
//!    │  Parser task ──(1 slot)──> loop  │
//!    │                                  │
//!    │  command  -> Database::exec      │
//!    │           -> write reply         │
//!    │  protocol error -> error reply   │
//!    │  anything else  -> log, skip     │
//!    └──────────────────────────────────┘
//!        │
//!        ▼
//! 4. Transport error: close, notify the database, deregister
//! ```
//!
//! A single consumer drains the parser's output, so replies go out in
//! exactly the order their requests arrived.

use crate::connection::{Connection, ConnectionError};
use crate::database::Database;
use crate::protocol::{parse_stream, ParseError, Payload, Reply};
use crate::server::Handler;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Serves RESP clients against a shared [`Database`].
pub struct RespHandler {
    /// Live connections, keyed by remote address
    active: DashMap<SocketAddr, Arc<Connection>>,

    db: Arc<dyn Database>,

    /// Set once by `close`; refuses new connections afterwards
    closing: AtomicBool,
}

impl RespHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            active: DashMap::new(),
            db,
            closing: AtomicBool::new(false),
        }
    }

    /// Number of registered connections.
    pub fn active_connections(&self) -> usize {
        self.active.len()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Closes `client`, tells the database, and drops it from the registry.
    async fn close_client(&self, client: &Connection) {
        if let Err(e) = client.close().await {
            debug!(client = %client.remote_addr(), error = %e, "Error closing connection");
        }
        self.db.after_client_close(client);
        self.active.remove(&client.remote_addr());
    }

    /// Drains the parser until the connection ends.
    async fn serve(&self, client: &Connection, mut payloads: tokio::sync::mpsc::Receiver<Payload>) {
        let addr = client.remote_addr();

        while let Some(payload) = payloads.recv().await {
            let reply = match payload {
                Payload::Error(e) if e.is_transport() => {
                    self.close_client(client).await;
                    match e {
                        ParseError::ConnectionClosed => info!(client = %addr, "Connection closed"),
                        e => info!(client = %addr, error = %e, "Connection closed"),
                    }
                    return;
                }
                Payload::Error(e) => {
                    warn!(client = %addr, error = %e, "Protocol error");
                    Reply::error(e.to_string())
                }
                Payload::Unrecognized(line) => {
                    error!(client = %addr, line = %line.escape_ascii(), "Empty payload");
                    continue;
                }
                Payload::Reply(Reply::MultiBulk(args)) => self
                    .db
                    .exec(client, &args)
                    .unwrap_or_else(Reply::unknown_error),
                Payload::Reply(other) => {
                    error!(client = %addr, reply = ?other, "Require multi bulk reply");
                    continue;
                }
            };

            if let Err(e) = client.write(&reply.serialize()).await {
                match e {
                    ConnectionError::Closed => debug!(client = %addr, "Write refused, closing"),
                    e => warn!(client = %addr, error = %e, "Write failed"),
                }
                self.close_client(client).await;
                info!(client = %addr, "Connection closed");
                return;
            }
        }

        // The parser task ended without reporting a transport error
        warn!(client = %addr, "Parser stopped unexpectedly");
        self.close_client(client).await;
    }
}

#[async_trait]
impl Handler for RespHandler {
    async fn handle(&self, stream: TcpStream, addr: SocketAddr) {
        if self.is_closing() {
            debug!(client = %addr, "Refusing connection, handler is closing");
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

        // close() may have snapshotted the registry before our insert
        if self.is_closing() {
            self.close_client(&client).await;
            return;
        }

        let payloads = parse_stream(reader);
        self.serve(&client, payloads).await;
    }

    async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Handler shutting down");

        // Best effort: the connection tasks themselves are not awaited here
        let clients: Vec<Arc<Connection>> = self
            .active
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        join_all(clients.iter().map(|client| client.close())).await;

        self.db.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::EchoDatabase;
    use crate::server::listen_and_serve;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Answers nothing and counts lifecycle callbacks.
    #[derive(Default)]
    struct SilentDatabase {
        closed_clients: AtomicUsize,
        shut_down: AtomicBool,
    }

    impl Database for SilentDatabase {
        fn exec(&self, _client: &Connection, _args: &[Bytes]) -> Option<Reply> {
            None
        }

        fn after_client_close(&self, _client: &Connection) {
            self.closed_clients.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    struct TestServer {
        addr: SocketAddr,
        handler: Arc<RespHandler>,
        stop: Option<oneshot::Sender<()>>,
        done: tokio::task::JoinHandle<()>,
    }

    impl TestServer {
        async fn start(db: Arc<dyn Database>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let handler = Arc::new(RespHandler::new(db));
            let (stop, stopped) = oneshot::channel::<()>();

            let done = tokio::spawn(listen_and_serve(listener, Arc::clone(&handler), async move {
                let _ = stopped.await;
            }));

            Self {
                addr,
                handler,
                stop: Some(stop),
                done,
            }
        }

        async fn shutdown(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            tokio::time::timeout(Duration::from_secs(5), self.done)
                .await
                .unwrap()
                .unwrap();
        }
    }

    async fn read_exactly(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_command_round_trip() {
        let server = TestServer::start(Arc::new(EchoDatabase::new())).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 14).await, b"*1\r\n$4\r\nPING\r\n");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_protocol_error_keeps_session_open() {
        let server = TestServer::start(Arc::new(EchoDatabase::new())).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"*abc\r\n").await.unwrap();
        let expected = b"-protocol error: *abc\r\n";
        assert_eq!(read_exactly(&mut client, expected.len()).await, expected);

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 14).await, b"*1\r\n$4\r\nPING\r\n");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_non_command_payloads_are_skipped() {
        let server = TestServer::start(Arc::new(EchoDatabase::new())).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client
            .write_all(b"+OK\r\n:1\r\n*0\r\nhello\r\n*1\r\n$1\r\nx\r\n")
            .await
            .unwrap();
        // Only the final multi-bulk is answered
        assert_eq!(read_exactly(&mut client, 11).await, b"*1\r\n$1\r\nx\r\n");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_reply_becomes_unknown_error() {
        let db = Arc::new(SilentDatabase::default());
        let server = TestServer::start(db.clone()).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"*1\r\n$3\r\nGET\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 14).await, b"-ERR unknown\r\n");

        server.shutdown().await;
        assert!(db.shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect_deregisters_client() {
        let db = Arc::new(SilentDatabase::default());
        let server = TestServer::start(db.clone()).await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        client.write_all(b"*1\r\n$3\r\nGET\r\n").await.unwrap();
        read_exactly(&mut client, 14).await;
        assert_eq!(server.handler.active_connections(), 1);

        drop(client);
        tokio::time::timeout(Duration::from_secs(2), async {
            while server.handler.active_connections() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(db.closed_clients.load(Ordering::SeqCst), 1);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_closing_handler_refuses_connections() {
        let handler = RespHandler::new(Arc::new(EchoDatabase::new()));
        handler.close().await;
        assert!(handler.is_closing());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, addr) = listener.accept().await.unwrap();

        handler.handle(stream, addr).await;
        assert_eq!(handler.active_connections(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_disconnects_live_clients() {
        let server = TestServer::start(Arc::new(EchoDatabase::new())).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        read_exactly(&mut client, 14).await;

        server.shutdown().await;

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }
}
