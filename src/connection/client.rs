//! A single accepted client socket.
//!
//! The socket is split in two: the read half goes to the stream parser, the
//! write half stays here behind a mutex so replies never interleave. Every
//! write is registered with a [`Wait`] so that `close` can let an in-flight
//! reply finish before the socket is torn down. A duplicate of the socket
//! handle is kept for shutdown, so closing never has to queue behind a
//! stalled write.

use crate::sync::Wait;
use socket2::{SockRef, Socket};
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How long `close` lets in-flight writes run before tearing the socket down
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors on the write path.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The connection is closing and accepts no new writes
    #[error("connection closed")]
    Closed,

    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The server side of one client connection.
#[derive(Debug)]
pub struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    socket: Socket,
    addr: SocketAddr,
    waiting: Wait,
    closing: AtomicBool,
}

impl Connection {
    /// Wraps `stream`, returning the connection and the read half the parser
    /// should consume.
    pub fn new(stream: TcpStream, addr: SocketAddr) -> std::io::Result<(Self, OwnedReadHalf)> {
        let socket = SockRef::from(&stream).try_clone()?;
        let (reader, writer) = stream.into_split();
        let conn = Self {
            writer: Mutex::new(writer),
            socket,
            addr,
            waiting: Wait::new(),
            closing: AtomicBool::new(false),
        };
        Ok((conn, reader))
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Writes `bytes` in full. Writes are serialized; once `close` has
    /// started, new writes fail with [`ConnectionError::Closed`].
    pub async fn write(&self, bytes: &[u8]) -> Result<(), ConnectionError> {
        if bytes.is_empty() {
            return Ok(());
        }

        // Register before checking the flag so close never misses us
        let _pending = self.waiting.guard();
        if self.is_closing() {
            return Err(ConnectionError::Closed);
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Stops new writes, waits up to [`CLOSE_TIMEOUT`] for writes already
    /// under way, then shuts the socket down in both directions so the
    /// parser's pending read ends. Closing twice is harmless.
    pub async fn close(&self) -> std::io::Result<()> {
        self.close_with_timeout(CLOSE_TIMEOUT).await
    }

    pub(crate) async fn close_with_timeout(&self, timeout: Duration) -> std::io::Result<()> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if self.waiting.wait_with_timeout(timeout).await {
            warn!(client = %self.addr, "Timed out waiting for in-flight writes");
        }

        match self.socket.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {
                debug!(client = %self.addr, "Socket already disconnected");
                Ok(())
            }
            other => other,
        }
    }
}
