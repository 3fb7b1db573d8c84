//! TCP Server and Shutdown Coordination
//!
//! ```text
//!   Bound ──> Accepting ──(signal / close request)──> ShuttingDown ──> Drained
//! ```
//!
//! - **Bound**: the listener is open on the configured address.
//! - **Accepting**: every accepted socket is handed to [`Handler::handle`] on
//!   its own task and counted as in flight.
//! - **ShuttingDown**: a supervisor task waits for the close request, then
//!   stops the accept loop and closes the handler, which in turn closes its
//!   live connections.
//! - **Drained**: the server returns only once every spawned handler task
//!   has finished.

pub mod signal;

use crate::sync::Wait;
use anyhow::Context;
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info};

pub use signal::spawn_signal_listener;

/// Resolved listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `host:port` to listen on
    pub address: String,
}

/// Serves accepted connections.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Runs for the lifetime of one connection.
    async fn handle(&self, stream: TcpStream, addr: SocketAddr);

    /// Refuses new connections and closes the live ones. Must be safe to
    /// call more than once.
    async fn close(&self);
}

/// Binds `config.address` and serves until SIGHUP, SIGQUIT, SIGTERM or
/// SIGINT arrives, then shuts down gracefully.
pub async fn listen_and_serve_with_signal<H: Handler>(
    config: &Config,
    handler: Arc<H>,
) -> anyhow::Result<()> {
    let shutdown = spawn_signal_listener().context("failed to install signal handlers")?;

    let listener = TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    info!(address = %listener.local_addr()?, "Start listening");

    listen_and_serve(listener, handler, async move {
        if shutdown.await.is_err() {
            // The signal task is gone; only an external close could stop us
            std::future::pending::<()>().await;
        }
    })
    .await;
    Ok(())
}

/// Accepts connections on `listener` until `close` resolves or accept
/// fails, then closes `handler` and waits for every connection task.
pub async fn listen_and_serve<H, F>(listener: TcpListener, handler: Arc<H>, close: F)
where
    H: Handler,
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let supervisor = {
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            close.await;
            info!("Shutting down");
            let _ = stop_tx.send(true);
            handler.close().await;
        })
    };

    let in_flight = Arc::new(Wait::new());

    let stopped = loop {
        let (stream, addr) = tokio::select! {
            biased;
            _ = stop_rx.changed() => break true,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    break false;
                }
            },
        };

        info!(client = %addr, "Accepted connection");
        let guard = in_flight.guard_owned();
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let _guard = guard;
            handler.handle(stream, addr).await;
        });
    };

    drop(listener);
    if stopped {
        // The supervisor is mid-way through handler.close(); let it finish
        if let Err(e) = supervisor.await {
            error!(error = %e, "Shutdown supervisor failed");
            handler.close().await;
        }
    } else {
        supervisor.abort();
        handler.close().await;
    }
    in_flight.wait().await;
    info!("All connections drained");
}
