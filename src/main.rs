//! respd - An In-Memory Key-Value Server Speaking RESP
//!
//! This is the main entry point for the respd server.
//! It resolves the configuration, sets up logging and runs the server
//! until a termination signal arrives.

use clap::Parser;
use respd::config::{CliArgs, ServerProperties};
use respd::connection::RespHandler;
use respd::database::EchoDatabase;
use respd::logging::Logging;
use respd::server::listen_and_serve_with_signal;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let logging = Logging::init();
    let props = ServerProperties::load(&cli)?;
    logging.apply_level(&props.log_level)?;

    info!(
        version = respd::VERSION,
        address = %props.address(),
        "Starting respd"
    );

    let handler = Arc::new(RespHandler::new(Arc::new(EchoDatabase::new())));
    listen_and_serve_with_signal(&props.server_config(), handler).await?;

    info!("Server shutdown complete");
    Ok(())
}
