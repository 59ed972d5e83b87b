//! TCP Chat Server - Entry Point
//!
//! Binds the listener, runs the accept loop on a blocking thread and waits
//! for Ctrl+C to shut it down.

use std::env;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tcp_chat::{ChatServer, ServerConfig};

const USAGE: &str = "Usage: tcp_chat_server [port] [--config <file.json>]";

#[tokio::main]
async fn main() -> ExitCode {
    // Use RUST_LOG to control log level, e.g. RUST_LOG=tcp_chat=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tcp_chat=info")),
        )
        .init();

    let config = match ServerConfig::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    let server = match ChatServer::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let handle = server.handle();
    info!("Press Ctrl+C to stop the server");

    let accept_loop = tokio::task::spawn_blocking(move || server.run());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received shutdown signal");
    handle.shutdown();

    match accept_loop.await {
        Ok(report) => {
            info!(
                "Server stopped ({} joined, {} forced, {} abandoned)",
                report.joined, report.forced, report.abandoned
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Server thread failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
