//! # `objwire-server`
//!
//! Serves one immutable object three ways:
//! - `GET /http` on the HTTP port,
//! - `ObjectAccessor/GetObject` (unary gRPC),
//! - `ObjectAccessor/GetObjectStream` (bidirectional streaming gRPC).
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin objwire-server --release -- --data-file testdata/content_data
//! ```

use clap::Parser;
use objwire_server::server::{
    ObjectServer,
    config::{CliArgs, ServerConfig},
    telemetry::init_telemetry,
};
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let res = match ObjectServer::spawn(config).await {
        Ok(server) => server.run_until(shutdown_signal()).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &res {
        tracing::error!("{e:#}");
    }

    providers.shutdown();
    res
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
