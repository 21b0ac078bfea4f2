//! beenetd - Beenet mesh daemon
//!
//! Joins a swarm, maintains authenticated sessions with peers, gossips
//! application messages, and serves content-addressed chunks.

use beenetd::config::Config;
use beenetd::server::Server;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let directive = if config.verbose {
        "beenetd=debug"
    } else {
        "beenetd=info"
    };
    let filter = EnvFilter::from_default_env().add_directive(directive.parse().unwrap());
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("beenetd v{}", env!("CARGO_PKG_VERSION"));

    if let Err(error) = config.validate() {
        error!(%error, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let server = match Server::new(config) {
        Ok(server) => server,
        Err(error) => {
            error!(%error, "failed to initialize server");
            return ExitCode::FAILURE;
        }
    };

    {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal");
                server.shutdown();
            }
        });
    }

    if let Err(error) = server.run().await {
        error!(%error, "server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
