//! Chat Server - Entry Point
//!
//! Listens on every port given on the command line, one room per port.

use std::env;
use std::net::Ipv4Addr;
use std::process::ExitCode;

use futures_util::future::try_join_all;
use tracing::{error, info};

use chat_transport::config::init_logging;
use chat_transport::{AppError, IdAllocator, Server, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match ServerConfig::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(1);
        }
    };

    // Transport failures are reported, not turned into a failing exit code
    if let Err(e) = run(config).await {
        error!("Server stopped: {}", e);
        eprintln!("Exception: {}", e);
    }

    ExitCode::SUCCESS
}

async fn run(config: ServerConfig) -> Result<(), AppError> {
    let ids = IdAllocator::new();

    let mut servers = Vec::with_capacity(config.ports.len());
    for &port in &config.ports {
        servers.push(Server::bind((Ipv4Addr::UNSPECIFIED, port), &config, ids.clone()).await?);
    }
    info!("Server started on {} port(s)", servers.len());

    try_join_all(servers.into_iter().map(Server::run)).await?;
    Ok(())
}
