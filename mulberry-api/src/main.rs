//! Mulberry Server
//!
//! Main entry point for the Mulberry load balancer

use clap::Parser;
use mulberry_api::{init_tracing, start_server, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return Err(e);
        }
    };

    start_server(config).await
}
