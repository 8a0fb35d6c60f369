//! Tiller Delivery Relay - frame forwarding between clients.
//!
//! This binary runs the store-nothing relay that tiller clients post
//! frames to and hold their delivery sockets against.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tiller-delivery")]
#[command(about = "Delivery relay for tiller clients")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting delivery relay");
    let addr = tiller_delivery::start_server(&args.host, args.port).await?;
    info!("Delivery relay running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
