//! CLI entry point for the simulated plotter controller.

use clap::Parser;
use std::time::Duration;

use plotter_remote::sim::{SimOptions, SimServer};

/// Simulated pen-plotter controller serving `/api` and `/upload`
#[derive(Parser, Debug)]
#[command(name = "plotter-sim", version, about)]
pub struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Milliseconds between completed actions (0 freezes running jobs)
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Log every frame
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let options = SimOptions {
        tick: (cli.tick_ms > 0).then(|| Duration::from_millis(cli.tick_ms)),
        seconds_per_action: cli.tick_ms as f64 / 1000.0,
    };
    let server = SimServer::start(&cli.bind, options).await?;
    tracing::info!("Point plotter-remote at --origin {}", server.origin());
    server.wait().await;
    Ok(())
}
