//! Huddle server binary.
//!
//! # Usage
//!
//! ```bash
//! # Development defaults
//! huddle-server
//!
//! # Explicit bind address and data directory
//! huddle-server --bind 0.0.0.0:5000 --data-dir /var/lib/huddle
//! ```

use std::path::PathBuf;

use clap::Parser;
use huddle_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle chat relay server
#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Room-scoped chat relay server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// Directory for the message log and account store
    #[arg(short, long, default_value = "huddle-data")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Huddle server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig { bind_address: args.bind, data_dir: args.data_dir };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
