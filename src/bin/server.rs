//! Reagent gateway server
//!
//! Serves the WebSocket transport and the REST surface for sessions and
//! workspace files.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use reagent::config::Config;
use reagent::gateway::{serve, GatewayState};

#[derive(Parser)]
#[command(name = "reagent-server", about = "Reagent agent runtime gateway")]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Port (overrides config)
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!(
        "Starting {} v{} on {}:{}",
        reagent::NAME,
        reagent::VERSION,
        config.server.bind,
        config.server.port
    );

    let state = Arc::new(GatewayState::new(config)?);
    serve(state).await?;
    Ok(())
}
