//! tasklane engine binary entry point
//!
//! Loads configuration from the environment, initializes tracing, and starts
//! the HTTP server carrying the gateway, sidecar delivery routes, and the
//! WebSocket fanout endpoint.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tasklane_api::EngineServer;
use tasklane_common::{telemetry, EngineConfig};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tasklane-server")]
#[command(version = "0.1.0")]
#[command(about = "Event-driven recurring-task and reminder engine")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,
    },
    /// Resolve and print the effective configuration, then exit
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or("info");
    telemetry::init_tracing(log_level)?;

    let mut config = EngineConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {e}");
        e
    })?;

    match cli.command {
        Some(Commands::ValidateConfig) => {
            println!("✓ Configuration is valid");
            println!("  bind: {}:{}", config.host, config.port);
            println!("  pubsub component: {}", config.pubsub_component);
            println!(
                "  reminder variance budget: {} ms",
                config.reminder_variance_budget_ms
            );
            println!("  session buffer: {}", config.session_outbound_buffer);
            Ok(())
        }
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        None => serve(config).await,
    }
}

async fn serve(config: EngineConfig) -> Result<()> {
    info!(
        component = %config.pubsub_component,
        "tasklane engine v0.1.0 starting"
    );
    let server = EngineServer::new(config).await?;
    server.run().await
}
