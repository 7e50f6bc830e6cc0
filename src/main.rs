use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use timegate::config::Config;
use timegate::logging;
use timegate::metrics::init_metrics;
use timegate::server::start_server;
use timegate::sources::build_registry;
use timegate::timegate::TimeGate;

#[derive(Parser)]
#[command(name = "timegate")]
#[command(about = "Memento TimeGate and TimeMap server")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Config file (defaults to $TIMEGATE_CONFIG or config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Listen address, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the handlers in resolution order
    Routes {
        /// Config file (defaults to $TIMEGATE_CONFIG or config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = path.unwrap_or_else(Config::default_path);
    Config::load(&path).with_context(|| format!("loading {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let log_dir = std::env::var("TIMEGATE_LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let _guard = logging::init_logging(Path::new(&log_dir));

    match cli.command {
        Commands::Serve { config, bind } => {
            let mut config = load_config(config)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }

            if let Ok(addr) = std::env::var("TIMEGATE_METRICS_ADDR") {
                match addr.parse::<SocketAddr>() {
                    Ok(addr) => init_metrics(addr)?,
                    Err(e) => warn!("Ignoring TIMEGATE_METRICS_ADDR '{}': {}", addr, e),
                }
            }

            let timegate = Arc::new(TimeGate::from_config(&config)?);
            info!("Starting TimeGate on {}", config.server.bind);
            start_server(timegate, &config.server.bind).await?;
        }
        Commands::Routes { config } => {
            let config = load_config(config)?;
            let registry = build_registry(&config)?;

            println!(
                "{:<12} {:<8} {:<6} {:<18} {:<9} BASE URI",
                "HANDLER", "SOURCE", "WEIGHT", "POLICY", "TIMEMAPS"
            );
            for handler in registry.handlers() {
                let binding = &handler.binding;
                println!(
                    "{:<12} {:<8} {:<6} {:<18} {:<9} {}",
                    binding.label(),
                    handler.source.source_name(),
                    binding.priority_weight,
                    format!("{:?}", handler.resource_type()),
                    handler.use_timemaps(),
                    binding.base_uri.as_deref().unwrap_or("*")
                );
            }
        }
    }

    Ok(())
}
