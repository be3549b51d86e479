use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use routepool::cli::commands;
use routepool::{config, Core};

#[derive(Parser)]
#[command(name = "routepool")]
#[command(version, about = "Route-aware pooled HTTP client with automatic retry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch URLs through the connection pool
    Get {
        /// One or more http(s) URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Drive concurrent load against one URL
    Bench {
        /// Target URL
        url: String,

        /// Number of concurrent units
        #[arg(long, default_value = "30")]
        units: usize,

        /// Requests issued by each unit
        #[arg(long, default_value = "10")]
        requests: usize,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Concurrent units only overlap on a multi-threaded runtime
    let runtime = if matches!(cli.command, Commands::Bench { .. }) {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
    };

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;
    let core = Core::new(config)?;

    let result = match cli.command {
        Commands::Get { urls } => commands::cmd_get(&core, &urls).await,
        Commands::Bench {
            url,
            units,
            requests,
        } => commands::cmd_bench(&core, &url, units, requests).await,
        Commands::Config => commands::cmd_config(&core),
    };

    core.shutdown().await;
    result
}
