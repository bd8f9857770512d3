//! DEM Fetcher CLI application
//!
//! Command-line interface for downloading elevation tiles covering an area of
//! interest and merging them into one clipped raster.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

// Import CLI modules through the library (module is public but not re-exported)
use dem_fetcher::cli::{handle_config, handle_fetch, handle_tiles, Cli, Commands};
use dem_fetcher::config::AppConfig;
use dem_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    // Initialize program
    let result = run().await;

    // Handle any errors that occurred
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse_args();

    // `config` commands must work even when the current file is broken
    let config = match cli.command {
        Commands::Config(_) => None,
        _ => Some(AppConfig::load(cli.global.config.clone()).await?),
    };
    let log_level = match &config {
        Some(config) => cli.log_level_or(config.logging.level()?),
        None => cli.log_level(),
    };

    // Initialize logging based on verbosity
    init_logging(log_level, cli.global.very_verbose);

    info!("DEM Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    // Execute the appropriate command
    match cli.command {
        Commands::Fetch(args) => {
            info!("Executing fetch command");
            handle_fetch(args, config.unwrap_or_default()).await
        }
        Commands::Tiles(args) => {
            info!("Executing tiles command");
            handle_tiles(args, config.unwrap_or_default()).await
        }
        Commands::Config(args) => {
            info!("Executing config command");
            handle_config(args, cli.global.config).await
        }
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(level: tracing::Level, very_verbose: bool) {
    let filter = EnvFilter::from_default_env();
    let filter = match format!("dem_fetcher={}", level).parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(very_verbose) // Show levels only in very verbose mode
        .init();
}
