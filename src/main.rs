//! Lineup builder CLI application
//!
//! Builds a searchable SQLite database of TV lineups and stations from a
//! remote lineup API, resuming interrupted runs from a checkpoint registry.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use lineup_builder::cli::{handle_build, Cli};
use lineup_builder::config::AppConfig;
use lineup_builder::constants::exit;
use lineup_builder::errors::Result;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(exit::FAILURE);
        }
    }
}

/// Main application logic
async fn run() -> Result<i32> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    // Logging depends on the configured level, so a bad file is reported
    // with the default level in place
    let config = AppConfig::load(cli.config.as_deref()).await;
    let configured_level = match &config {
        Ok(config) => config.logging.level.clone(),
        Err(_) => lineup_builder::constants::logging::DEFAULT_LOG_LEVEL.to_string(),
    };
    init_logging(&cli, &configured_level);
    let config = config?;

    info!("Lineup builder v{} starting", env!("CARGO_PKG_VERSION"));
    handle_build(cli, config).await
}

/// Initialize logging from the verbosity flags and the configured level
fn init_logging(cli: &Cli, configured_level: &str) {
    let log_level = cli.log_level(configured_level);

    let mut filter = EnvFilter::from_default_env();
    match format!("lineup_builder={}", log_level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring log directive: {}", e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose || cli.global.verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
