//! Startup validation for the lineup builder
//!
//! Everything that can make a run impossible is checked before any producer
//! starts: the configuration, the markets file, and the server itself. A
//! failure here exits with status 1 and leaves the store and the checkpoint
//! untouched.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::app::{load_markets, LineupClient, Market, MarketSetHash};
use crate::config::AppConfig;
use crate::errors::Result;

/// Results of startup validation checks
#[derive(Debug, Clone)]
pub struct StartupStatus {
    /// Deduplicated markets to build
    pub markets: Vec<Market>,
    /// Identity of the market set, keys the checkpoint
    pub market_set: MarketSetHash,
    /// Whether the server probe ran
    pub server_probed: bool,
}

impl StartupStatus {
    /// One-line summary for display
    pub fn summary(&self) -> String {
        format!(
            "{} markets (set {}), server {}",
            self.markets.len(),
            self.market_set.short(),
            if self.server_probed {
                "reachable"
            } else {
                "not probed"
            }
        )
    }
}

/// Validate configuration and markets, then probe the server
///
/// The probe is skipped when `client` is `None`.
pub async fn validate_startup(
    config: &AppConfig,
    markets_file: &Path,
    client: Option<&LineupClient>,
) -> Result<StartupStatus> {
    let started = Instant::now();
    info!("Performing startup validation...");

    config.validate()?;
    debug!("Configuration valid");

    let markets = load_markets(markets_file).await?;
    let market_set = MarketSetHash::from_markets(&markets);
    info!(
        "Loaded {} markets from {} (set {})",
        markets.len(),
        markets_file.display(),
        market_set.short()
    );

    let server_probed = match client {
        Some(client) => {
            client.probe().await?;
            info!("Server {} is reachable", client.base_url());
            true
        }
        None => false,
    };

    let status = StartupStatus {
        markets,
        market_set,
        server_probed,
    };
    debug!(
        "Startup validation completed in {:?}: {}",
        started.elapsed(),
        status.summary()
    );
    Ok(status)
}
