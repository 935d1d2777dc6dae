//! Application constants for the lineup database builder
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Overrides the remote lineup API base URL
    pub const SERVER_URL: &str = "LINEUP_BUILDER_SERVER";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default remote lineup API base URL
    pub const DEFAULT_SERVER_URL: &str = "https://api.getchannels.com";

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "lineup-builder/0.1.0 (TV lineup database builder)";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 20;

    /// Upper bound of random jitter added after the rate limiter admits a request
    pub const RATE_LIMIT_JITTER: Duration = Duration::from_millis(100);
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default request rate against the remote API (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;

    /// Maximum attempts per remote call (first attempt included)
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    /// Maximum backoff delay (seconds)
    pub const MAX_BACKOFF_SECS: u64 = 30;

    /// Backoff growth factor between attempts
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of ingestion producers
    pub const DEFAULT_INGEST_WORKERS: usize = 4;

    /// Hard cap on ingestion producers
    pub const MAX_INGEST_WORKERS: usize = 10;

    /// Default number of enhancement producers
    pub const DEFAULT_ENHANCE_WORKERS: usize = 10;

    /// Hard cap on enhancement producers
    pub const MAX_ENHANCE_WORKERS: usize = 20;

    /// Bounded queue capacity (fetched but unwritten units)
    pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

    /// Committed units between full registry snapshots
    pub const DEFAULT_SNAPSHOT_EVERY: usize = 200;
}

/// File and path defaults
pub mod files {
    /// Default SQLite database path
    pub const DEFAULT_DATABASE: &str = "lineups.db";

    /// Default checkpoint registry path
    pub const DEFAULT_REGISTRY: &str = "lineup_registry.json";

    /// Suffix appended to the registry path for the append-only journal
    pub const JOURNAL_SUFFIX: &str = "journal";

    /// Local configuration file name
    pub const LOCAL_CONFIG_FILE: &str = "lineup-builder.toml";

    /// Directory under the user config dir
    pub const CONFIG_DIR_NAME: &str = "lineup-builder";

    /// Configuration file name inside the user config dir
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// Timestamp format used in archived checkpoint names
    pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
}

/// Registry document constants
pub mod registry {
    /// Current registry document version
    pub const VERSION: u32 = 1;
}

/// Progress reporting and monitoring
pub mod progress {
    use super::Duration;

    /// Minimum interval between periodic progress log lines
    pub const LOG_INTERVAL: Duration = Duration::from_secs(10);

    /// Progress bar refresh frequency
    pub const BAR_TICK: Duration = Duration::from_millis(100);
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

/// Process exit codes
pub mod exit {
    /// Run completed (isolated unit failures included)
    pub const SUCCESS: i32 = 0;

    /// Startup failure or fatal store/registry error
    pub const FAILURE: i32 = 1;

    /// Interrupted by signal
    pub const INTERRUPTED: i32 = 130;
}

// Re-export commonly used constants for convenience
pub use env::SERVER_URL as ENV_SERVER_URL;
pub use http::{DEFAULT_SERVER_URL, DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_ATTEMPTS};
pub use workers::{DEFAULT_ENHANCE_WORKERS, DEFAULT_INGEST_WORKERS, DEFAULT_QUEUE_CAPACITY};
