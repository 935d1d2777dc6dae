//! Configuration management for the lineup database builder
//!
//! Settings come from, in increasing precedence: built-in defaults, a TOML
//! file, and command-line flags (applied by the CLI). The file is searched
//! at the `--config` path, then `./lineup-builder.toml`, then
//! `<config_dir>/lineup-builder/config.toml`. Missing sections and keys fall
//! back to defaults. Durations use humantime syntax (`30s`, `1m 30s`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{ClientConfig, CoordinatorConfig, RetryPolicy, WorkerConfig};
use crate::constants::{files, http, limits, logging, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote API client settings
    pub client: ClientSection,
    /// Market ingestion settings
    pub ingestion: IngestionSection,
    /// Station enhancement settings
    pub enhancement: EnhancementSection,
    /// Retry policy for both phases
    pub retry: RetryPolicy,
    /// Output locations
    pub paths: PathsSection,
    pub logging: LoggingSection,
}

/// `[client]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub server_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Requests per second against the remote API
    pub rate_limit_rps: u32,
    pub pool_max_per_host: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server_url: http::DEFAULT_SERVER_URL.to_string(),
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            pool_max_per_host: http::POOL_MAX_PER_HOST,
        }
    }
}

/// `[ingestion]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSection {
    pub workers: usize,
    pub queue_capacity: usize,
    pub snapshot_every: usize,
}

impl Default for IngestionSection {
    fn default() -> Self {
        Self {
            workers: workers::DEFAULT_INGEST_WORKERS,
            queue_capacity: workers::DEFAULT_QUEUE_CAPACITY,
            snapshot_every: workers::DEFAULT_SNAPSHOT_EVERY,
        }
    }
}

/// `[enhancement]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementSection {
    pub workers: usize,
}

impl Default for EnhancementSection {
    fn default() -> Self {
        Self {
            workers: workers::DEFAULT_ENHANCE_WORKERS,
        }
    }
}

/// `[paths]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub database: PathBuf,
    pub registry: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            database: PathBuf::from(files::DEFAULT_DATABASE),
            registry: PathBuf::from(files::DEFAULT_REGISTRY),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// error, warn, info, debug, or trace
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

impl AppConfig {
    /// Load configuration from the first file found, or defaults
    ///
    /// An explicit `config_file` that does not exist is an error; missing
    /// default locations are not.
    pub async fn load(config_file: Option<&Path>) -> ConfigResult<Self> {
        let path = match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound {
                        path: path.to_path_buf(),
                    });
                }
                Some(path.to_path_buf())
            }
            None => Self::find_config_file(Path::new("."), dirs::config_dir()),
        };

        match path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// First existing config file among the standard locations
    pub fn find_config_file(working_dir: &Path, config_dir: Option<PathBuf>) -> Option<PathBuf> {
        let mut candidates = vec![working_dir.join(files::LOCAL_CONFIG_FILE)];
        if let Some(dir) = config_dir {
            candidates.push(dir.join(files::CONFIG_DIR_NAME).join(files::CONFIG_FILE_NAME));
        }

        let found = candidates.into_iter().find(|path| path.is_file());
        if let Some(path) = &found {
            debug!("Found config file: {}", path.display());
        }
        found
    }

    /// `<config_dir>/lineup-builder/config.toml`
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir
            .join(files::CONFIG_DIR_NAME)
            .join(files::CONFIG_FILE_NAME))
    }

    /// Load and validate a TOML file
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no run could use
    pub fn validate(&self) -> ConfigResult<()> {
        self.client_config().base_url()?;

        if self.client.rate_limit_rps == 0 {
            return Err(ConfigError::invalid(
                "client.rate_limit_rps",
                0,
                "must be at least 1",
            ));
        }
        if self.client.request_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "client.request_timeout",
                "0s",
                "must be greater than zero",
            ));
        }
        if self.client.connect_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "client.connect_timeout",
                "0s",
                "must be greater than zero",
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "logging.level",
                &self.logging.level,
                "must be one of error, warn, info, debug, trace",
            ));
        }

        self.coordinator_config().validate()
    }

    /// Runtime client configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_url: self.client.server_url.clone(),
            request_timeout: self.client.request_timeout,
            connect_timeout: self.client.connect_timeout,
            rate_limit_rps: self.client.rate_limit_rps,
            pool_max_per_host: self.client.pool_max_per_host,
            ..ClientConfig::default()
        }
    }

    /// Runtime coordinator configuration
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            ingestion: WorkerConfig::ingestion()
                .with_worker_count(self.ingestion.workers)
                .with_retry(self.retry.clone()),
            enhancement: WorkerConfig::enhancement()
                .with_worker_count(self.enhancement.workers)
                .with_retry(self.retry.clone()),
            queue_capacity: self.ingestion.queue_capacity,
            snapshot_every: self.ingestion.snapshot_every,
        }
    }

    /// Contents of a commented default configuration file
    pub fn default_file_contents() -> String {
        format!(
            r#"# Lineup builder configuration
# Every key is optional; missing keys use the values shown here.

[client]
server_url = "{server_url}"
request_timeout = "{request_timeout}s"
connect_timeout = "{connect_timeout}s"
rate_limit_rps = {rps}
pool_max_per_host = {pool}

[ingestion]
# Producers fetching markets (1-{max_ingest})
workers = {ingest}
# Fetched but unwritten markets held in memory at most
queue_capacity = {queue}
# Committed units between full checkpoint snapshots
snapshot_every = {snapshot}

[enhancement]
# Producers fetching station details (1-{max_enhance})
workers = {enhance}

[retry]
max_attempts = {attempts}
base_delay = "{base_delay}ms"
max_delay = "{max_delay}s"
multiplier = {multiplier:.1}

[paths]
database = "{database}"
registry = "{registry}"

[logging]
level = "{level}"  # error, warn, info, debug, trace
"#,
            server_url = http::DEFAULT_SERVER_URL,
            request_timeout = http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout = http::CONNECT_TIMEOUT.as_secs(),
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            pool = http::POOL_MAX_PER_HOST,
            max_ingest = workers::MAX_INGEST_WORKERS,
            ingest = workers::DEFAULT_INGEST_WORKERS,
            queue = workers::DEFAULT_QUEUE_CAPACITY,
            snapshot = workers::DEFAULT_SNAPSHOT_EVERY,
            max_enhance = workers::MAX_ENHANCE_WORKERS,
            enhance = workers::DEFAULT_ENHANCE_WORKERS,
            attempts = limits::MAX_ATTEMPTS,
            base_delay = limits::RETRY_BASE_DELAY_MS,
            max_delay = limits::MAX_BACKOFF_SECS,
            multiplier = limits::BACKOFF_MULTIPLIER,
            database = files::DEFAULT_DATABASE,
            registry = files::DEFAULT_REGISTRY,
            level = logging::DEFAULT_LOG_LEVEL,
        )
    }
}
