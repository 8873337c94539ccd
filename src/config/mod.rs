//! Configuration management for the simya crawler
//!
//! Handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Crawler configuration
    pub crawler: CrawlerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Venue registry configuration
    pub registry: RegistryConfig,

    /// TMDB poster lookup configuration
    pub tmdb: TmdbConfig,

    /// KOFA open-API configuration
    pub kofa: KofaConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Crawler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Rate limit (requests per second) shared by the HTTP fetcher
    pub rate_limit: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum retry attempts for retryable HTTP failures
    pub max_retries: u32,

    /// Fixed User-Agent; when unset a desktop-browser pool is rotated
    pub user_agent: Option<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Venue registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Static JSON snapshot of venue records; when unset, venues are read
    /// from the database
    pub snapshot_path: Option<PathBuf>,
}

/// TMDB configuration for the poster updater
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbConfig {
    /// API read access token (Bearer)
    pub api_token: Option<String>,
}

/// KOFA Cinematheque open-API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KofaConfig {
    /// KMDb service key
    pub service_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let rate_limit = std::env::var("SIMYA_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(2);

        let request_timeout_secs = std::env::var("SIMYA_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let max_retries = std::env::var("SIMYA_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        let user_agent = std::env::var("SIMYA_USER_AGENT").ok();

        let sqlite_path = std::env::var("SIMYA_SQLITE_PATH")
            .unwrap_or_else(|_| String::from("data/simya.db"))
            .into();

        let snapshot_path = std::env::var("SIMYA_VENUES_PATH").ok().map(PathBuf::from);

        let api_token = std::env::var("TMDB_API_TOKEN").ok();
        let service_key = std::env::var("KOFA_SERVICE_KEY").ok();

        let level = std::env::var("SIMYA_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
        let format = std::env::var("SIMYA_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            crawler: CrawlerConfig {
                rate_limit,
                request_timeout_secs,
                max_retries,
                user_agent,
            },
            database: DatabaseConfig { sqlite_path },
            registry: RegistryConfig { snapshot_path },
            tmdb: TmdbConfig { api_token },
            kofa: KofaConfig { service_key },
            logging: LoggingConfig { level, format },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.crawler.rate_limit == 0 {
            anyhow::bail!("rate_limit must be greater than 0");
        }

        if self.crawler.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig {
                rate_limit: 2,
                request_timeout_secs: 10,
                max_retries: 3,
                user_agent: None,
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/simya.db"),
            },
            registry: RegistryConfig {
                snapshot_path: None,
            },
            tmdb: TmdbConfig { api_token: None },
            kofa: KofaConfig { service_key: None },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}
