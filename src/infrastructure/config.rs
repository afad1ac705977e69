//! Application configuration
//!
//! Serde-backed configuration loaded from a JSON file under the platform
//! data directory. Every section has sane defaults so a missing file means
//! "run with defaults", not an error. The scheduler's cadence settings are
//! deliberately NOT here: those live in the database as a single durable
//! record so the external layer can update them at runtime.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub fetch: FetchConfig,
    pub scraping: ScrapingConfig,
    pub descriptions: DescriptionFetchConfig,
    pub ai: AiConfig,
    pub logging: LoggingConfig,
}

/// Where the SQLite store lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: app_data_dir().join("jobs.db"),
        }
    }
}

/// Browser fetch-layer pacing and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub headless: bool,
    /// Minimum delay between requests, measured from the previous
    /// request's completion
    pub min_request_delay_ms: u64,
    pub max_request_delay_ms: u64,
    pub max_retries: u32,
    pub navigation_timeout_secs: u64,
    /// How long to wait for listing elements before treating their absence
    /// as "no more results"
    pub selector_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            min_request_delay_ms: 2_000,
            max_request_delay_ms: 5_000,
            max_retries: 3,
            navigation_timeout_secs: 30,
            selector_timeout_secs: 10,
        }
    }
}

/// Scrape-stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// Pagination cap per source per search
    pub max_pages: usize,
    /// Persist each record as it is extracted instead of batching
    pub save_incrementally: bool,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            max_pages: 5,
            save_incrementally: true,
        }
    }
}

/// Description-backfill settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionFetchConfig {
    pub timeout_secs: u64,
    /// Courtesy pacing for the lightweight HTTP path
    pub max_requests_per_second: u32,
    /// Default batch size for a description-refresh pass
    pub batch_limit: i64,
}

impl Default for DescriptionFetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_requests_per_second: 2,
            batch_limit: 100,
        }
    }
}

/// AI enrichment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub base_url: String,
    pub model: String,
    /// Explicit credentials; when empty, keys are read from the
    /// AI_API_KEY / AI_API_KEY2 / AI_API_KEY3 environment variables
    pub api_keys: Vec<String>,
    /// Sliding-window quota per credential
    pub requests_per_key_per_minute: usize,
    /// Worker-pool width; decoupled from the key count since network
    /// latency dominates
    pub max_workers: usize,
    /// Upper bound on waiting for a credential before a job is abandoned
    pub max_key_wait_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Default batch size for an AI pass
    pub batch_limit: i64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            model: "moonshotai/kimi-k2-instruct-0905".to_string(),
            api_keys: Vec::new(),
            requests_per_key_per_minute: 40,
            max_workers: 10,
            max_key_wait_secs: 120,
            temperature: 0.3,
            max_tokens: 4096,
            batch_limit: 50,
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    pub file_output: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,sqlx=warn".to_string(),
            file_output: false,
            log_dir: None,
        }
    }
}

/// Platform data directory for this application
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jobharvest")
}

/// Default location of the configuration file
pub fn default_config_path() -> PathBuf {
    app_data_dir().join("config.json")
}

impl AppConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Persist the configuration as pretty JSON, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }

        let raw = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let config = AppConfig::load_or_default(&path).await.unwrap();
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.ai.requests_per_key_per_minute, 40);
    }

    #[tokio::test]
    async fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.scraping.max_pages = 9;
        config.save(&path).await.unwrap();

        let back = AppConfig::load_or_default(&path).await.unwrap();
        assert_eq!(back.scraping.max_pages, 9);
    }
}
