//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration for the case law pipeline, loaded from a TOML
//! file with environment variable overrides and validation.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files (TOML), environment variables
//! - **Output**: Validated configuration structs with defaults and overrides
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables (highest priority)
//! 2. Configuration file
//! 3. Default values (lowest priority)
//!
//! ## Usage
//! ```rust,no_run
//! use lawai_case_search::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap();
//! println!("Server port: {}", config.server.port);
//! ```

use crate::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Hosted store (Supabase-style PostgREST) settings
    pub store: StoreConfig,
    /// Embedding backend settings
    pub embedding: EmbeddingConfig,
    /// Crawler pacing and output settings
    pub crawler: CrawlerConfig,
    /// Batch ingestion settings
    pub ingestion: IngestionConfig,
    /// Search behavior
    pub search: SearchConfig,
    /// Logging and the log stream feed
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
}

/// Bounded retry settings for outbound calls
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds
    pub delay_ms: u64,
}

/// Hosted store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the store, e.g. "https://xyz.supabase.co"
    pub url: String,
    /// Service role key used for both apikey and bearer auth
    pub service_key: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Retry policy for upserts and queries
    pub retry: RetryConfig,
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible API base URL
    pub api_url: String,
    /// API key; semantic search is disabled when absent
    pub api_key: Option<String>,
    /// Embedding model identifier
    pub model: String,
    /// Vector dimensionality produced by the model
    pub dimension: usize,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Retry policy for embedding calls
    pub retry: RetryConfig,
}

/// Crawler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// User agent presented to the judicial website
    pub user_agent: String,
    /// Delay between consecutive page fetches in milliseconds
    pub page_delay_ms: u64,
    /// Delay between consecutive case detail fetches in milliseconds
    pub case_delay_ms: u64,
    /// Output file the crawl appends into
    pub output_path: PathBuf,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// Batch ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Raw case list produced by the crawler
    pub cases_path: PathBuf,
    /// Taxonomy file (array of categories)
    pub taxonomy_path: PathBuf,
    /// Bound on concurrent per-case embed + upsert operations
    pub max_concurrent_cases: usize,
}

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default maximum number of results
    pub default_limit: usize,
    /// Minimum similarity for semantic matches
    pub similarity_threshold: f32,
    /// Fixed relevance score assigned to keyword matches
    pub keyword_score: f32,
    /// Fixed relevance score assigned to category matches
    pub category_score: f32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Capacity of the log stream broadcast buffer
    pub stream_buffer: usize,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| SearchError::Config {
                message: format!("Failed to read config file {:?}: {}", path, e),
            })?;
            toml::from_str(&content).map_err(|e| SearchError::Config {
                message: format!("Failed to parse config file {:?}: {}", path, e),
            })?
        } else {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.store.url = url;
        }
        if let Ok(key) = std::env::var("SUPABASE_SERVICE_ROLE_KEY") {
            self.store.service_key = key;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port.parse().map_err(|_| SearchError::Config {
                message: "Invalid port number in PORT".to_string(),
            })?;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            self.server.allowed_origins =
                origins.split(',').map(|o| o.trim().to_string()).collect();
        }

        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(SearchError::ValidationFailed {
                field: "server.port".to_string(),
                reason: "Port cannot be zero".to_string(),
            });
        }

        if self.embedding.dimension == 0 {
            return Err(SearchError::ValidationFailed {
                field: "embedding.dimension".to_string(),
                reason: "Vector dimension must be greater than zero".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.search.similarity_threshold) {
            return Err(SearchError::ValidationFailed {
                field: "search.similarity_threshold".to_string(),
                reason: "Similarity threshold must be within [0, 1]".to_string(),
            });
        }

        if self.ingestion.max_concurrent_cases == 0 {
            return Err(SearchError::ValidationFailed {
                field: "ingestion.max_concurrent_cases".to_string(),
                reason: "Concurrency bound must be at least 1".to_string(),
            });
        }

        for retry in [&self.store.retry, &self.embedding.retry] {
            if retry.max_attempts == 0 {
                return Err(SearchError::ValidationFailed {
                    field: "retry.max_attempts".to_string(),
                    reason: "Retry policy needs at least one attempt".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            crawler: CrawlerConfig::default(),
            ingestion: IngestionConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            service_key: String::new(),
            timeout_seconds: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "text-embedding-ada-002".to_string(),
            dimension: 1536,
            timeout_seconds: 30,
            retry: RetryConfig {
                max_attempts: 3,
                delay_ms: 5000,
            },
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36"
                .to_string(),
            page_delay_ms: 2000,
            case_delay_ms: 1000,
            output_path: PathBuf::from("judicial_cases.json"),
            timeout_seconds: 30,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            cases_path: PathBuf::from("judicial_cases.json"),
            taxonomy_path: PathBuf::from("jcase_output.json"),
            max_concurrent_cases: 8,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            similarity_threshold: 0.7,
            keyword_score: 0.8,
            category_score: 0.9,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stream_buffer: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = Config::default();
        config.search.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [search]
            similarity_threshold = 0.6
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.search.similarity_threshold, 0.6);
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.embedding.dimension, 1536);
    }
}
