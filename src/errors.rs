//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the case law pipeline, providing structured
//! error types and conversion utilities for all system components.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from crawling, ingestion, store, and search
//! - **Output**: Structured error types with context
//! - **Error Categories**: Crawl, Taxonomy, Store, Embedding, Search, API, Configuration
//!
//! ## Key Features
//! - Recoverability classification driving the retry policy
//! - Automatic conversion from common library errors
//! - Structured logging integration

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, SearchError>;

/// Error types for the case law pipeline
#[derive(Debug, Error)]
pub enum SearchError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Crawling errors (listing or detail fetch/parse)
    #[error("Crawl error at {url}: {details}")]
    Crawl { url: String, details: String },

    /// Hosted store errors (upsert, select, rpc)
    #[error("Store error during {operation}: {details}")]
    Store { operation: String, details: String },

    /// Embedding generation errors
    #[error("Embedding generation failed: {details}")]
    EmbeddingFailed { details: String },

    /// Validation errors
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// Malformed taxonomy data
    #[error("Invalid taxonomy data: {details}")]
    InvalidTaxonomy { details: String },

    /// Invalid search query
    #[error("Invalid search query: {reason}")]
    InvalidSearchQuery { reason: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SearchError {
    /// Check if the error is transient and worth retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            SearchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SearchError::Store { .. } | SearchError::EmbeddingFailed { .. } => true,
            _ => false,
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            SearchError::Config { .. } | SearchError::Toml(_) => "configuration",
            SearchError::Crawl { .. } => "crawler",
            SearchError::Store { .. } => "store",
            SearchError::EmbeddingFailed { .. } => "embedding",
            SearchError::InvalidTaxonomy { .. } => "taxonomy",
            SearchError::InvalidSearchQuery { .. } => "search",
            SearchError::Http(_) => "network",
            SearchError::Json(_) | SearchError::Io(_) => "io",
            SearchError::ValidationFailed { .. } | SearchError::Internal { .. } => "generic",
        }
    }
}

// Helper macro for common error patterns
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::errors::SearchError::Internal {
            message: $msg.to_string(),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::SearchError::Internal {
            message: format!($fmt, $($arg)*),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_recoverable() {
        let err = SearchError::Store {
            operation: "upsert cases".to_string(),
            details: "503".to_string(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "store");
    }

    #[test]
    fn validation_errors_are_not_recoverable() {
        let err = SearchError::ValidationFailed {
            field: "case_id".to_string(),
            reason: "missing".to_string(),
        };
        assert!(!err.is_recoverable());
    }
}
