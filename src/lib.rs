//! # Taiwanese Judicial Case Law Search
//!
//! ## Overview
//! This library implements the full pipeline behind a searchable database of
//! Taiwanese judicial case law: a crawler for the judicial website, batch
//! tools for the category/subcategory taxonomy, an ingestion pipeline that
//! embeds and upserts cases into a hosted relational/vector store, and a
//! thin HTTP service exposing keyword, semantic, category, and hybrid search.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `crawler`: Paced page walk over the judicial website, raw case scraping
//! - `taxonomy`: Category/subcategory model and the identity-keyed merge
//! - `normalize`: Raw case normalization and Minguo calendar conversion
//! - `embedding`: Embedding generation client (OpenAI-compatible REST)
//! - `store`: Hosted store client (PostgREST upsert/select/rpc)
//! - `ingest`: Batch ingestion of cases and taxonomy into the store
//! - `search`: Multi-strategy retrieval, ranking, and deduplication
//! - `api`: REST endpoints and the log streaming feed
//! - `config`: Configuration management and settings
//! - `errors`: Centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Raw case pages (HTML), case and taxonomy files (JSON), search queries
//! - **Output**: Upserted store rows, ranked search results with case metadata
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use lawai_case_search::{Config, embedding::EmbeddingClient, store::StoreClient};
//! use lawai_case_search::search::SearchService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.toml")?;
//!     let store = Arc::new(StoreClient::new(config.store.clone())?);
//!     let embedding = Arc::new(EmbeddingClient::new(config.embedding.clone())?);
//!     let service = SearchService::new(config.search.clone(), store, embedding);
//!     let response = service.search("損害賠償", None, &Default::default(), 10).await;
//!     println!("Found {} results", response.total_count);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod logging;
pub mod taxonomy;
pub mod normalize;
pub mod embedding;
pub mod store;
pub mod search;
pub mod crawler;
pub mod ingest;
pub mod api;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use errors::{Result, SearchError};
pub use search::{SearchResponse, SearchResult, SearchService};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A case record as scraped from the judicial website, before normalization.
///
/// Field names follow the crawler's header mapping. Older crawls wrote the
/// topic under `case_summary`; both spellings deserialize into `case_topic`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCaseRecord {
    /// Court-docket identifier, e.g. "70年度台上字第1615號民事"
    #[serde(default)]
    pub case_id: Option<String>,
    /// Case topic / cause of action summary
    #[serde(default, alias = "case_summary")]
    pub case_topic: Option<String>,
    /// Decision date in the Minguo calendar, e.g. "民國 70 年 1 月 15 日"
    #[serde(default)]
    pub case_date: Option<String>,
    /// Gist of the ruling
    #[serde(default)]
    pub case_gist: Option<String>,
}

/// A normalized case record, ready for upsert into the `cases` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Unique court-docket identifier; the cross-cutting identity key
    pub case_id: String,
    pub case_topic: Option<String>,
    /// ISO-8601 date where the source date was convertible, the source
    /// string passed through otherwise
    pub case_date: Option<String>,
    pub case_gist: Option<String>,
    /// Embedding of `case_gist`; absent when the gist is empty or the
    /// embedding backend was unavailable
    pub case_gist_embedding: Option<Vec<f32>>,
}

/// Application state shared across API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Config>,
    pub search_service: Arc<search::SearchService>,
    pub log_feed: logging::LogFeed,
}
