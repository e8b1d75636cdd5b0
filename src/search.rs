//! # Search Module
//!
//! ## Purpose
//! Multi-strategy retrieval over the hosted store: keyword match, semantic
//! similarity, and category membership, composed into hybrid search with
//! deduplication and score-based ranking.
//!
//! ## Input/Output Specification
//! - **Input**: Query text, strategy names, category filters, result limit
//! - **Output**: Ranked, deduplicated search results with case metadata
//! - **Degradation**: Any single failing strategy yields an empty result set
//!   for that strategy and never aborts the overall query.
//!
//! ## Key Features
//! - Fixed scores for keyword (0.8) and category (0.9) hits, store-reported
//!   similarity for semantic hits
//! - Hybrid composition: semantic and keyword halves run concurrently
//! - First-seen deduplication by case identity, stable descending sort
//! - Court name derivation from markers inside the case identifier

use crate::config::SearchConfig;
use crate::embedding::EmbeddingClient;
use crate::store::{CaseRow, StoreClient};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Retrieval strategy that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Semantic,
    Keyword,
    Category,
}

/// One ranked search hit; ephemeral, produced per query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub case_id: String,
    /// Display title; the case identifier doubles as the title
    pub title: String,
    pub case_topic: Option<String>,
    pub case_date: Option<String>,
    pub summary: Option<String>,
    /// Court derived from markers within the case identifier
    pub court: String,
    pub relevance_score: f32,
    pub search_method: SearchMethod,
}

/// Category filters accepted by the search endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
}

/// Final search response envelope
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub results: Vec<SearchResult>,
    pub total_count: usize,
    pub query: String,
    pub search_methods: Vec<String>,
    pub timestamp: String,
}

/// Ordered court-name markers found in case identifiers; first match wins
const COURT_MARKERS: &[(&str, &str)] = &[
    ("台上", "最高法院"),
    ("台高", "台灣高等法院"),
    ("台中高", "台灣高等法院台中分院"),
    ("台南高", "台灣高等法院台南分院"),
    ("高雄高", "台灣高等法院高雄分院"),
    ("花蓮高", "台灣高等法院花蓮分院"),
    ("台北地", "台灣台北地方法院"),
    ("新北地", "台灣新北地方法院"),
    ("桃園地", "台灣桃園地方法院"),
    ("台中地", "台灣台中地方法院"),
    ("台南地", "台灣台南地方法院"),
    ("高雄地", "台灣高雄地方法院"),
];

/// Fallback when no marker matches
const DEFAULT_COURT: &str = "最高法院";

/// Infer the court name from markers inside the case identifier
pub fn extract_court_from_case_id(case_id: &str) -> &'static str {
    COURT_MARKERS
        .iter()
        .find(|(marker, _)| case_id.contains(marker))
        .map(|(_, court)| *court)
        .unwrap_or(DEFAULT_COURT)
}

fn result_from_row(row: CaseRow, relevance_score: f32, method: SearchMethod) -> SearchResult {
    let court = extract_court_from_case_id(&row.case_id).to_string();
    SearchResult {
        title: row.case_id.clone(),
        case_id: row.case_id,
        case_topic: row.case_topic,
        case_date: row.case_date,
        summary: row.case_gist,
        court,
        relevance_score,
        search_method: method,
    }
}

/// Merge multiple strategies' result sets: concatenation order decides which
/// duplicate wins, then a stable descending sort by score, then truncation.
pub fn aggregate(result_sets: Vec<Vec<SearchResult>>, limit: usize) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique: Vec<SearchResult> = Vec::new();

    for result in result_sets.into_iter().flatten() {
        if seen.insert(result.case_id.clone()) {
            unique.push(result);
        }
    }

    unique.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    unique.truncate(limit);
    unique
}

/// Search service dispatching retrieval strategies against the store
pub struct SearchService {
    config: SearchConfig,
    store: Arc<StoreClient>,
    embedding: Arc<EmbeddingClient>,
}

impl SearchService {
    pub fn new(
        config: SearchConfig,
        store: Arc<StoreClient>,
        embedding: Arc<EmbeddingClient>,
    ) -> Self {
        Self {
            config,
            store,
            embedding,
        }
    }

    /// Keyword strategy: substring match, fixed relevance score
    pub async fn keyword_search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        match self.store.select_cases_matching(query, limit).await {
            Ok(rows) => rows
                .into_iter()
                .map(|row| result_from_row(row, self.config.keyword_score, SearchMethod::Keyword))
                .collect(),
            Err(e) => {
                tracing::error!("Error in keyword search: {}", e);
                Vec::new()
            }
        }
    }

    /// Semantic strategy: query embedding plus the store's similarity RPC.
    /// Disabled embedding backend means an empty result set, not an error.
    pub async fn semantic_search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        if !self.embedding.is_enabled() {
            tracing::warn!("Semantic search not available - embedding backend not configured");
            return Vec::new();
        }

        let query_embedding = match self.embedding.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::error!("Error generating query embedding: {}", e);
                return Vec::new();
            }
        };

        match self
            .store
            .match_cases(&query_embedding, self.config.similarity_threshold, limit)
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .map(|row| result_from_row(row.case, row.similarity, SearchMethod::Semantic))
                .collect(),
            Err(e) => {
                tracing::error!("Error in semantic search: {}", e);
                Vec::new()
            }
        }
    }

    /// Category strategy: membership join through the taxonomy tables
    pub async fn category_search(
        &self,
        category: &str,
        subcategory: Option<&str>,
        limit: usize,
    ) -> Vec<SearchResult> {
        match self
            .store
            .select_cases_in_category(category, subcategory, limit)
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .map(|row| result_from_row(row, self.config.category_score, SearchMethod::Category))
                .collect(),
            Err(e) => {
                tracing::error!("Error in category search: {}", e);
                Vec::new()
            }
        }
    }

    /// Hybrid composition: semantic and keyword halves run concurrently,
    /// each capped at limit/2, with the full limit re-applied after merging.
    pub async fn hybrid_search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let half = limit / 2;
        let (semantic, keyword) = tokio::join!(
            self.semantic_search(query, half),
            self.keyword_search(query, half)
        );
        aggregate(vec![semantic, keyword], limit)
    }

    async fn run_strategy(
        &self,
        method: &str,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Vec<SearchResult> {
        match method {
            "semantic" => self.semantic_search(query, limit).await,
            "keyword" => self.keyword_search(query, limit).await,
            "category" => match filters.category.as_deref() {
                Some(category) => {
                    self.category_search(category, filters.subcategory.as_deref(), limit)
                        .await
                }
                None => Vec::new(),
            },
            "hybrid" => self.hybrid_search(query, limit).await,
            other => {
                tracing::warn!("Unknown search method: {}", other);
                Vec::new()
            }
        }
    }

    /// Top-level entry point: run every requested strategy, merge once more
    /// over the full concatenation, and wrap in the response envelope.
    pub async fn search(
        &self,
        query: &str,
        search_methods: Option<&[String]>,
        filters: &SearchFilters,
        limit: usize,
    ) -> SearchResponse {
        let methods: Vec<String> = match search_methods {
            Some(methods) if !methods.is_empty() => methods.to_vec(),
            _ => vec!["hybrid".to_string()],
        };

        let timer = crate::utils::Timer::new();
        let mut result_sets = Vec::with_capacity(methods.len());
        for method in &methods {
            result_sets
                .push(self.run_strategy(method, query, filters, limit).await);
        }

        let results = aggregate(result_sets, limit);
        tracing::info!(
            "Search for '{}' via {:?} returned {} result(s) in {}ms",
            crate::utils::TextUtils::truncate(query, 40),
            methods,
            results.len(),
            timer.elapsed_ms()
        );

        SearchResponse {
            success: true,
            total_count: results.len(),
            results,
            query: query.to_string(),
            search_methods: methods,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
