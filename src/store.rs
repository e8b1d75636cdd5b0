//! # Store Client Module
//!
//! ## Purpose
//! Client for the hosted relational/vector store, spoken to over its
//! PostgREST surface: idempotent upserts, filtered selects, and the
//! `match_cases` similarity RPC.
//!
//! ## Input/Output Specification
//! - **Input**: Row batches for upsert, filter expressions, query embeddings
//! - **Output**: Typed rows (`CaseRow`, `MatchedCaseRow`)
//! - **Conflict resolution**: Upsert-by-identity; the last write for a given
//!   key wins, there is no client-side locking.
//!
//! ## Key Features
//! - Upsert with merge-duplicates resolution
//! - Keyword match over case topic and gist (ilike)
//! - Category membership resolved through the taxonomy tables
//! - Similarity search via the store's `match_cases` function

use crate::config::StoreConfig;
use crate::errors::{Result, SearchError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// A case row as stored in the `cases` table (embedding column omitted)
#[derive(Debug, Clone, Deserialize)]
pub struct CaseRow {
    pub case_id: String,
    pub case_topic: Option<String>,
    pub case_date: Option<String>,
    pub case_gist: Option<String>,
}

/// A case row returned by the similarity RPC, with its cosine similarity
#[derive(Debug, Clone, Deserialize)]
pub struct MatchedCaseRow {
    #[serde(flatten)]
    pub case: CaseRow,
    pub similarity: f32,
}

/// Row shape for the `categories` table
#[derive(Debug, Clone, Serialize)]
pub struct CategoryRow {
    pub category_id: i64,
    pub category_name: Option<String>,
}

/// Row shape for the `subcategories` table
#[derive(Debug, Clone, Serialize)]
pub struct SubcategoryRow {
    pub subcategory_id: String,
    pub subcategory_name: Option<String>,
    pub category_id: i64,
}

/// Row shape for the `case_keywords` table
#[derive(Debug, Clone, Serialize)]
pub struct KeywordRow {
    pub case_id: String,
    pub keyword: String,
}

/// Row shape for the `case_subcategory_mapping` table
#[derive(Debug, Clone, Serialize)]
pub struct CaseSubcategoryRow {
    pub case_id: String,
    pub subcategory_id: String,
}

#[derive(Deserialize)]
struct CategoryIdRow {
    category_id: i64,
}

#[derive(Deserialize)]
struct SubcategoryIdRow {
    subcategory_id: String,
}

#[derive(Deserialize)]
struct MappingCaseIdRow {
    case_id: String,
}

const CASE_COLUMNS: &str = "case_id,case_topic,case_date,case_gist";

/// Client for the hosted store's REST surface
pub struct StoreClient {
    config: StoreConfig,
    client: reqwest::Client,
}

impl StoreClient {
    /// Create a new store client
    pub fn new(config: StoreConfig) -> Result<Self> {
        if config.url.is_empty() || config.service_key.is_empty() {
            return Err(SearchError::Config {
                message: "store.url and store.service_key must be configured \
                          (SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY)"
                    .to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    /// Upsert rows into a table, merging on the table's identity columns.
    /// An empty batch is a no-op.
    pub async fn upsert<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "resolution=merge-duplicates")
            .json(rows)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Store {
                operation: format!("upsert {}", table),
                details: format!("status {}: {}", status, body),
            });
        }

        tracing::debug!("Upserted {} row(s) into {}", rows.len(), table);
        Ok(())
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
        operation: &str,
    ) -> Result<Vec<T>> {
        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Store {
                operation: operation.to_string(),
                details: format!("status {}", response.status()),
            });
        }

        Ok(response.json().await?)
    }

    /// Substring match over case topic and gist
    pub async fn select_cases_matching(&self, query: &str, limit: usize) -> Result<Vec<CaseRow>> {
        self.select(
            "cases",
            &[
                ("select", CASE_COLUMNS.to_string()),
                (
                    "or",
                    format!("(case_topic.ilike.*{q}*,case_gist.ilike.*{q}*)", q = query),
                ),
                ("limit", limit.to_string()),
            ],
            "keyword select",
        )
        .await
    }

    /// Similarity search through the store's `match_cases` function
    pub async fn match_cases(
        &self,
        query_embedding: &[f32],
        match_threshold: f32,
        match_count: usize,
    ) -> Result<Vec<MatchedCaseRow>> {
        let response = self
            .authorized(self.client.post(self.table_url("rpc/match_cases")))
            .json(&json!({
                "query_embedding": query_embedding,
                "match_threshold": match_threshold,
                "match_count": match_count,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Store {
                operation: "rpc match_cases".to_string(),
                details: format!("status {}", response.status()),
            });
        }

        Ok(response.json().await?)
    }

    /// Cases belonging to a category (optionally narrowed to a subcategory),
    /// joined through the subcategory and mapping tables.
    pub async fn select_cases_in_category(
        &self,
        category_name: &str,
        subcategory_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CaseRow>> {
        let categories: Vec<CategoryIdRow> = self
            .select(
                "categories",
                &[
                    ("select", "category_id".to_string()),
                    ("category_name", format!("eq.{}", category_name)),
                    ("limit", "1".to_string()),
                ],
                "category lookup",
            )
            .await?;

        let Some(category) = categories.into_iter().next() else {
            return Ok(Vec::new());
        };

        let mut params = vec![
            ("select", "subcategory_id".to_string()),
            ("category_id", format!("eq.{}", category.category_id)),
        ];
        if let Some(name) = subcategory_name {
            params.push(("subcategory_name", format!("eq.{}", name)));
        }
        let subcategories: Vec<SubcategoryIdRow> = self
            .select("subcategories", &params, "subcategory lookup")
            .await?;

        if subcategories.is_empty() {
            return Ok(Vec::new());
        }

        let subcategory_filter = in_filter(
            subcategories
                .iter()
                .map(|row| row.subcategory_id.as_str()),
        );
        let mappings: Vec<MappingCaseIdRow> = self
            .select(
                "case_subcategory_mapping",
                &[
                    ("select", "case_id".to_string()),
                    ("subcategory_id", subcategory_filter),
                ],
                "membership lookup",
            )
            .await?;

        if mappings.is_empty() {
            return Ok(Vec::new());
        }

        let case_filter = in_filter(mappings.iter().map(|row| row.case_id.as_str()));
        self.select(
            "cases",
            &[
                ("select", CASE_COLUMNS.to_string()),
                ("case_id", case_filter),
                ("limit", limit.to_string()),
            ],
            "category case select",
        )
        .await
    }
}

/// Build a PostgREST `in.(...)` filter with quoted values
fn in_filter<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = values.map(|v| format!("\"{}\"", v)).collect();
    format!("in.({})", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(url: String) -> StoreClient {
        StoreClient::new(StoreConfig {
            url,
            service_key: "service-key".to_string(),
            ..StoreConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn new_rejects_missing_credentials() {
        assert!(StoreClient::new(StoreConfig::default()).is_err());
    }

    #[test]
    fn in_filter_quotes_values() {
        assert_eq!(
            in_filter(["1-1", "1-2"].into_iter()),
            "in.(\"1-1\",\"1-2\")"
        );
    }

    #[tokio::test]
    async fn upsert_sends_merge_duplicates_preference() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/cases"))
            .and(header("Prefer", "resolution=merge-duplicates"))
            .and(header("apikey", "service-key"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let rows = vec![KeywordRow {
            case_id: "case-a".to_string(),
            keyword: "侵權".to_string(),
        }];
        client.upsert("cases", &rows).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_of_empty_batch_skips_the_request() {
        let client = test_client("http://127.0.0.1:9".to_string());
        let rows: Vec<KeywordRow> = Vec::new();
        client.upsert("case_keywords", &rows).await.unwrap();
    }

    #[tokio::test]
    async fn keyword_select_parses_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cases"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"case_id": "case-a", "case_topic": "損害賠償", "case_date": "1981-01-15", "case_gist": "要旨"}
            ])))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let rows = client.select_cases_matching("損害", 5).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].case_id, "case-a");
    }

    #[tokio::test]
    async fn match_cases_parses_similarity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/match_cases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"case_id": "case-a", "case_topic": null, "case_date": null,
                 "case_gist": "要旨", "similarity": 0.91}
            ])))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let rows = client.match_cases(&[0.1, 0.2], 0.7, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].similarity - 0.91).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn category_join_walks_the_membership_tables() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/categories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"category_id": 3}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/subcategories"))
            .and(query_param("category_id", "eq.3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"subcategory_id": "3-1"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/case_subcategory_mapping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"case_id": "case-a"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"case_id": "case-a", "case_topic": "契約", "case_date": null, "case_gist": null}
            ])))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let rows = client
            .select_cases_in_category("民事", None, 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].case_id, "case-a");
    }

    #[tokio::test]
    async fn unknown_category_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/categories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let rows = client
            .select_cases_in_category("不存在", None, 10)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn server_errors_surface_as_recoverable_store_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cases"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let err = client.select_cases_matching("q", 5).await.unwrap_err();
        assert!(err.is_recoverable());
    }
}
