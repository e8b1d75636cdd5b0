//! # Case Record Normalization Module
//!
//! ## Purpose
//! Converts raw scraped case records into normalized records ready for
//! storage: Minguo-calendar dates become ISO-8601, and the case gist is
//! embedded through the external backend.
//!
//! ## Input/Output Specification
//! - **Input**: `RawCaseRecord` with free-text header fields
//! - **Output**: `CaseRecord` keyed by `case_id`, with converted date and
//!   optional gist embedding
//! - **Degradation**: A failed embedding never fails normalization; only a
//!   missing `case_id` does.

use crate::embedding::EmbeddingClient;
use crate::errors::{Result, SearchError};
use crate::utils::RetryPolicy;
use crate::{CaseRecord, RawCaseRecord};
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Matches "民國 {Y} 年 {M} 月 {D} 日", whitespace-tolerant
const MINGUO_DATE_PATTERN: &str = r"民國\s*(\d+)\s*年\s*(\d+)\s*月\s*(\d+)\s*日";

fn minguo_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MINGUO_DATE_PATTERN).expect("static pattern compiles"))
}

/// Convert a Minguo-calendar date string to ISO-8601.
///
/// Strings that do not match the Minguo pattern pass through unchanged,
/// since some sources already carry standard dates. A string that matches
/// the pattern but names an impossible calendar date yields `None`.
pub fn convert_chinese_date(input: &str) -> Option<String> {
    if input.trim().is_empty() {
        return None;
    }

    let Some(captures) = minguo_date_regex().captures(input) else {
        return Some(input.to_string());
    };

    // The pattern guarantees digit groups; range, not format, can still fail
    let minguo_year: i32 = captures[1].parse().ok()?;
    let month: u32 = captures[2].parse().ok()?;
    let day: u32 = captures[3].parse().ok()?;

    let gregorian_year = minguo_year + 1911;
    match chrono::NaiveDate::from_ymd_opt(gregorian_year, month, day) {
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None => {
            tracing::warn!(
                "Invalid date values: {}-{}-{}",
                gregorian_year,
                month,
                day
            );
            None
        }
    }
}

/// Normalizes raw case records for upsert into the store
pub struct CaseRecordNormalizer {
    embedding: Arc<EmbeddingClient>,
    retry: RetryPolicy,
}

impl CaseRecordNormalizer {
    pub fn new(embedding: Arc<EmbeddingClient>, retry: RetryPolicy) -> Self {
        Self { embedding, retry }
    }

    /// Normalize one raw record.
    ///
    /// Fails only when `case_id` is missing; embedding failures degrade the
    /// record to a null embedding after the bounded retry is exhausted.
    pub async fn normalize(&self, raw: &RawCaseRecord) -> Result<CaseRecord> {
        let case_id = raw
            .case_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SearchError::ValidationFailed {
                field: "case_id".to_string(),
                reason: "record has no case identifier".to_string(),
            })?;

        let case_date = raw.case_date.as_deref().and_then(convert_chinese_date);
        let case_gist = raw.case_gist.clone();
        let case_gist_embedding = self.embed_gist(case_id, case_gist.as_deref()).await;

        Ok(CaseRecord {
            case_id: case_id.to_string(),
            case_topic: raw.case_topic.clone(),
            case_date,
            case_gist,
            case_gist_embedding,
        })
    }

    async fn embed_gist(&self, case_id: &str, gist: Option<&str>) -> Option<Vec<f32>> {
        let gist = gist.map(str::trim).filter(|g| !g.is_empty())?;
        if !self.embedding.is_enabled() {
            return None;
        }

        match self
            .retry
            .run("generate gist embedding", || self.embedding.embed(gist))
            .await
        {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::error!("Embedding failed for case {}: {}", case_id, e);
                None
            }
        }
    }
}
