//! # Judicial Crawler Module
//!
//! ## Purpose
//! Paced crawler for the judicial case-law website: walks paginated result
//! listings, follows every case link, and extracts raw case records from the
//! detail pages.
//!
//! ## Input/Output Specification
//! - **Input**: Listing start URL and crawler pacing configuration
//! - **Output**: `RawCaseRecord`s appended to a local JSON corpus file
//! - **Degradation**: A failed case page is logged and skipped; the crawl
//!   continues with the remaining cases and pages.
//!
//! ## Key Features
//! - Pluggable `CaseSource` trait so the pipeline can be tested offline
//! - Fixed inter-page and inter-case delays to stay polite to the host
//! - Load-extend-save persistence so interrupted crawls lose nothing

use crate::config::CrawlerConfig;
use crate::errors::{Result, SearchError};
use crate::RawCaseRecord;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// One page of listing results
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Absolute URLs of the case detail pages on this listing page
    pub case_urls: Vec<String>,
    /// Absolute URL of the next listing page, when one is linked
    pub next_page: Option<String>,
}

/// Outcome counters for one crawl run
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlStats {
    pub pages_visited: usize,
    pub cases_fetched: usize,
    pub cases_failed: usize,
    pub cases_saved: usize,
}

/// Source of case listings and case detail records
#[async_trait]
pub trait CaseSource: Send + Sync {
    async fn fetch_listing(&self, url: &str) -> Result<ListingPage>;
    async fn fetch_case(&self, url: &str) -> Result<RawCaseRecord>;
}

fn case_link_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a.hlTitle_scroll").expect("static selector parses"))
}

fn detail_row_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("div.int-table div.row").expect("static selector parses"))
}

fn header_cell_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("div.col-th").expect("static selector parses"))
}

fn value_cell_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("div.col-td").expect("static selector parses"))
}

fn anchor_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a").expect("static selector parses"))
}

fn cell_text(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn join_url(base: &str, href: &str) -> Result<String> {
    let base = reqwest::Url::parse(base).map_err(|e| SearchError::Crawl {
        url: base.to_string(),
        details: format!("invalid base URL: {}", e),
    })?;
    let joined = base.join(href).map_err(|e| SearchError::Crawl {
        url: href.to_string(),
        details: format!("invalid link: {}", e),
    })?;
    Ok(joined.to_string())
}

/// Parse a listing page: case links plus the 下一頁 pagination link
pub fn parse_listing(html: &str, page_url: &str) -> Result<ListingPage> {
    let document = Html::parse_document(html);
    let mut page = ListingPage::default();

    for link in document.select(case_link_selector()) {
        if let Some(href) = link.value().attr("href") {
            page.case_urls.push(join_url(page_url, href)?);
        }
    }

    for link in document.select(anchor_selector()) {
        if cell_text(link) == "下一頁" {
            if let Some(href) = link.value().attr("href") {
                page.next_page = Some(join_url(page_url, href)?);
                break;
            }
        }
    }

    Ok(page)
}

/// Parse a case detail page into a raw record.
///
/// The detail table is header/value rows; only the four headers the pipeline
/// cares about are captured, anything else on the page is ignored.
pub fn parse_case(html: &str) -> RawCaseRecord {
    let document = Html::parse_document(html);
    let mut record = RawCaseRecord::default();

    for row in document.select(detail_row_selector()) {
        let Some(header) = row.select(header_cell_selector()).next() else {
            continue;
        };
        let Some(value) = row.select(value_cell_selector()).next() else {
            continue;
        };

        let header = cell_text(header);
        let header = header.trim_end_matches(['：', ':']);
        let value = cell_text(value);
        if value.is_empty() {
            continue;
        }

        match header {
            "裁判字號" => record.case_id = Some(value),
            "案由摘要" => record.case_topic = Some(value),
            "裁判日期" => record.case_date = Some(value),
            "裁判要旨" => record.case_gist = Some(value),
            _ => {}
        }
    }

    record
}

/// HTTP-backed source scraping the judicial case-law website
pub struct JudicialSource {
    client: reqwest::Client,
}

impl JudicialSource {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::Crawl {
                url: url.to_string(),
                details: format!("server returned status {}", response.status()),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl CaseSource for JudicialSource {
    async fn fetch_listing(&self, url: &str) -> Result<ListingPage> {
        let html = self.fetch_html(url).await?;
        parse_listing(&html, url)
    }

    async fn fetch_case(&self, url: &str) -> Result<RawCaseRecord> {
        let html = self.fetch_html(url).await?;
        Ok(parse_case(&html))
    }
}

/// Crawl driver: pagination, pacing, and corpus persistence
pub struct Crawler<S: CaseSource> {
    source: S,
    config: CrawlerConfig,
}

impl<S: CaseSource> Crawler<S> {
    pub fn new(source: S, config: CrawlerConfig) -> Self {
        Self { source, config }
    }

    /// Crawl from the start URL, appending new records to the corpus file.
    /// `max_pages` bounds the run; `None` follows pagination to the end.
    pub async fn run(&self, start_url: &str, max_pages: Option<usize>) -> Result<CrawlStats> {
        let mut stats = CrawlStats::default();
        let mut corpus = load_corpus(&self.config.output_path)?;
        let mut known: HashSet<String> = corpus
            .iter()
            .filter_map(|record| record.case_id.clone())
            .collect();

        let mut next_url = Some(start_url.to_string());
        while let Some(url) = next_url {
            if let Some(max) = max_pages {
                if stats.pages_visited >= max {
                    break;
                }
            }

            tracing::info!("Fetching listing page: {}", url);
            let listing = self.source.fetch_listing(&url).await?;
            stats.pages_visited += 1;

            for case_url in &listing.case_urls {
                match self.source.fetch_case(case_url).await {
                    Ok(record) => {
                        stats.cases_fetched += 1;
                        let is_new = record
                            .case_id
                            .as_ref()
                            .map(|id| known.insert(id.clone()))
                            .unwrap_or(false);
                        if is_new {
                            corpus.push(record);
                            stats.cases_saved += 1;
                        }
                    }
                    Err(e) => {
                        stats.cases_failed += 1;
                        tracing::error!("Failed to fetch case {}: {}", case_url, e);
                    }
                }
                tokio::time::sleep(Duration::from_millis(self.config.case_delay_ms)).await;
            }

            // Persist after every page so an interrupted crawl keeps its work
            save_corpus(&self.config.output_path, &corpus)?;

            if listing.case_urls.is_empty() {
                tracing::info!("Listing page yielded no cases, stopping");
                break;
            }

            next_url = listing.next_page;
            if next_url.is_some() {
                tokio::time::sleep(Duration::from_millis(self.config.page_delay_ms)).await;
            }
        }

        tracing::info!(
            "Crawl finished: {} page(s), {} fetched, {} new, {} failed",
            stats.pages_visited,
            stats.cases_fetched,
            stats.cases_saved,
            stats.cases_failed
        );
        Ok(stats)
    }
}

/// Load the existing corpus file, or an empty corpus when none exists
pub fn load_corpus(path: impl AsRef<Path>) -> Result<Vec<RawCaseRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

/// Write the corpus file atomically enough for a single-writer crawler
pub fn save_corpus(path: impl AsRef<Path>, corpus: &[RawCaseRecord]) -> Result<()> {
    let serialized = serde_json::to_string_pretty(corpus)?;
    std::fs::write(path.as_ref(), serialized)?;
    Ok(())
}
