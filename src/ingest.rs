//! # Ingestion Pipeline Module
//!
//! ## Purpose
//! Loads the crawled case corpus and the merged taxonomy, normalizes and
//! embeds every case, and upserts the whole data model into the hosted
//! store: categories, subcategories, cases, keywords, and the
//! case-to-subcategory mapping.
//!
//! ## Input/Output Specification
//! - **Input**: Raw case JSON corpus plus the merged taxonomy file
//! - **Output**: Populated store tables and an `IngestStats` summary
//! - **Degradation**: A failing case is counted and skipped; one bad record
//!   never aborts the run.
//!
//! ## Key Features
//! - Taxonomy flattening into relational rows with a per-case association map
//! - Semaphore-bounded concurrent case processing
//! - Retry-wrapped upserts with idempotent merge-duplicates semantics

use crate::config::IngestionConfig;
use crate::crawler::load_corpus;
use crate::errors::Result;
use crate::normalize::CaseRecordNormalizer;
use crate::store::{CaseSubcategoryRow, CategoryRow, KeywordRow, StoreClient, SubcategoryRow};
use crate::taxonomy::{self, Category};
use crate::utils::{RetryPolicy, Timer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Keywords and subcategory memberships collected for one case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseAssociations {
    pub keywords: BTreeSet<String>,
    pub subcategory_ids: BTreeSet<String>,
}

/// Relational projection of the taxonomy tree
#[derive(Debug, Clone, Default)]
pub struct FlatTaxonomy {
    pub categories: Vec<CategoryRow>,
    pub subcategories: Vec<SubcategoryRow>,
    /// Case identifier to its keywords and subcategory memberships
    pub associations: BTreeMap<String, CaseAssociations>,
}

/// Outcome counters for one ingestion run
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStats {
    /// Records read from the corpus file
    pub processed: usize,
    /// Records upserted into the cases table
    pub stored: usize,
    /// Records skipped for missing identity
    pub skipped: usize,
    /// Records stored with a gist embedding
    pub embedded: usize,
    /// Records lost to store failures after retries
    pub upsert_failures: usize,
}

/// Flatten the taxonomy tree into store rows and per-case associations.
///
/// Categories and subcategories without an identifier carry no relational
/// identity and are left out, exactly as the merge step leaves them unkeyed.
pub fn flatten_taxonomy(categories: &[Category]) -> FlatTaxonomy {
    let mut flat = FlatTaxonomy::default();

    for category in categories {
        let Some(category_id) = category.category_id.filter(|id| *id != 0) else {
            continue;
        };
        flat.categories.push(CategoryRow {
            category_id,
            category_name: category.category_name.clone(),
        });

        for subcategory in &category.subcategories {
            let Some(subcategory_id) = subcategory
                .subcategory_id
                .as_deref()
                .filter(|id| !id.is_empty())
            else {
                continue;
            };
            flat.subcategories.push(SubcategoryRow {
                subcategory_id: subcategory_id.to_string(),
                subcategory_name: subcategory.subcategory_name.clone(),
                category_id,
            });

            for reference in &subcategory.related_case_id {
                for (case_id, keywords) in reference {
                    let entry = flat.associations.entry(case_id.clone()).or_default();
                    entry.keywords.extend(keywords.iter().cloned());
                    entry.subcategory_ids.insert(subcategory_id.to_string());
                }
            }
        }
    }

    flat
}

/// Split a large corpus file into numbered chunks, `jcases_<n>.json`
pub fn split_case_file(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    chunk_size: usize,
) -> Result<Vec<std::path::PathBuf>> {
    let corpus = load_corpus(input)?;
    let out_dir = out_dir.as_ref();
    std::fs::create_dir_all(out_dir)?;

    let mut written = Vec::new();
    for (index, chunk) in corpus.chunks(chunk_size.max(1)).enumerate() {
        let path = out_dir.join(format!("jcases_{}.json", index + 1));
        std::fs::write(&path, serde_json::to_string_pretty(chunk)?)?;
        written.push(path);
    }

    tracing::info!(
        "Split {} record(s) into {} file(s)",
        corpus.len(),
        written.len()
    );
    Ok(written)
}

/// Ingestion pipeline wiring the corpus, normalizer, and store together
pub struct IngestPipeline {
    config: IngestionConfig,
    store: Arc<StoreClient>,
    normalizer: Arc<CaseRecordNormalizer>,
    retry: RetryPolicy,
}

impl IngestPipeline {
    pub fn new(
        config: IngestionConfig,
        store: Arc<StoreClient>,
        normalizer: Arc<CaseRecordNormalizer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            config,
            store,
            normalizer,
            retry,
        }
    }

    /// Run the full ingestion: taxonomy first, then every case concurrently
    pub async fn run(&self) -> Result<IngestStats> {
        let timer = Timer::new();

        let taxonomy = taxonomy::load_taxonomy(&self.config.taxonomy_path)?;
        let flat = flatten_taxonomy(&taxonomy);
        self.upsert_taxonomy(&flat).await?;

        let corpus = load_corpus(&self.config.cases_path)?;
        tracing::info!(
            "Ingesting {} case(s) from {}",
            corpus.len(),
            self.config.cases_path.display()
        );

        let flat = Arc::new(flat);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_cases));
        let mut handles = Vec::with_capacity(corpus.len());

        for raw in corpus {
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                crate::internal_error!("ingestion semaphore closed: {}", e)
            })?;
            let store = self.store.clone();
            let normalizer = self.normalizer.clone();
            let retry = self.retry;
            let flat = flat.clone();

            handles.push(tokio::spawn(async move {
                let outcome = ingest_one(&store, &normalizer, &retry, &flat, &raw).await;
                drop(permit);
                outcome
            }));
        }

        let mut stats = IngestStats::default();
        for handle in handles {
            stats.processed += 1;
            match handle.await {
                Ok(CaseOutcome::Stored { embedded }) => {
                    stats.stored += 1;
                    if embedded {
                        stats.embedded += 1;
                    }
                }
                Ok(CaseOutcome::Skipped) => stats.skipped += 1,
                Ok(CaseOutcome::Failed) => stats.upsert_failures += 1,
                Err(e) => {
                    stats.upsert_failures += 1;
                    tracing::error!("Ingestion task panicked: {}", e);
                }
            }
        }

        tracing::info!(
            "Ingestion finished in {}ms: {} stored ({} embedded), {} skipped, {} failed",
            timer.elapsed_ms(),
            stats.stored,
            stats.embedded,
            stats.skipped,
            stats.upsert_failures
        );
        Ok(stats)
    }

    async fn upsert_taxonomy(&self, flat: &FlatTaxonomy) -> Result<()> {
        tracing::info!(
            "Upserting {} categories and {} subcategories",
            flat.categories.len(),
            flat.subcategories.len()
        );
        self.retry
            .run("upsert categories", || {
                self.store.upsert("categories", &flat.categories)
            })
            .await?;
        self.retry
            .run("upsert subcategories", || {
                self.store.upsert("subcategories", &flat.subcategories)
            })
            .await?;
        Ok(())
    }
}

enum CaseOutcome {
    Stored { embedded: bool },
    Skipped,
    Failed,
}

async fn ingest_one(
    store: &StoreClient,
    normalizer: &CaseRecordNormalizer,
    retry: &RetryPolicy,
    flat: &FlatTaxonomy,
    raw: &crate::RawCaseRecord,
) -> CaseOutcome {
    let record = match normalizer.normalize(raw).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!("Skipping case: {}", e);
            return CaseOutcome::Skipped;
        }
    };
    let embedded = record.case_gist_embedding.is_some();

    let rows = [record.clone()];
    if let Err(e) = retry
        .run("upsert case", || store.upsert("cases", &rows))
        .await
    {
        tracing::error!("Failed to store case {}: {}", record.case_id, e);
        return CaseOutcome::Failed;
    }

    if let Some(associations) = flat.associations.get(&record.case_id) {
        let keywords: Vec<KeywordRow> = associations
            .keywords
            .iter()
            .map(|keyword| KeywordRow {
                case_id: record.case_id.clone(),
                keyword: keyword.clone(),
            })
            .collect();
        let mappings: Vec<CaseSubcategoryRow> = associations
            .subcategory_ids
            .iter()
            .map(|subcategory_id| CaseSubcategoryRow {
                case_id: record.case_id.clone(),
                subcategory_id: subcategory_id.clone(),
            })
            .collect();

        if let Err(e) = retry
            .run("upsert case keywords", || {
                store.upsert("case_keywords", &keywords)
            })
            .await
        {
            tracing::error!("Failed to store keywords for {}: {}", record.case_id, e);
            return CaseOutcome::Failed;
        }
        if let Err(e) = retry
            .run("upsert case mappings", || {
                store.upsert("case_subcategory_mapping", &mappings)
            })
            .await
        {
            tracing::error!("Failed to store mappings for {}: {}", record.case_id, e);
            return CaseOutcome::Failed;
        }
    }

    CaseOutcome::Stored { embedded }
}
