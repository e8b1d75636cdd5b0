//! # Taxonomy Module
//!
//! ## Purpose
//! Models the two-level legal-topic taxonomy (categories → subcategories →
//! related-case lists) and implements the identity-keyed merge used to fold
//! a freshly crawled taxonomy shard into an existing dataset.
//!
//! ## Input/Output Specification
//! - **Input**: Two taxonomy datasets (arrays of categories) from JSON files
//! - **Output**: One merged dataset, deterministically sorted
//! - **Identity**: `category_id` for categories, `subcategory_id` for subcategories
//!
//! ## Key Features
//! - Pure merge: inputs are never mutated, the result is freshly built
//! - Tolerant of missing ids: entries without identity are carried or skipped,
//!   never a reason to abort the batch
//! - Deterministic ordering by category id and the two-integer subcategory key

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// One case's association with a subcategory: case_id → justifying keywords
pub type CaseReference = BTreeMap<String, Vec<String>>;

/// A subcategory within a legal-topic category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcategory {
    /// Identity key, formatted "<major>-<minor>"
    #[serde(default)]
    pub subcategory_id: Option<String>,
    #[serde(default)]
    pub subcategory_name: Option<String>,
    /// Cases tagged with this subcategory
    #[serde(default)]
    pub related_case_id: Vec<CaseReference>,
}

/// A top-level legal-topic category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Identity key; absent or zero counts as missing
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

fn present_category_id(id: Option<i64>) -> Option<i64> {
    id.filter(|&id| id != 0)
}

fn present_subcategory_id(id: Option<&String>) -> Option<&str> {
    id.map(String::as_str).filter(|id| !id.is_empty())
}

/// Two-level sort key parsed from a subcategory id.
///
/// A missing or malformed id degrades to `(0, 0)` with a warning so one bad
/// entry never rejects the whole batch.
pub fn subcategory_sort_key(id: Option<&str>) -> (i64, i64) {
    let Some(id) = id else {
        return (0, 0);
    };

    let mut parts = id.split('-');
    match (
        parts.next().and_then(|p| p.trim().parse::<i64>().ok()),
        parts.next().and_then(|p| p.trim().parse::<i64>().ok()),
    ) {
        (Some(major), Some(minor)) if parts.next().is_none() => (major, minor),
        _ => {
            tracing::warn!("Malformed subcategory_id '{}', sorting with default key", id);
            (0, 0)
        }
    }
}

/// Merge `source` into a copy of `base`.
///
/// Categories and subcategories are matched by identity; matched
/// subcategories have their related-case lists extended, unmatched entries
/// are appended whole. Newly appended categories are registered in the
/// identity index so later `source` entries merge against them as well.
/// Source entries without identity are skipped; base entries without
/// identity stay in the output untouched. On duplicate ids within one input
/// the last occurrence wins the index slot.
///
/// The result is sorted ascending by `category_id` (missing id sorts as 0)
/// and, within each category, by the two-integer subcategory key.
pub fn merge(source: &[Category], base: &[Category]) -> Vec<Category> {
    let mut merged: Vec<Category> = base.to_vec();

    let mut index: HashMap<i64, usize> = merged
        .iter()
        .enumerate()
        .filter_map(|(pos, cat)| cat.category_id.map(|id| (id, pos)))
        .collect();

    for category in source {
        let Some(cat_id) = present_category_id(category.category_id) else {
            continue;
        };

        if let Some(&pos) = index.get(&cat_id) {
            merge_subcategories(&mut merged[pos], &category.subcategories);
        } else {
            index.insert(cat_id, merged.len());
            merged.push(category.clone());
        }
    }

    merged.sort_by_key(|cat| cat.category_id.unwrap_or(0));
    for category in &mut merged {
        if !category.subcategories.is_empty() {
            category
                .subcategories
                .sort_by_key(|sub| subcategory_sort_key(sub.subcategory_id.as_deref()));
        }
    }

    merged
}

fn merge_subcategories(existing: &mut Category, incoming: &[Subcategory]) {
    let sub_index: HashMap<String, usize> = existing
        .subcategories
        .iter()
        .enumerate()
        .filter_map(|(pos, sub)| {
            present_subcategory_id(sub.subcategory_id.as_ref()).map(|id| (id.to_string(), pos))
        })
        .collect();

    for subcategory in incoming {
        let Some(sub_id) = present_subcategory_id(subcategory.subcategory_id.as_ref()) else {
            continue;
        };

        if let Some(&pos) = sub_index.get(sub_id) {
            existing.subcategories[pos]
                .related_case_id
                .extend(subcategory.related_case_id.iter().cloned());
        } else {
            existing.subcategories.push(subcategory.clone());
        }
    }
}

/// Extract the category/subcategory skeleton: ids and names only, with all
/// related-case lists dropped. Used to publish the taxonomy shape without
/// the case membership data.
pub fn extract_skeleton(categories: &[Category]) -> Vec<Category> {
    categories
        .iter()
        .map(|category| Category {
            category_id: category.category_id,
            category_name: category.category_name.clone(),
            subcategories: category
                .subcategories
                .iter()
                .map(|sub| Subcategory {
                    subcategory_id: sub.subcategory_id.clone(),
                    subcategory_name: sub.subcategory_name.clone(),
                    related_case_id: Vec::new(),
                })
                .collect(),
        })
        .collect()
}

/// Load a taxonomy file (JSON array of categories)
pub fn load_taxonomy<P: AsRef<Path>>(path: P) -> Result<Vec<Category>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Save a taxonomy to a JSON file, pretty-printed
pub fn save_taxonomy<P: AsRef<Path>>(path: P, categories: &[Category]) -> Result<()> {
    let content = serde_json::to_string_pretty(categories)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case_ref(case_id: &str, keywords: &[&str]) -> CaseReference {
        let mut reference = CaseReference::new();
        reference.insert(
            case_id.to_string(),
            keywords.iter().map(|k| k.to_string()).collect(),
        );
        reference
    }

    fn subcategory(id: &str, cases: Vec<CaseReference>) -> Subcategory {
        Subcategory {
            subcategory_id: Some(id.to_string()),
            subcategory_name: Some(format!("sub {}", id)),
            related_case_id: cases,
        }
    }

    fn category(id: i64, subs: Vec<Subcategory>) -> Category {
        Category {
            category_id: Some(id),
            category_name: Some(format!("cat {}", id)),
            subcategories: subs,
        }
    }

    #[test]
    fn merge_extends_matching_subcategory_case_lists() {
        let base = vec![category(
            1,
            vec![subcategory("1-1", vec![case_ref("case-a", &["侵權"])])],
        )];
        let source = vec![category(
            1,
            vec![subcategory("1-1", vec![case_ref("case-b", &["損害賠償"])])],
        )];

        let merged = merge(&source, &base);

        assert_eq!(merged.len(), 1);
        let cases = &merged[0].subcategories[0].related_case_id;
        assert_eq!(cases.len(), 2);
        assert!(cases[0].contains_key("case-a"));
        assert!(cases[1].contains_key("case-b"));
    }

    #[test]
    fn merge_appends_new_categories_and_subcategories() {
        let base = vec![category(1, vec![subcategory("1-1", vec![])])];
        let source = vec![
            category(1, vec![subcategory("1-2", vec![])]),
            category(2, vec![subcategory("2-1", vec![])]),
        ];

        let merged = merge(&source, &base);

        assert_eq!(merged.len(), 2);
        let ids: Vec<_> = merged[0]
            .subcategories
            .iter()
            .map(|s| s.subcategory_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["1-1", "1-2"]);
        assert_eq!(merged[1].category_id, Some(2));
    }

    #[test]
    fn merge_contains_every_id_from_either_input() {
        let base = vec![category(3, vec![]), category(1, vec![subcategory("1-5", vec![])])];
        let source = vec![category(2, vec![]), category(1, vec![subcategory("1-2", vec![])])];

        let merged = merge(&source, &base);

        let cat_ids: Vec<_> = merged.iter().map(|c| c.category_id.unwrap()).collect();
        assert_eq!(cat_ids, vec![1, 2, 3]);
        let sub_ids: Vec<_> = merged[0]
            .subcategories
            .iter()
            .map(|s| s.subcategory_id.clone().unwrap())
            .collect();
        assert_eq!(sub_ids, vec!["1-2", "1-5"]);
    }

    #[test]
    fn later_source_categories_merge_against_freshly_appended_ones() {
        let base = vec![];
        let source = vec![
            category(5, vec![subcategory("5-1", vec![case_ref("case-a", &[])])]),
            category(5, vec![subcategory("5-1", vec![case_ref("case-b", &[])])]),
        ];

        let merged = merge(&source, &base);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].subcategories[0].related_case_id.len(), 2);
    }

    #[test]
    fn merge_with_empty_source_is_identity_up_to_sorting() {
        let base = vec![
            category(2, vec![subcategory("2-10", vec![]), subcategory("2-2", vec![])]),
            category(1, vec![]),
        ];

        let merged = merge(&[], &base);

        assert_eq!(merged[0].category_id, Some(1));
        assert_eq!(merged[1].category_id, Some(2));
        let sub_ids: Vec<_> = merged[1]
            .subcategories
            .iter()
            .map(|s| s.subcategory_id.clone().unwrap())
            .collect();
        assert_eq!(sub_ids, vec!["2-2", "2-10"]);
    }

    #[test]
    fn source_entries_without_identity_are_skipped() {
        let base = vec![category(1, vec![])];
        let source = vec![
            Category {
                category_id: None,
                category_name: Some("orphan".to_string()),
                subcategories: vec![],
            },
            Category {
                category_id: Some(0),
                category_name: Some("zero".to_string()),
                subcategories: vec![],
            },
        ];

        let merged = merge(&source, &base);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn base_entries_without_identity_stay_in_the_output() {
        let base = vec![Category {
            category_id: None,
            category_name: Some("unlabeled".to_string()),
            subcategories: vec![],
        }];

        let merged = merge(&[], &base);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].category_name.as_deref(), Some("unlabeled"));
    }

    #[test]
    fn sort_key_orders_by_major_then_minor() {
        assert!(subcategory_sort_key(Some("2-10")) > subcategory_sort_key(Some("2-2")));
        assert!(subcategory_sort_key(Some("10-1")) > subcategory_sort_key(Some("2-99")));
    }

    #[test]
    fn malformed_sort_keys_degrade_to_default() {
        assert_eq!(subcategory_sort_key(Some("not-an-id")), (0, 0));
        assert_eq!(subcategory_sort_key(Some("3")), (0, 0));
        assert_eq!(subcategory_sort_key(Some("1-2-3")), (0, 0));
        assert_eq!(subcategory_sort_key(None), (0, 0));
    }

    #[test]
    fn skeleton_drops_related_cases_but_keeps_names() {
        let data = vec![category(
            1,
            vec![subcategory("1-1", vec![case_ref("case-a", &["keyword"])])],
        )];

        let skeleton = extract_skeleton(&data);

        assert_eq!(skeleton[0].category_name.as_deref(), Some("cat 1"));
        assert!(skeleton[0].subcategories[0].related_case_id.is_empty());
        assert_eq!(
            skeleton[0].subcategories[0].subcategory_name.as_deref(),
            Some("sub 1-1")
        );
    }
}
