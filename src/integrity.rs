//! Independent referential-integrity audit of generated references.
//!
//! Re-derives candidate reference columns straight from the raw data instead
//! of trusting the detector's relationship records, so generator mistakes are
//! caught rather than propagated. Shares the parent-location heuristics with
//! the detector through `resolver`, but nothing else.

use std::collections::BTreeSet;

use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    metadata::{DataSet, MetadataFile},
    resolver,
};

/// Match-percentage cutoffs separating the classifications. The 100/80 split
/// is a tuned policy balancing false alarms against missed FK errors, not a
/// platform contract; it is a named input so callers can adjust it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntegrityThresholds {
    /// At or above this percentage (but below 100) a column is BROKEN;
    /// below it, FALSE_POSITIVE.
    pub broken_floor_pct: f64,
}

impl Default for IntegrityThresholds {
    fn default() -> Self {
        IntegrityThresholds {
            broken_floor_pct: 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityClass {
    #[serde(rename = "VALID")]
    Valid,
    #[serde(rename = "FALSE_POSITIVE")]
    FalsePositive,
    #[serde(rename = "MISSING_PARENT")]
    MissingParent,
    #[serde(rename = "BROKEN")]
    Broken,
}

/// One audited candidate reference column. Purely diagnostic: findings never
/// mutate form definitions or relationship records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedLovReference {
    pub child_form: String,
    pub column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_form: Option<String>,
    pub child_values: Vec<String>,
    pub parent_values: Vec<String>,
    pub missing_values: Vec<String>,
    pub match_pct: f64,
    pub classification: IntegrityClass,
    pub recommendation: String,
}

/// Pure classification of a child column's distinct values against a
/// candidate parent's distinct key values.
pub fn classify_overlap(
    child_values: &BTreeSet<String>,
    parent_values: &BTreeSet<String>,
    thresholds: &IntegrityThresholds,
) -> (f64, Vec<String>, IntegrityClass) {
    let missing: Vec<String> = child_values
        .iter()
        .filter(|v| !parent_values.contains(*v))
        .cloned()
        .collect();
    let total = child_values.len();
    let matched = total - missing.len();
    let pct = if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64 * 100.0
    };
    let class = if total > 0 && missing.is_empty() {
        IntegrityClass::Valid
    } else if pct >= thresholds.broken_floor_pct {
        IntegrityClass::Broken
    } else {
        IntegrityClass::FalsePositive
    };
    (pct, missing, class)
}

fn recommendation_for(class: IntegrityClass) -> String {
    match class {
        IntegrityClass::Valid => "all values resolve against the parent key".to_string(),
        IntegrityClass::Broken => {
            "partial match; likely a data-entry mismatch, fix the data".to_string()
        }
        IntegrityClass::FalsePositive => {
            "column is not a foreign key; convert the generated reference field back to plain text"
                .to_string()
        }
        IntegrityClass::MissingParent => {
            "likely false positive; this is descriptive text, not a key".to_string()
        }
    }
}

/// Audits every candidate reference column across the scanned file set.
pub fn audit(
    files: &[MetadataFile],
    delimiter: Option<u8>,
    thresholds: &IntegrityThresholds,
) -> Result<Vec<NestedLovReference>> {
    let stems: Vec<String> = files.iter().map(|f| f.stem.clone()).collect();
    let mut findings = Vec::new();
    for file in files {
        let data = DataSet::load(&file.path, delimiter)?;
        for column in &file.columns {
            if !resolver::is_reference_candidate(column) {
                continue;
            }
            let child_values = data.distinct_non_empty(column).unwrap_or_default();
            if child_values.is_empty() {
                debug!(
                    "Column '{}' in '{}' has no values to audit; skipping",
                    column, file.stem
                );
                continue;
            }
            findings.push(audit_column(
                file, column, &child_values, files, &stems, delimiter, thresholds,
            )?);
        }
    }
    info!("Audited {} candidate reference column(s)", findings.len());
    Ok(findings)
}

fn audit_column(
    file: &MetadataFile,
    column: &str,
    child_values: &BTreeSet<String>,
    files: &[MetadataFile],
    stems: &[String],
    delimiter: Option<u8>,
    thresholds: &IntegrityThresholds,
) -> Result<NestedLovReference> {
    let target = resolver::strip_reference_marker(column);
    let others: Vec<String> = stems.iter().filter(|s| *s != &file.stem).cloned().collect();
    let Some(resolved) = resolver::resolve_name(target, &others) else {
        return Ok(NestedLovReference {
            child_form: file.stem.clone(),
            column: column.to_string(),
            parent_form: None,
            child_values: child_values.iter().cloned().collect(),
            parent_values: Vec::new(),
            missing_values: child_values.iter().cloned().collect(),
            match_pct: 0.0,
            classification: IntegrityClass::MissingParent,
            recommendation: recommendation_for(IntegrityClass::MissingParent),
        });
    };

    let parent_file = files.iter().find(|f| f.stem == resolved.stem);
    let parent_values = match parent_file {
        Some(parent) => {
            let parent_data = DataSet::load(&parent.path, delimiter)?;
            let key_column = if parent_data.column_index("code").is_some() {
                "code".to_string()
            } else {
                parent.primary_key.clone()
            };
            parent_data.distinct_non_empty(&key_column).unwrap_or_default()
        }
        None => BTreeSet::new(),
    };

    let (pct, missing, class) = classify_overlap(child_values, &parent_values, thresholds);
    Ok(NestedLovReference {
        child_form: file.stem.clone(),
        column: column.to_string(),
        parent_form: Some(resolved.stem),
        child_values: child_values.iter().cloned().collect(),
        parent_values: parent_values.into_iter().collect(),
        missing_values: missing,
        match_pct: pct,
        classification: class,
        recommendation: recommendation_for(class),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn full_overlap_is_valid() {
        let thresholds = IntegrityThresholds::default();
        let (pct, missing, class) = classify_overlap(
            &set(&["A", "B"]),
            &set(&["A", "B", "C"]),
            &thresholds,
        );
        assert_eq!(pct, 100.0);
        assert!(missing.is_empty());
        assert_eq!(class, IntegrityClass::Valid);
    }

    #[test]
    fn partial_overlap_above_floor_is_broken() {
        let thresholds = IntegrityThresholds::default();
        let child = set(&["A", "B", "C", "D", "E"]);
        let parent = set(&["A", "B", "C", "D"]);
        let (pct, missing, class) = classify_overlap(&child, &parent, &thresholds);
        assert_eq!(pct, 80.0);
        assert_eq!(missing, vec!["E".to_string()]);
        assert_eq!(class, IntegrityClass::Broken);
    }

    #[test]
    fn zero_overlap_is_false_positive() {
        let thresholds = IntegrityThresholds::default();
        let (pct, _, class) =
            classify_overlap(&set(&["Loamy soil", "Sandy soil"]), &set(&["A"]), &thresholds);
        assert_eq!(pct, 0.0);
        assert_eq!(class, IntegrityClass::FalsePositive);
    }

    #[test]
    fn thresholds_are_tunable() {
        let strict = IntegrityThresholds {
            broken_floor_pct: 50.0,
        };
        let child = set(&["A", "B", "C", "D"]);
        let parent = set(&["A", "B"]);
        let (pct, _, class) = classify_overlap(&child, &parent, &strict);
        assert_eq!(pct, 50.0);
        assert_eq!(class, IntegrityClass::Broken);
    }
}
