//! Parent/child relationship detection and the persisted snapshot.
//!
//! Two independent passes over the scanned file set: an explicit pass driven
//! by reference-suffix columns present in the raw data (Pattern 1), and an
//! injected pass driven by the external category mapping (Pattern 2). Their
//! results are concatenated; a file declared in the mapping never also emits
//! an explicit relationship, because injected detection wins per-file.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{io_utils, mapping::CategoryMapping, metadata::MetadataFile, resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    ExplicitReference,
    InjectedReference,
}

/// One parent→child edge. Recomputed on every detection pass and persisted
/// as a JSON snapshot so deployment can run without re-scanning all files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipInfo {
    pub pattern_type: PatternKind,
    pub parent_form: String,
    pub parent_csv: String,
    pub parent_primary_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_code_value: Option<String>,
    pub child_form: String,
    pub child_csv: String,
    /// Reference column name in the generated form; for injected
    /// relationships it does not exist in the source file.
    pub child_foreign_key: String,
    pub relationship_type: String,
    pub needs_fk_injection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fk_value_to_inject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Reporting-only grouping of one parent and its children sharing a pattern.
/// Never used for execution ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    pub name: String,
    pub pattern_type: PatternKind,
    pub parent_form: String,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub relationships: Vec<RelationshipInfo>,
}

impl RelationshipSnapshot {
    pub fn new(relationships: Vec<RelationshipInfo>) -> Self {
        RelationshipSnapshot {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            relationships,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io_utils::write_json_pretty(path, self)
            .with_context(|| format!("Writing relationship snapshot to {path:?}"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        io_utils::read_json(path)
            .with_context(|| format!("Loading relationship snapshot from {path:?}"))
    }

    /// Injected relationship for a given child form, if any.
    pub fn injected_for(&self, child_form: &str) -> Option<&RelationshipInfo> {
        self.relationships
            .iter()
            .find(|r| r.needs_fk_injection && r.child_form == child_form)
    }
}

const RELATIONSHIP_TYPE: &str = "one_to_many";

/// Runs both detection passes and concatenates their edges.
pub fn detect_relationships(
    files: &[MetadataFile],
    mapping: &CategoryMapping,
) -> Vec<RelationshipInfo> {
    if mapping.is_empty() {
        debug!("Category mapping is empty; only explicit-reference detection can fire");
    }
    let stems: Vec<String> = files.iter().map(|f| f.stem.clone()).collect();
    let mut relationships = detect_explicit(files, mapping, &stems);
    relationships.extend(detect_injected(files, mapping));
    info!("Detected {} relationship(s)", relationships.len());
    relationships
}

fn find_file<'a>(files: &'a [MetadataFile], stem: &str) -> Option<&'a MetadataFile> {
    files.iter().find(|f| f.stem == stem)
}

fn csv_name(stem: &str) -> String {
    format!("{stem}.csv")
}

fn detect_explicit(
    files: &[MetadataFile],
    mapping: &CategoryMapping,
    stems: &[String],
) -> Vec<RelationshipInfo> {
    let mut relationships = Vec::new();
    for file in files {
        if mapping.parent_of(&file.stem).is_some() {
            // Injected detection wins for this child; any explicit column is
            // masked and reported on the injected edge instead.
            continue;
        }
        for column in &file.columns {
            if column == &file.primary_key || !resolver::is_reference_candidate(column) {
                continue;
            }
            let target = resolver::strip_reference_marker(column);
            let others: Vec<String> = stems
                .iter()
                .filter(|s| *s != &file.stem)
                .cloned()
                .collect();
            let Some(resolved) = resolver::resolve_name(target, &others) else {
                warn!(
                    "No parent file found for reference column '{}' in '{}'",
                    column, file.stem
                );
                continue;
            };
            let parent_pk = find_file(files, &resolved.stem)
                .map(|f| f.primary_key.clone())
                .unwrap_or_else(|| "code".to_string());
            relationships.push(RelationshipInfo {
                pattern_type: PatternKind::ExplicitReference,
                parent_form: resolved.stem.clone(),
                parent_csv: csv_name(&resolved.stem),
                parent_primary_key: parent_pk,
                parent_code_value: None,
                child_form: file.stem.clone(),
                child_csv: csv_name(&file.stem),
                child_foreign_key: column.clone(),
                relationship_type: RELATIONSHIP_TYPE.to_string(),
                needs_fk_injection: false,
                fk_value_to_inject: None,
                notes: Some(format!(
                    "column '{}' resolved to '{}' ({:?})",
                    column, resolved.stem, resolved.confidence
                )),
            });
        }
    }
    relationships
}

fn detect_injected(files: &[MetadataFile], mapping: &CategoryMapping) -> Vec<RelationshipInfo> {
    let mut relationships = Vec::new();
    for (parent, children) in &mapping.parents {
        let Some(parent_file) = find_file(files, parent) else {
            warn!("Mapping parent '{parent}' not found among scanned files; skipping its children");
            continue;
        };
        for (value, child) in children {
            let Some(child_file) = find_file(files, child) else {
                warn!(
                    "Mapping child '{child}' (parent '{parent}', value '{value}') not found; skipping"
                );
                continue;
            };
            let fk_name = resolver::derive_fk_name(parent);
            let mut notes = format!("declared in category mapping under '{parent}'");
            if child_file.columns.iter().any(|c| c == &fk_name) {
                // Anomaly: augmentation will no-op rather than double-insert.
                notes.push_str(&format!("; child already contains '{fk_name}'"));
            }
            if let Some(masked) = child_file
                .columns
                .iter()
                .find(|c| resolver::is_reference_candidate(c))
            {
                warn!(
                    "Injected mapping for '{child}' masks explicit reference column '{masked}'"
                );
                notes.push_str(&format!("; masks explicit column '{masked}'"));
            }
            relationships.push(RelationshipInfo {
                pattern_type: PatternKind::InjectedReference,
                parent_form: parent.clone(),
                parent_csv: csv_name(parent),
                parent_primary_key: parent_file.primary_key.clone(),
                parent_code_value: Some(value.clone()),
                child_form: child.clone(),
                child_csv: csv_name(child),
                child_foreign_key: fk_name,
                relationship_type: RELATIONSHIP_TYPE.to_string(),
                needs_fk_injection: true,
                fk_value_to_inject: Some(value.clone()),
                notes: Some(notes),
            });
        }
    }
    relationships
}

/// Merges relationships sharing a parent and pattern into one hierarchy
/// record for reporting.
pub fn group_hierarchies(relationships: &[RelationshipInfo]) -> Vec<Hierarchy> {
    let mut groups: BTreeMap<(String, PatternKind), Vec<String>> = BTreeMap::new();
    for rel in relationships {
        groups
            .entry((rel.parent_form.clone(), rel.pattern_type))
            .or_default()
            .push(rel.child_form.clone());
    }
    groups
        .into_iter()
        .map(|((parent, pattern), children)| Hierarchy {
            name: format!("{parent}_hierarchy"),
            pattern_type: pattern,
            parent_form: parent,
            children,
        })
        .collect()
}
