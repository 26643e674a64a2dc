//! Per-file structural classification.
//!
//! `classify` is a pure function of the file, the category mapping, and the
//! set of scanned stems — no detector instance state — so every file's
//! classification is independently reproducible.

use anyhow::{Result, bail};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{mapping::CategoryMapping, metadata::MetadataFile, resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    Simple,
    MultiField,
    Reference,
    InjectedReference,
}

/// Classification result for one metadata file. Created here, consumed
/// read-only by the detector and the form generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvStructure {
    pub stem: String,
    pub columns: Vec<String>,
    pub kind: FormKind,
    /// First reference-candidate column found by the suffix heuristic, kept
    /// even for injected-reference files so the masking can be reported.
    pub reference_column: Option<String>,
    /// Parent form id (injected-reference only).
    pub parent_form: Option<String>,
    /// Category value to inject (injected-reference only).
    pub injected_value: Option<String>,
    /// Derived reference-field name (injected-reference only).
    pub injected_fk_name: Option<String>,
}

/// Classifies one file. The category mapping is consulted first: a file
/// listed there as a child is injected-reference regardless of its columns,
/// and any suffix-heuristic hit is ignored for classification.
pub fn classify(
    file: &MetadataFile,
    mapping: &CategoryMapping,
    known_stems: &[String],
) -> Result<CsvStructure> {
    if file.columns.is_empty() {
        bail!("Metadata file '{}' has no columns to classify", file.stem);
    }

    let non_id: Vec<&String> = file.columns.iter().filter(|c| c.as_str() != "id").collect();
    if non_id.is_empty() {
        bail!(
            "Metadata file '{}' has only an id column; nothing to classify",
            file.stem
        );
    }

    let reference_column = non_id
        .iter()
        .find(|c| resolver::is_reference_candidate(c))
        .map(|c| (*c).to_string());

    if let Some((parent, value)) = mapping.parent_of(&file.stem) {
        if !known_stems.iter().any(|s| s == parent) {
            warn!(
                "Mapping names parent '{}' for child '{}' but no such file was scanned",
                parent, file.stem
            );
        }
        if let Some(column) = &reference_column {
            warn!(
                "'{}' is mapped as an injected child of '{}'; explicit reference column '{}' is masked",
                file.stem, parent, column
            );
        }
        let fk_name = resolver::derive_fk_name(parent);
        if file.columns.iter().any(|c| c == &fk_name) {
            // Anomaly, not an error: augmentation degrades to a no-op.
            warn!(
                "Injected child '{}' already contains reference column '{}'",
                file.stem, fk_name
            );
        }
        return Ok(CsvStructure {
            stem: file.stem.clone(),
            columns: file.columns.clone(),
            kind: FormKind::InjectedReference,
            reference_column,
            parent_form: Some(parent.to_string()),
            injected_value: Some(value.to_string()),
            injected_fk_name: Some(fk_name),
        });
    }

    // Column order carries no meaning; only the set {code, name} does.
    let kind = if non_id.len() == 2
        && non_id.iter().any(|c| c.as_str() == "code")
        && non_id.iter().any(|c| c.as_str() == "name")
    {
        FormKind::Simple
    } else if reference_column.is_some() {
        FormKind::Reference
    } else {
        FormKind::MultiField
    };

    Ok(CsvStructure {
        stem: file.stem.clone(),
        columns: file.columns.clone(),
        kind,
        reference_column,
        parent_form: None,
        injected_value: None,
        injected_fk_name: None,
    })
}
