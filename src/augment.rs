//! Foreign-key injection for Pattern-2 child data.
//!
//! Inserts the reference column the source file never had, with a constant
//! value taken from the relationship record. Idempotent via the no-op guard:
//! a child that already carries the column is left untouched with an
//! explanatory note. Domain failures (empty input, parent value missing) fail
//! only the file in hand and are reported in the structured result so sibling
//! files keep going.

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    metadata::{DataSet, infer_primary_key},
    relationship::RelationshipInfo,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentResult {
    pub child_form: String,
    pub fk_column: String,
    pub fk_value: String,
    pub original_columns: Vec<String>,
    pub augmented_columns: Vec<String>,
    pub record_count: usize,
    pub success: bool,
    /// False when the no-op guard fired or the augmentation failed.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct AugmentOutcome {
    /// Augmented records, present only when a rewrite actually happened.
    pub data: Option<DataSet>,
    pub result: AugmentResult,
}

/// Rewrites `data` by inserting the relationship's reference column with its
/// constant injected value, reordering columns to [primary key, injected
/// reference, rest]. `parent` enables the optional check that the injected
/// value actually exists among the parent's key values.
pub fn augment(
    data: &DataSet,
    relationship: &RelationshipInfo,
    parent: Option<&DataSet>,
) -> Result<AugmentOutcome> {
    let fk_column = relationship.child_foreign_key.clone();
    let fk_value = relationship
        .fk_value_to_inject
        .clone()
        .unwrap_or_default();
    let base = AugmentResult {
        child_form: relationship.child_form.clone(),
        fk_column: fk_column.clone(),
        fk_value: fk_value.clone(),
        original_columns: data.columns.clone(),
        augmented_columns: Vec::new(),
        record_count: data.rows.len(),
        success: false,
        applied: false,
        note: None,
        error: None,
    };

    if fk_value.is_empty() {
        return Ok(failed(base, "relationship has no value to inject"));
    }
    if data.rows.is_empty() {
        return Ok(failed(base, "child file has no data rows"));
    }
    if data.columns.iter().any(|c| c == &fk_column) {
        // Guard against double insertion; anomaly, not an error.
        warn!(
            "'{}' already contains column '{}'; augmentation skipped",
            relationship.child_form, fk_column
        );
        return Ok(AugmentOutcome {
            data: None,
            result: AugmentResult {
                augmented_columns: data.columns.clone(),
                success: true,
                note: Some(format!(
                    "column '{fk_column}' already present; no injection performed"
                )),
                ..base
            },
        });
    }
    if let Some(parent) = parent {
        let key_values = parent
            .distinct_non_empty(&relationship.parent_primary_key)
            .unwrap_or_default();
        if !key_values.contains(&fk_value) {
            return Ok(failed(
                base,
                &format!(
                    "value '{}' not found in parent '{}' column '{}'",
                    fk_value, relationship.parent_form, relationship.parent_primary_key
                ),
            ));
        }
    }

    let primary_key = infer_primary_key(data)?;
    let pk_idx = data
        .column_index(&primary_key)
        .unwrap_or_default();

    // New column order: [primary key, injected reference, rest in source order].
    let mut order: Vec<usize> = vec![pk_idx];
    order.extend((0..data.columns.len()).filter(|idx| *idx != pk_idx));

    let mut columns = vec![data.columns[pk_idx].clone(), fk_column.clone()];
    columns.extend(order.iter().skip(1).map(|&idx| data.columns[idx].clone()));

    let rows = data
        .rows
        .iter()
        .map(|row| {
            let mut out = vec![row.get(pk_idx).cloned().unwrap_or_default(), fk_value.clone()];
            out.extend(
                order
                    .iter()
                    .skip(1)
                    .map(|&idx| row.get(idx).cloned().unwrap_or_default()),
            );
            out
        })
        .collect();

    info!(
        "Injected '{}={}' into {} record(s) of '{}'",
        fk_column,
        fk_value,
        data.rows.len(),
        relationship.child_form
    );
    Ok(AugmentOutcome {
        data: Some(DataSet {
            columns: columns.clone(),
            rows,
        }),
        result: AugmentResult {
            augmented_columns: columns,
            success: true,
            applied: true,
            ..base
        },
    })
}

fn failed(base: AugmentResult, reason: &str) -> AugmentOutcome {
    warn!("Augmentation of '{}' failed: {}", base.child_form, reason);
    AugmentOutcome {
        data: None,
        result: AugmentResult {
            error: Some(reason.to_string()),
            ..base
        },
    }
}
