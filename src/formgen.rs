//! Destination-platform form generation.
//!
//! One `FormDefinition` per classified file. The generated document nests as
//! `properties.{id,tableName}` plus an `elements` field tree; a reference
//! field carries its binder as a single structured `reference` property. The
//! destination platform silently rejects forms that wire the binder into the
//! enumerated `options` list instead, so that shape is a hard acceptance
//! contract here, not a style choice.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use heck::{ToLowerCamelCase, ToTitleCase};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    relationship::RelationshipInfo,
    resolver,
    structure::{CsvStructure, FormKind},
};

/// Hard platform ceiling on storage table names.
pub const MAX_TABLE_NAME_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum FormGenError {
    #[error(
        "table name '{table_name}' for form '{new_form}' collides with previously generated form '{existing_form}'"
    )]
    TableNameCollision {
        table_name: String,
        existing_form: String,
        new_form: String,
    },
}

/// Per-run record of issued table names. Truncation to the platform ceiling
/// can make distinct form ids collide; that is a naming-scheme defect likely
/// to recur, so a collision is a hard stop naming both forms rather than a
/// silent rename.
#[derive(Debug, Default)]
pub struct TableNameRegistry {
    issued: HashMap<String, String>,
}

impl TableNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, form_id: &str) -> Result<String, FormGenError> {
        let table_name = if form_id.len() > MAX_TABLE_NAME_LEN {
            let truncated: String = form_id.chars().take(MAX_TABLE_NAME_LEN).collect();
            warn!("Table name for '{form_id}' truncated to '{truncated}'");
            truncated
        } else {
            form_id.to_string()
        };
        if let Some(existing) = self.issued.get(&table_name) {
            return Err(FormGenError::TableNameCollision {
                table_name,
                existing_form: existing.clone(),
                new_form: form_id.to_string(),
            });
        }
        self.issued.insert(table_name.clone(), form_id.to_string());
        Ok(table_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormProperties {
    pub id: String,
    pub name: String,
    #[serde(rename = "tableName")]
    pub table_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Reference,
}

/// Binder configuration of a reference field: the parent form to look up,
/// its key and display columns, and whether an empty selection is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceBinding {
    pub form: String,
    #[serde(rename = "keyColumn")]
    pub key_column: String,
    #[serde(rename = "displayColumn")]
    pub display_column: String,
    #[serde(rename = "allowEmpty")]
    pub allow_empty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    /// Single structured binder property; never an entry in `options`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceBinding>,
    /// Enumerated choice values. Reference wiring must never appear here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FieldDef {
    fn text(name: &str) -> Self {
        FieldDef {
            name: name.to_string(),
            field_type: FieldType::Text,
            unique: false,
            reference: None,
            options: Vec::new(),
        }
    }

    fn reference(name: &str, parent_form: &str, key: &str, display: &str) -> Self {
        FieldDef {
            name: name.to_string(),
            field_type: FieldType::Reference,
            unique: false,
            reference: Some(ReferenceBinding {
                form: parent_form.to_string(),
                key_column: key.to_string(),
                display_column: display.to_string(),
                allow_empty: true,
            }),
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDefinition {
    pub properties: FormProperties,
    pub elements: Vec<FieldDef>,
}

impl FormDefinition {
    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.elements
            .iter()
            .filter(|f| f.field_type == FieldType::Reference)
    }
}

/// Deterministic API name the remote platform keys generated identifiers by.
pub fn api_name(form_id: &str) -> String {
    resolver::strip_form_prefix(form_id).to_lower_camel_case()
}

fn display_name(form_id: &str) -> String {
    resolver::strip_form_prefix(form_id).to_title_case()
}

/// Resolves the parent form id for an explicit reference column. Ordered
/// fallback: exact/prefix-stripped/substring against scanned stems, then a
/// naive camelCase derivation from the column name. Degrading beats failing
/// the whole run for one unresolved reference.
fn resolve_parent_form(column: &str, known_stems: &[String]) -> String {
    let target = resolver::strip_reference_marker(column);
    match resolver::resolve_name(target, known_stems) {
        Some(resolved) => {
            if resolved.confidence == resolver::MatchConfidence::Substring {
                warn!(
                    "Parent for column '{}' matched '{}' by substring only",
                    column, resolved.stem
                );
            }
            resolved.stem
        }
        None => {
            let fallback = resolver::camel_case_fallback(column);
            warn!(
                "No scanned file matches reference column '{}'; falling back to derived form id '{}'",
                column, fallback
            );
            fallback
        }
    }
}

/// Generates the form definition for one classified file.
///
/// `relationship` is required for injected-reference structures and ignored
/// otherwise; `known_stems` feeds explicit parent resolution; `registry`
/// enforces per-run table-name uniqueness.
pub fn generate(
    structure: &CsvStructure,
    relationship: Option<&RelationshipInfo>,
    known_stems: &[String],
    registry: &mut TableNameRegistry,
) -> Result<FormDefinition> {
    let table_name = registry
        .claim(&structure.stem)
        .with_context(|| format!("Assigning table name for form '{}'", structure.stem))?;
    let properties = FormProperties {
        id: structure.stem.clone(),
        name: display_name(&structure.stem),
        table_name,
    };

    let elements = match structure.kind {
        FormKind::Simple => vec![FieldDef::text("code"), FieldDef::text("name")],
        FormKind::MultiField => structure
            .columns
            .iter()
            .filter(|c| c.as_str() != "id")
            .map(|c| FieldDef::text(c))
            .collect(),
        FormKind::Reference => {
            let Some(column) = structure.reference_column.as_deref() else {
                bail!(
                    "Structure for '{}' is reference-kind but has no reference column",
                    structure.stem
                );
            };
            let parent = resolve_parent_form(column, known_stems);
            vec![
                FieldDef::text("code"),
                FieldDef::reference(column, &parent, "code", "name"),
                FieldDef::text("name"),
            ]
        }
        FormKind::InjectedReference => {
            let Some(rel) = relationship else {
                bail!(
                    "Injected-reference form '{}' requires its relationship record",
                    structure.stem
                );
            };
            let mut code = FieldDef::text("code");
            code.unique = true;
            let mut fields = vec![
                code,
                FieldDef::reference(
                    &rel.child_foreign_key,
                    &rel.parent_form,
                    &rel.parent_primary_key,
                    "name",
                ),
            ];
            fields.extend(
                structure
                    .columns
                    .iter()
                    .filter(|c| {
                        c.as_str() != "id"
                            && c.as_str() != "code"
                            && c.as_str() != rel.child_foreign_key
                    })
                    .map(|c| FieldDef::text(c)),
            );
            fields
        }
    };

    Ok(FormDefinition {
        properties,
        elements,
    })
}
