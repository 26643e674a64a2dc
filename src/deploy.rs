//! Two-phase deployment orchestration.
//!
//! Phase 1 creates every generated form; an interstitial step resolves the
//! platform-issued identifier for each created form; Phase 2 populates data
//! for every form with both an identifier and a locatable data file. The run
//! is an explicit state machine: `CreatingForms` → `PopulatingData`, with a
//! terminal `Halted` state reachable only from `CreatingForms` under
//! stop-on-error. `PopulatingData` has no halt transition: an incomplete
//! schema can be re-run, an interrupted data load is worse, so Phase 2
//! failures stay per-form regardless of the flag. A halted run leaves
//! previously created forms and data in place; there is no rollback.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    augment::{self, AugmentResult},
    formgen::{self, FormDefinition},
    metadata::DataSet,
    relationship::RelationshipSnapshot,
    remote::RemoteClient,
};

#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Simulate without remote writes; every skip is still recorded as a
    /// simulated success.
    pub dry_run: bool,
    pub forms_only: bool,
    pub data_only: bool,
    /// Halts Phase 1 on the first creation error. Phase 2 is never halted by
    /// this flag.
    pub stop_on_error: bool,
    /// Fixed pause between consecutive remote calls; the destination applies
    /// an implicit rate limit.
    pub call_delay: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        DeployOptions {
            dry_run: false,
            forms_only: false,
            data_only: false,
            stop_on_error: false,
            call_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    CreatingForms,
    PopulatingData,
    Halted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormOutcome {
    pub form_id: String,
    pub created: bool,
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataOutcome {
    pub form_id: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub augmentation: Option<AugmentResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_phase: Phase,
    pub forms: Vec<FormOutcome>,
    pub data: Vec<DataOutcome>,
}

impl RunSummary {
    pub fn forms_created(&self) -> usize {
        self.forms.iter().filter(|f| f.created).count()
    }

    pub fn forms_failed(&self) -> usize {
        self.forms.iter().filter(|f| f.error.is_some()).count()
    }

    pub fn records_succeeded(&self) -> usize {
        self.data.iter().map(|d| d.succeeded).sum()
    }

    pub fn halted(&self) -> bool {
        self.final_phase == Phase::Halted
    }
}

pub struct Orchestrator<'a, C: RemoteClient> {
    client: &'a C,
    options: DeployOptions,
}

impl<'a, C: RemoteClient> Orchestrator<'a, C> {
    pub fn new(client: &'a C, options: DeployOptions) -> Self {
        Orchestrator { client, options }
    }

    /// Runs the full deployment against the supplied form definitions, their
    /// data directory, and the relationship snapshot.
    pub fn run(
        &self,
        forms: &[FormDefinition],
        data_dir: &Path,
        snapshot: &RelationshipSnapshot,
        delimiter: Option<u8>,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(
            "Deployment run {} over {} form(s) (dry_run={})",
            run_id,
            forms.len(),
            self.options.dry_run
        );

        let mut phase = Phase::CreatingForms;
        let mut form_outcomes = Vec::new();

        if self.options.data_only {
            // Forms were created in an earlier run; only identifiers are needed.
            for form in forms {
                form_outcomes.push(FormOutcome {
                    form_id: form.properties.id.clone(),
                    created: false,
                    simulated: false,
                    remote_id: None,
                    error: None,
                });
            }
        } else {
            for form in forms {
                let outcome = self.create_form(form);
                let failed = outcome.error.is_some();
                form_outcomes.push(outcome);
                if failed && self.options.stop_on_error {
                    // Remaining forms are neither attempted nor recorded.
                    warn!("Stop-on-error fired; halting run during form creation");
                    phase = Phase::Halted;
                    break;
                }
            }
        }

        if phase == Phase::Halted {
            return Ok(RunSummary {
                run_id,
                started_at,
                finished_at: Utc::now(),
                final_phase: phase,
                forms: form_outcomes,
                data: Vec::new(),
            });
        }

        self.resolve_identifiers(&mut form_outcomes);

        let mut data_outcomes = Vec::new();
        if !self.options.forms_only {
            phase = Phase::PopulatingData;
            for outcome in &form_outcomes {
                if let Some(data_outcome) =
                    self.populate_form(outcome, data_dir, snapshot, delimiter)
                {
                    data_outcomes.push(data_outcome);
                }
            }
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            final_phase: phase,
            forms: form_outcomes,
            data: data_outcomes,
        };
        info!(
            "Deployment run {} finished: {} form(s) created, {} failed, {} record(s) loaded",
            run_id,
            summary.forms_created(),
            summary.forms_failed(),
            summary.records_succeeded()
        );
        Ok(summary)
    }

    fn pace(&self) {
        if !self.options.dry_run && !self.options.call_delay.is_zero() {
            std::thread::sleep(self.options.call_delay);
        }
    }

    fn create_form(&self, form: &FormDefinition) -> FormOutcome {
        let form_id = form.properties.id.clone();
        if let Err(reason) = validate_definition(form) {
            warn!("Form '{form_id}' failed validation: {reason}");
            return FormOutcome {
                form_id,
                created: false,
                simulated: false,
                remote_id: None,
                error: Some(reason),
            };
        }
        if self.options.dry_run {
            info!("[dry-run] would create form '{form_id}'");
            return FormOutcome {
                form_id,
                created: true,
                simulated: true,
                remote_id: None,
                error: None,
            };
        }
        self.pace();
        let api_name = formgen::api_name(&form.properties.id);
        match self.client.create_form(form, &api_name) {
            Ok(()) => {
                info!("Created form '{form_id}'");
                FormOutcome {
                    form_id,
                    created: true,
                    simulated: false,
                    remote_id: None,
                    error: None,
                }
            }
            Err(err) => {
                warn!("Creating form '{form_id}' failed: {err:#}");
                FormOutcome {
                    form_id,
                    created: false,
                    simulated: false,
                    remote_id: None,
                    error: Some(format!("{err:#}")),
                }
            }
        }
    }

    /// Interstitial step: identifier absence is a warning that disables
    /// Phase 2 for that form only, never a hard failure.
    fn resolve_identifiers(&self, outcomes: &mut [FormOutcome]) {
        for outcome in outcomes.iter_mut() {
            let eligible = outcome.created || self.options.data_only;
            if !eligible {
                continue;
            }
            let api_name = formgen::api_name(&outcome.form_id);
            if self.options.dry_run {
                outcome.remote_id = Some(format!("dry-{api_name}"));
                continue;
            }
            self.pace();
            match self.client.resolve_form_id(&api_name) {
                Ok(Some(id)) => outcome.remote_id = Some(id),
                Ok(None) => warn!(
                    "No generated identifier for '{}' (api name '{}'); data population disabled",
                    outcome.form_id, api_name
                ),
                Err(err) => warn!(
                    "Identifier lookup for '{}' failed: {err:#}; data population disabled",
                    outcome.form_id
                ),
            }
        }
    }

    fn populate_form(
        &self,
        form: &FormOutcome,
        data_dir: &Path,
        snapshot: &RelationshipSnapshot,
        delimiter: Option<u8>,
    ) -> Option<DataOutcome> {
        let Some(remote_id) = form.remote_id.as_deref() else {
            // Creation failed or no identifier was issued.
            return None;
        };
        let data_path = data_dir.join(format!("{}.csv", form.form_id));
        if !data_path.exists() {
            warn!("No data file for '{}' at {:?}; skipping", form.form_id, data_path);
            return Some(DataOutcome {
                form_id: form.form_id.clone(),
                attempted: 0,
                succeeded: 0,
                failed: 0,
                augmentation: None,
                skipped: Some(format!("no data file at {}", data_path.display())),
                error: None,
            });
        }

        let mut outcome = DataOutcome {
            form_id: form.form_id.clone(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            augmentation: None,
            skipped: None,
            error: None,
        };

        let mut data = match DataSet::load(&data_path, delimiter) {
            Ok(data) => data,
            Err(err) => {
                outcome.error = Some(format!("{err:#}"));
                return Some(outcome);
            }
        };

        if let Some(rel) = snapshot.injected_for(&form.form_id) {
            let parent_path = data_dir.join(&rel.parent_csv);
            let parent = if parent_path.exists() {
                match DataSet::load(&parent_path, delimiter) {
                    Ok(parent) => Some(parent),
                    Err(err) => {
                        outcome.error = Some(format!("{err:#}"));
                        return Some(outcome);
                    }
                }
            } else {
                warn!(
                    "Parent data {:?} not found; injecting without existence check",
                    parent_path
                );
                None
            };
            match augment::augment(&data, rel, parent.as_ref()) {
                Ok(augmented) => {
                    let ok = augmented.result.success;
                    if let Some(rewritten) = augmented.data {
                        data = rewritten;
                    }
                    outcome.augmentation = Some(augmented.result);
                    if !ok {
                        // Aborts only this form's population.
                        outcome.error = Some("fk augmentation failed".to_string());
                        return Some(outcome);
                    }
                }
                Err(err) => {
                    outcome.error = Some(format!("{err:#}"));
                    return Some(outcome);
                }
            }
        }

        let records = to_records(&data);
        outcome.attempted = records.len();
        if self.options.dry_run {
            info!(
                "[dry-run] would submit {} record(s) to '{}'",
                records.len(),
                form.form_id
            );
            outcome.succeeded = records.len();
            return Some(outcome);
        }
        self.pace();
        match self.client.submit_records(remote_id, &records) {
            Ok(result) => {
                // The transport owns the attempted count: on a partial batch
                // the local record count and the platform's can disagree.
                outcome.attempted = result.attempted;
                outcome.succeeded = result.succeeded;
                outcome.failed = result.failed;
            }
            Err(err) => {
                warn!("Populating '{}' failed: {err:#}", form.form_id);
                outcome.failed = records.len();
                outcome.error = Some(format!("{err:#}"));
            }
        }
        Some(outcome)
    }
}

fn validate_definition(form: &FormDefinition) -> Result<(), String> {
    if form.properties.id.trim().is_empty() {
        return Err("form id is empty".to_string());
    }
    if form.properties.table_name.trim().is_empty() {
        return Err("table name is empty".to_string());
    }
    if form.elements.is_empty() {
        return Err("form has no fields".to_string());
    }
    Ok(())
}

/// Platform string representation of every field. Cells that are undefined
/// (the row is shorter than the header) are dropped; empty strings are kept.
fn to_records(data: &DataSet) -> Vec<Map<String, Value>> {
    data.rows
        .iter()
        .map(|row| {
            let mut record = Map::new();
            for (idx, column) in data.columns.iter().enumerate() {
                if let Some(value) = row.get(idx) {
                    record.insert(column.clone(), Value::String(value.clone()));
                }
            }
            record
        })
        .collect()
}

/// Loads every generated form definition (`*.form.json`) from a directory,
/// sorted by form id.
pub fn load_form_definitions(dir: &Path) -> Result<Vec<FormDefinition>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Reading forms directory {dir:?}"))?;
    let mut forms: Vec<FormDefinition> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".form.json"))
        {
            forms.push(crate::io_utils::read_json(&path)?);
        }
    }
    forms.sort_by(|a, b| a.properties.id.cmp(&b.properties.id));
    Ok(forms)
}
