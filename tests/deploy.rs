mod common;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use common::{TestWorkspace, seed_equipment_fixture};
use formcast::deploy::{DeployOptions, Orchestrator, Phase, load_form_definitions};
use formcast::formgen::{self, TableNameRegistry};
use formcast::mapping::CategoryMapping;
use formcast::metadata;
use formcast::relationship::{self, RelationshipSnapshot};
use formcast::remote::{RemoteClient, SubmitOutcome};
use formcast::structure;
use serde_json::{Map, Value};

/// In-memory stand-in for the forms platform. Forms named in `reject_create`
/// fail creation; forms named in `withhold_id` never get an identifier;
/// `batch_cap` makes the platform accept at most that many records per batch.
#[derive(Default)]
struct FakeClient {
    reject_create: Vec<String>,
    withhold_id: Vec<String>,
    batch_cap: Option<usize>,
    created: Mutex<Vec<String>>,
    submitted: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
}

impl RemoteClient for FakeClient {
    fn create_form(&self, definition: &formcast::formgen::FormDefinition, _api_name: &str) -> Result<()> {
        let id = definition.properties.id.clone();
        if self.reject_create.contains(&id) {
            bail!("platform rejected '{id}'");
        }
        self.created.lock().unwrap().push(id);
        Ok(())
    }

    fn resolve_form_id(&self, api_name: &str) -> Result<Option<String>> {
        if self.withhold_id.iter().any(|w| formgen::api_name(w) == api_name) {
            return Ok(None);
        }
        Ok(Some(format!("remote-{api_name}")))
    }

    fn submit_records(
        &self,
        form_id: &str,
        records: &[Map<String, Value>],
    ) -> Result<SubmitOutcome> {
        let taken = self
            .batch_cap
            .map_or(records.len(), |cap| records.len().min(cap));
        self.submitted
            .lock()
            .unwrap()
            .insert(form_id.to_string(), records[..taken].to_vec());
        Ok(SubmitOutcome {
            attempted: taken,
            succeeded: taken,
            failed: 0,
        })
    }
}

fn options() -> DeployOptions {
    DeployOptions {
        call_delay: Duration::ZERO,
        ..DeployOptions::default()
    }
}

/// Generates the fixture's two forms and the snapshot, returning
/// (forms, data_dir, snapshot).
fn fixture(ws: &TestWorkspace) -> (Vec<formcast::formgen::FormDefinition>, std::path::PathBuf, RelationshipSnapshot) {
    let (data_dir, mapping_path) = seed_equipment_fixture(ws);
    let files = metadata::scan_directory(&data_dir, None).expect("scan");
    let mapping = CategoryMapping::load(&mapping_path).expect("mapping");
    let stems: Vec<String> = files.iter().map(|f| f.stem.clone()).collect();
    let relationships = relationship::detect_relationships(&files, &mapping);

    let forms_dir = ws.dir("forms");
    let mut registry = TableNameRegistry::new();
    for file in &files {
        let structure = structure::classify(file, &mapping, &stems).expect("classify");
        let injected = relationships
            .iter()
            .find(|r| r.needs_fk_injection && r.child_form == structure.stem);
        let form = formgen::generate(&structure, injected, &stems, &mut registry).expect("generate");
        formcast::io_utils::write_json_pretty(
            &forms_dir.join(format!("{}.form.json", file.stem)),
            &form,
        )
        .expect("write form");
    }
    let forms = load_form_definitions(&forms_dir).expect("load forms");
    (forms, data_dir, RelationshipSnapshot::new(relationships))
}

#[test]
fn full_run_creates_forms_then_populates_augmented_data() {
    let ws = TestWorkspace::new();
    let (forms, data_dir, snapshot) = fixture(&ws);
    let client = FakeClient::default();
    let orchestrator = Orchestrator::new(&client, options());

    let summary = orchestrator
        .run(&forms, &data_dir, &snapshot, None)
        .expect("run");
    assert_eq!(summary.final_phase, Phase::PopulatingData);
    assert_eq!(summary.forms_created(), 2);
    assert_eq!(summary.forms_failed(), 0);

    let submitted = client.submitted.lock().unwrap();
    let child_records = submitted
        .get("remote-tillageEquipment")
        .expect("child batch");
    assert_eq!(child_records.len(), 2);
    // The injected key reached the platform payload.
    assert_eq!(
        child_records[0]["equipment_category_code"],
        Value::String("TILLAGE".to_string())
    );

    let child_outcome = summary
        .data
        .iter()
        .find(|d| d.form_id == "md25tillageEquipment")
        .expect("child outcome");
    assert_eq!(child_outcome.succeeded, 2);
    let augmentation = child_outcome.augmentation.as_ref().expect("augmentation");
    assert!(augmentation.applied);
    assert_eq!(augmentation.fk_column, "equipment_category_code");
    assert_eq!(augmentation.fk_value, "TILLAGE");
}

#[test]
fn failed_creation_never_reaches_data_population() {
    let ws = TestWorkspace::new();
    let (forms, data_dir, snapshot) = fixture(&ws);
    let client = FakeClient {
        reject_create: vec!["md25tillageEquipment".to_string()],
        ..FakeClient::default()
    };
    let orchestrator = Orchestrator::new(&client, options());

    let summary = orchestrator
        .run(&forms, &data_dir, &snapshot, None)
        .expect("run");
    assert_eq!(summary.forms_failed(), 1);
    assert!(
        summary
            .data
            .iter()
            .all(|d| d.form_id != "md25tillageEquipment")
    );
    let submitted = client.submitted.lock().unwrap();
    assert!(!submitted.contains_key("remote-tillageEquipment"));
    // The sibling form still deployed end to end.
    assert!(submitted.contains_key("remote-equipmentCategory"));
}

#[test]
fn withheld_identifier_disables_population_for_that_form_only() {
    let ws = TestWorkspace::new();
    let (forms, data_dir, snapshot) = fixture(&ws);
    let client = FakeClient {
        withhold_id: vec!["md25equipmentCategory".to_string()],
        ..FakeClient::default()
    };
    let orchestrator = Orchestrator::new(&client, options());

    let summary = orchestrator
        .run(&forms, &data_dir, &snapshot, None)
        .expect("run");
    // Creation succeeded for both; population ran only for the child.
    assert_eq!(summary.forms_created(), 2);
    let submitted = client.submitted.lock().unwrap();
    assert!(!submitted.contains_key("remote-equipmentCategory"));
    assert!(submitted.contains_key("remote-tillageEquipment"));
}

#[test]
fn stop_on_error_halts_phase_one_without_recording_remaining_forms() {
    let ws = TestWorkspace::new();
    let (forms, data_dir, snapshot) = fixture(&ws);
    assert_eq!(forms[0].properties.id, "md25equipmentCategory");
    let client = FakeClient {
        reject_create: vec!["md25equipmentCategory".to_string()],
        ..FakeClient::default()
    };
    let orchestrator = Orchestrator::new(
        &client,
        DeployOptions {
            stop_on_error: true,
            ..options()
        },
    );

    let summary = orchestrator
        .run(&forms, &data_dir, &snapshot, None)
        .expect("run");
    assert!(summary.halted());
    assert_eq!(summary.final_phase, Phase::Halted);
    // The second form was neither attempted nor recorded.
    assert_eq!(summary.forms.len(), 1);
    assert!(summary.data.is_empty());
    assert!(client.submitted.lock().unwrap().is_empty());
}

#[test]
fn submission_counts_come_from_the_transport_result() {
    let ws = TestWorkspace::new();
    let (forms, data_dir, snapshot) = fixture(&ws);
    let client = FakeClient {
        batch_cap: Some(1),
        ..FakeClient::default()
    };
    let orchestrator = Orchestrator::new(&client, options());

    let summary = orchestrator
        .run(&forms, &data_dir, &snapshot, None)
        .expect("run");
    let child_outcome = summary
        .data
        .iter()
        .find(|d| d.form_id == "md25tillageEquipment")
        .expect("child outcome");
    // Two records were loaded locally but the platform took one; the
    // summary reports the platform's counts, not the local ones.
    assert_eq!(child_outcome.attempted, 1);
    assert_eq!(child_outcome.succeeded, 1);
    assert_eq!(child_outcome.failed, 0);
}

#[test]
fn dry_run_simulates_both_phases_without_remote_writes() {
    let ws = TestWorkspace::new();
    let (forms, data_dir, snapshot) = fixture(&ws);
    let client = FakeClient::default();
    let orchestrator = Orchestrator::new(
        &client,
        DeployOptions {
            dry_run: true,
            ..options()
        },
    );

    let summary = orchestrator
        .run(&forms, &data_dir, &snapshot, None)
        .expect("run");
    assert_eq!(summary.forms_created(), 2);
    assert!(summary.forms.iter().all(|f| f.simulated));
    assert_eq!(summary.records_succeeded(), 4);
    assert!(client.created.lock().unwrap().is_empty());
    assert!(client.submitted.lock().unwrap().is_empty());
}

#[test]
fn forms_only_skips_population_and_invalid_definition_fails_per_form() {
    let ws = TestWorkspace::new();
    let (mut forms, data_dir, snapshot) = fixture(&ws);
    forms[0].elements.clear();
    let client = FakeClient::default();
    let orchestrator = Orchestrator::new(
        &client,
        DeployOptions {
            forms_only: true,
            ..options()
        },
    );

    let summary = orchestrator
        .run(&forms, &data_dir, &snapshot, None)
        .expect("run");
    assert_eq!(summary.final_phase, Phase::CreatingForms);
    assert!(summary.data.is_empty());
    assert_eq!(summary.forms_failed(), 1);
    assert!(
        summary.forms[0]
            .error
            .as_deref()
            .unwrap()
            .contains("no fields")
    );
    // The valid sibling was still created.
    assert_eq!(summary.forms_created(), 1);
}
