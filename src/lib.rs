pub mod augment;
pub mod cli;
pub mod deploy;
pub mod formgen;
pub mod integrity;
pub mod io_utils;
pub mod mapping;
pub mod metadata;
pub mod relationship;
pub mod remote;
pub mod report;
pub mod resolver;
pub mod structure;

use std::{env, sync::OnceLock, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, error, info, warn};

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("formcast", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan(args) => handle_scan(&args),
        Commands::Detect(args) => handle_detect(&args),
        Commands::Generate(args) => handle_generate(&args),
        Commands::Augment(args) => handle_augment(&args),
        Commands::Validate(args) => handle_validate(&args),
        Commands::Deploy(args) => handle_deploy(&args),
    }
}

fn load_mapping(path: Option<&std::path::Path>) -> Result<mapping::CategoryMapping> {
    match path {
        Some(path) => mapping::CategoryMapping::load(path),
        None => Ok(mapping::CategoryMapping::default()),
    }
}

fn handle_scan(args: &cli::ScanArgs) -> Result<()> {
    info!("Scanning metadata directory {:?}", args.input_dir);
    let files = metadata::scan_directory(&args.input_dir, args.delimiter)?;
    let mapping = load_mapping(args.mapping.as_deref())?;
    let stems: Vec<String> = files.iter().map(|f| f.stem.clone()).collect();
    let mut rows = Vec::new();
    for file in &files {
        let structure = structure::classify(file, &mapping, &stems)
            .with_context(|| format!("Classifying {:?}", file.path))?;
        rows.push((structure, file.record_count, file.primary_key.clone()));
    }
    print!("{}", report::render_structures(&rows));
    info!("Scanned {} file(s)", files.len());
    Ok(())
}

fn handle_detect(args: &cli::DetectArgs) -> Result<()> {
    info!("Detecting relationships in {:?}", args.input_dir);
    let files = metadata::scan_directory(&args.input_dir, args.delimiter)?;
    let mapping = load_mapping(args.mapping.as_deref())?;
    let relationships = relationship::detect_relationships(&files, &mapping);
    let hierarchies = relationship::group_hierarchies(&relationships);
    if !hierarchies.is_empty() {
        print!("{}", report::render_hierarchies(&hierarchies));
    }
    let snapshot = relationship::RelationshipSnapshot::new(relationships);
    snapshot.save(&args.snapshot)?;
    info!(
        "Snapshot with {} relationship(s) written to {:?}",
        snapshot.relationships.len(),
        args.snapshot
    );
    Ok(())
}

fn handle_generate(args: &cli::GenerateArgs) -> Result<()> {
    info!("Generating form definitions from {:?}", args.input_dir);
    let files = metadata::scan_directory(&args.input_dir, args.delimiter)?;
    let mapping = load_mapping(args.mapping.as_deref())?;
    let stems: Vec<String> = files.iter().map(|f| f.stem.clone()).collect();
    let relationships = relationship::detect_relationships(&files, &mapping);

    std::fs::create_dir_all(&args.forms_dir)
        .with_context(|| format!("Creating forms directory {:?}", args.forms_dir))?;
    let mut registry = formgen::TableNameRegistry::new();
    let mut generated = 0usize;
    let mut failed = 0usize;
    for file in &files {
        let result = structure::classify(file, &mapping, &stems).and_then(|structure| {
            let injected = relationships
                .iter()
                .find(|r| r.needs_fk_injection && r.child_form == structure.stem);
            formgen::generate(&structure, injected, &stems, &mut registry)
        });
        match result {
            Ok(form) => {
                let path = args.forms_dir.join(format!("{}.form.json", file.stem));
                io_utils::write_json_pretty(&path, &form)?;
                generated += 1;
            }
            Err(err) => {
                // A table-name collision signals a naming-scheme defect that
                // will recur; stop the run. Anything else fails one file.
                if err.downcast_ref::<formgen::FormGenError>().is_some() {
                    return Err(err);
                }
                error!("Skipping '{}': {err:#}", file.stem);
                failed += 1;
            }
        }
    }
    info!(
        "Generated {generated} form definition(s) into {:?} ({failed} failed)",
        args.forms_dir
    );
    Ok(())
}

fn handle_augment(args: &cli::AugmentArgs) -> Result<()> {
    let stem = args
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Cannot derive file stem from {:?}", args.input))?;
    let snapshot = relationship::RelationshipSnapshot::load(&args.snapshot)?;
    let rel = snapshot
        .injected_for(stem)
        .ok_or_else(|| anyhow!("Snapshot has no injected relationship for '{stem}'"))?;

    let data = metadata::DataSet::load(&args.input, args.delimiter)?;
    let parent = if args.no_parent_check {
        None
    } else {
        let parent_path = args
            .input
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join(&rel.parent_csv);
        if parent_path.exists() {
            Some(metadata::DataSet::load(&parent_path, args.delimiter)?)
        } else {
            warn!("Parent data {parent_path:?} not found; skipping existence check");
            None
        }
    };

    let outcome = augment::augment(&data, rel, parent.as_ref())?;
    if !outcome.result.success {
        bail!(
            "Augmentation of {:?} failed: {}",
            args.input,
            outcome.result.error.as_deref().unwrap_or("unknown")
        );
    }
    if let Some(augmented) = outcome.data {
        let output = args.output.as_deref().unwrap_or(&args.input);
        augmented.write(output, args.delimiter)?;
        info!(
            "Wrote {} augmented record(s) to {:?}",
            augmented.rows.len(),
            output
        );
    } else {
        info!(
            "{}",
            outcome.result.note.as_deref().unwrap_or("No rewrite needed")
        );
    }
    Ok(())
}

fn handle_validate(args: &cli::ValidateArgs) -> Result<()> {
    info!("Auditing reference integrity in {:?}", args.input_dir);
    let files = metadata::scan_directory(&args.input_dir, args.delimiter)?;
    let thresholds = integrity::IntegrityThresholds {
        broken_floor_pct: args.broken_floor,
    };
    let findings = integrity::audit(&files, args.delimiter, &thresholds)?;
    if findings.is_empty() {
        info!("No candidate reference columns found");
        return Ok(());
    }
    print!("{}", report::render_findings(&findings));
    if let Some(path) = &args.json {
        io_utils::write_json_pretty(path, &findings)?;
        info!("Findings written to {path:?}");
    }
    let broken = findings
        .iter()
        .filter(|f| f.classification == integrity::IntegrityClass::Broken)
        .count();
    if broken > 0 {
        bail!("{broken} reference column(s) classified BROKEN");
    }
    Ok(())
}

fn handle_deploy(args: &cli::DeployArgs) -> Result<()> {
    let forms = deploy::load_form_definitions(&args.forms_dir)?;
    if forms.is_empty() {
        bail!("No form definitions found in {:?}", args.forms_dir);
    }
    let snapshot = relationship::RelationshipSnapshot::load(&args.snapshot)?;
    let api_token = args
        .api_token
        .clone()
        .or_else(|| env::var("FORMCAST_API_TOKEN").ok());
    let client = remote::HttpRemoteClient::new(
        &args.base_url,
        api_token,
        Duration::from_secs(args.timeout_secs),
    )?;
    let options = deploy::DeployOptions {
        dry_run: args.dry_run,
        forms_only: args.forms_only,
        data_only: args.data_only,
        stop_on_error: args.stop_on_error,
        call_delay: Duration::from_millis(args.delay_ms),
    };
    let orchestrator = deploy::Orchestrator::new(&client, options);
    let summary = orchestrator.run(&forms, &args.data_dir, &snapshot, args.delimiter)?;
    if let Some(path) = &args.summary {
        io_utils::write_json_pretty(path, &summary)?;
        info!("Run summary written to {path:?}");
    }
    if summary.halted() {
        bail!("Deployment halted during form creation (stop-on-error)");
    }
    Ok(())
}
