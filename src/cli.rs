use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Generate and deploy lookup forms from CSV metadata", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a metadata directory and report each file's structural shape
    Scan(ScanArgs),
    /// Detect parent/child relationships and write the snapshot JSON
    Detect(DetectArgs),
    /// Generate destination-platform form definitions
    Generate(GenerateArgs),
    /// Inject a missing foreign-key column into one child data file
    Augment(AugmentArgs),
    /// Audit candidate reference columns for referential integrity
    Validate(ValidateArgs),
    /// Create forms and populate data against the remote platform
    Deploy(DeployArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory of CSV/TSV metadata files
    #[arg(short = 'i', long = "input-dir")]
    pub input_dir: PathBuf,
    /// Category-mapping configuration (YAML or JSON)
    #[arg(short = 'm', long = "mapping")]
    pub mapping: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Directory of CSV/TSV metadata files
    #[arg(short = 'i', long = "input-dir")]
    pub input_dir: PathBuf,
    /// Category-mapping configuration (YAML or JSON)
    #[arg(short = 'm', long = "mapping")]
    pub mapping: Option<PathBuf>,
    /// Destination snapshot file
    #[arg(short = 'o', long = "snapshot", default_value = "relationships.json")]
    pub snapshot: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Directory of CSV/TSV metadata files
    #[arg(short = 'i', long = "input-dir")]
    pub input_dir: PathBuf,
    /// Category-mapping configuration (YAML or JSON)
    #[arg(short = 'm', long = "mapping")]
    pub mapping: Option<PathBuf>,
    /// Output directory for generated form definitions
    #[arg(short = 'o', long = "forms-dir")]
    pub forms_dir: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct AugmentArgs {
    /// Child data file to augment
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Relationship snapshot produced by `detect`
    #[arg(short = 's', long = "snapshot")]
    pub snapshot: PathBuf,
    /// Augmented output file (input overwritten if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Skip the parent-value existence check
    #[arg(long = "no-parent-check")]
    pub no_parent_check: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Directory of CSV/TSV metadata files
    #[arg(short = 'i', long = "input-dir")]
    pub input_dir: PathBuf,
    /// Match percentage at or above which a partial overlap is BROKEN
    /// rather than FALSE_POSITIVE
    #[arg(long = "broken-floor", default_value_t = 80.0)]
    pub broken_floor: f64,
    /// Write the findings as JSON to this path in addition to the console
    #[arg(long = "json")]
    pub json: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Directory of generated form definitions (*.form.json)
    #[arg(short = 'f', long = "forms-dir")]
    pub forms_dir: PathBuf,
    /// Directory of data files to populate forms from
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: PathBuf,
    /// Relationship snapshot produced by `detect`
    #[arg(short = 's', long = "snapshot")]
    pub snapshot: PathBuf,
    /// Base URL of the remote forms platform
    #[arg(long = "base-url")]
    pub base_url: String,
    /// Bearer token for the remote platform (falls back to FORMCAST_API_TOKEN)
    #[arg(long = "api-token")]
    pub api_token: Option<String>,
    /// Simulate the run without remote writes
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Create forms only; skip data population
    #[arg(long = "forms-only", conflicts_with = "data_only")]
    pub forms_only: bool,
    /// Populate data only; assume forms exist from an earlier run
    #[arg(long = "data-only")]
    pub data_only: bool,
    /// Halt form creation on the first error
    #[arg(long = "stop-on-error")]
    pub stop_on_error: bool,
    /// Pause between consecutive remote calls, in milliseconds
    #[arg(long = "delay-ms", default_value_t = 250)]
    pub delay_ms: u64,
    /// Per-request timeout, in seconds
    #[arg(long = "timeout-secs", default_value_t = 30)]
    pub timeout_secs: u64,
    /// Write the run summary as JSON to this path
    #[arg(long = "summary")]
    pub summary: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
