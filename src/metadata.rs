//! Metadata-file scanning: headers, record counts, and primary-key inference.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::io_utils;

/// One tabular lookup resource, identified by its file stem. Immutable once
/// read; re-derived on every run rather than cached across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFile {
    pub stem: String,
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub record_count: usize,
    pub primary_key: String,
}

impl MetadataFile {
    pub fn read(path: &Path, delimiter: Option<u8>) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .with_context(|| format!("Deriving stem identifier from {path:?}"))?;
        let data = DataSet::load(path, delimiter)?;
        let primary_key = infer_primary_key(&data)
            .with_context(|| format!("Inferring primary key for {path:?}"))?;
        debug!(
            "Read '{}': {} column(s), {} record(s), primary key '{}'",
            stem,
            data.columns.len(),
            data.rows.len(),
            primary_key
        );
        Ok(MetadataFile {
            stem,
            path: path.to_path_buf(),
            columns: data.columns,
            record_count: data.rows.len(),
            primary_key,
        })
    }
}

/// Scans a directory for `.csv`/`.tsv` metadata files, sorted by stem so
/// every downstream pass sees a deterministic order.
pub fn scan_directory(dir: &Path, delimiter: Option<u8>) -> Result<Vec<MetadataFile>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Reading metadata directory {dir:?}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_tabular = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("tsv")
            });
        if !is_tabular {
            continue;
        }
        // A malformed file fails only itself, never the whole scan.
        match MetadataFile::read(&path, delimiter) {
            Ok(file) => files.push(file),
            Err(err) => error!("Skipping unreadable metadata file {path:?}: {err:#}"),
        }
    }
    files.sort_by(|a, b| a.stem.cmp(&b.stem));
    Ok(files)
}

/// Raw header + record content of one metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataSet {
    pub fn load(path: &Path, delimiter: Option<u8>) -> Result<Self> {
        let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
        let columns: Vec<String> = reader
            .headers()
            .with_context(|| format!("Reading header row of {path:?}"))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            bail!("Metadata file {path:?} has no header columns");
        }
        let mut rows = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record =
                record.with_context(|| format!("Reading row {} in {:?}", row_idx + 2, path))?;
            // Flexible reads may yield short rows; a missing trailing cell is
            // undefined, which downstream consumers treat differently from an
            // empty string, so no padding happens here.
            let row: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
            rows.push(row);
        }
        Ok(DataSet { columns, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Distinct non-empty values of one column, in first-seen-agnostic
    /// (sorted) order.
    pub fn distinct_non_empty(&self, column: &str) -> Option<BTreeSet<String>> {
        let idx = self.column_index(column)?;
        let mut values = BTreeSet::new();
        for row in &self.rows {
            if let Some(value) = row.get(idx)
                && !value.is_empty()
            {
                values.insert(value.clone());
            }
        }
        Some(values)
    }

    pub fn write(&self, path: &Path, delimiter: Option<u8>) -> Result<()> {
        let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
        let mut writer = io_utils::open_csv_writer(path, delimiter)?;
        writer
            .write_record(&self.columns)
            .with_context(|| format!("Writing header row to {path:?}"))?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Primary-key selection order: a column literally named `id`/`code`, else a
/// column ending in `_id`/`_code`, else the first column whose values are all
/// distinct, else the first column.
pub fn infer_primary_key(data: &DataSet) -> Result<String> {
    if data.columns.is_empty() {
        bail!("Cannot infer a primary key without columns");
    }
    if let Some(literal) = data
        .columns
        .iter()
        .find(|c| c.as_str() == "id" || c.as_str() == "code")
    {
        return Ok(literal.clone());
    }
    if let Some(suffixed) = data
        .columns
        .iter()
        .find(|c| c.ends_with("_id") || c.ends_with("_code"))
    {
        return Ok(suffixed.clone());
    }
    for (idx, column) in data.columns.iter().enumerate() {
        let mut seen = BTreeSet::new();
        let all_distinct = data
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .all(|value| seen.insert(value.clone()));
        if all_distinct && !data.rows.is_empty() {
            debug!("Primary key '{}' chosen by distinctness", column);
            return Ok(column.clone());
        }
    }
    Ok(data.columns[0].clone())
}
