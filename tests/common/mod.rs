#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Creates a subdirectory under the workspace and returns the path.
    pub fn dir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("create temp dir");
        path
    }
}

/// Seeds the equipment-category fixture used across the pipeline tests: a
/// simple parent lookup, a mapped child without its category column, and the
/// category mapping declaring the injection.
pub fn seed_equipment_fixture(ws: &TestWorkspace) -> (PathBuf, PathBuf) {
    let data_dir = ws.dir("metadata");
    write_file(
        &data_dir.join("md25equipmentCategory.csv"),
        "code,name\nTILLAGE,Tillage\nHARVEST,Harvest\n",
    );
    write_file(
        &data_dir.join("md25tillageEquipment.csv"),
        "code,name\nPLOUGH,Plough\nHARROW,Harrow\n",
    );
    let mapping = ws.write(
        "mapping.yaml",
        "md25equipmentCategory:\n  TILLAGE: md25tillageEquipment\n",
    );
    (data_dir, mapping)
}

fn write_file(path: &Path, contents: &str) {
    let mut file = File::create(path).expect("create fixture file");
    file.write_all(contents.as_bytes())
        .expect("write fixture contents");
}
