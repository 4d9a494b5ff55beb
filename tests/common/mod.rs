#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use table_builder::{
    data::Value,
    rows::Fields,
    schema::{ColumnType, NewColumn, Table},
};
use tempfile::{TempDir, tempdir};

/// Scratch directory holding a data directory and any files a test writes.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// The binary, run inside the workspace against its data directory.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("table-builder").expect("binary exists");
        cmd.current_dir(self.path())
            .env_remove("TABLE_BUILDER_DATA_DIR")
            .env("RUST_LOG", "off")
            .arg("--data-dir")
            .arg(self.data_dir());
        cmd
    }

    /// Runs the binary and returns trimmed stdout, panicking on failure.
    pub fn run(&self, args: &[&str]) -> String {
        let output = self.cmd().args(args).output().expect("run binary");
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout)
            .expect("utf8 stdout")
            .trim()
            .to_string()
    }
}

pub fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// `Staff` with a text `name` and a boolean `active` column.
pub fn staff_table() -> Table {
    Table::new(
        "staff",
        "Staff",
        vec![
            NewColumn::new("Name", ColumnType::Text).with_id("name"),
            NewColumn::new("Active", ColumnType::Boolean).with_id("active"),
        ],
    )
    .expect("staff table")
}
