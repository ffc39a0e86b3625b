#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

use ber_stock::data::Value;
use ber_stock::frame::{Column, Frame};

/// Scratch directory helper that cleans up files automatically on drop.
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

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn string_cells(values: &[&str]) -> Vec<Option<Value>> {
    values
        .iter()
        .map(|v| {
            if v.is_empty() {
                None
            } else {
                Some(Value::String(v.to_string()))
            }
        })
        .collect()
}

pub fn float_cells(values: &[Option<f64>]) -> Vec<Option<Value>> {
    values.iter().map(|v| v.map(Value::Float)).collect()
}

pub fn int_cells(values: &[Option<i64>]) -> Vec<Option<Value>> {
    values.iter().map(|v| v.map(Value::Integer)).collect()
}

pub fn frame(columns: Vec<Column>) -> Frame {
    Frame::from_columns(columns).expect("valid fixture frame")
}
