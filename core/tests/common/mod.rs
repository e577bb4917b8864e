//! Common test utilities and fixtures

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary directory holding generated CSV fixtures
pub struct TestWorkspace {
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().to_path_buf();
        Self { temp_dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory chunk files are written to
    pub fn output_dir(&self) -> PathBuf {
        self.path.join("keyscope_output")
    }

    /// Write raw content to `name`
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let file = self.path.join(name);
        fs::write(&file, content).expect("Failed to write fixture");
        file
    }

    /// Write a delimited file from a header and rows
    pub fn write_csv(&self, name: &str, delimiter: char, header: &[&str], rows: &[Vec<String>]) -> PathBuf {
        let sep = delimiter.to_string();
        let mut content = header.join(&sep);
        content.push('\n');
        for row in rows {
            content.push_str(&row.join(&sep));
            content.push('\n');
        }
        self.write(name, &content)
    }
}

/// Rows `id,region,amount` for the given ids
pub fn id_region_rows(ids: impl Iterator<Item = usize>) -> Vec<Vec<String>> {
    ids.map(|i| {
        vec![
            i.to_string(),
            ["north", "south", "east", "west"][i % 4].to_string(),
            format!("{}.{:02}", i * 3, i % 100),
        ]
    })
    .collect()
}

/// Deterministic pseudo-random generator for wide synthetic tables
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_below(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) % bound.max(1)
    }
}
