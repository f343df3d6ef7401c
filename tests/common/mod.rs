#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory for sources and database files, removed on drop.
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

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }
}

/// `rows` synthetic people with every third email on `.com` and every other website on https.
pub fn people_csv(rows: usize) -> String {
    let mut csv = String::from("Name,Email Address,Website,Subscription Date\n");
    for i in 0..rows {
        let domain = if i % 3 == 0 { "com" } else { "it" };
        let scheme = if i % 2 == 0 { "https" } else { "http" };
        let _ = writeln!(
            csv,
            "Person {i},p{i}@mail.{domain},{scheme}://p{i}.example.info,20{:02}-0{}-1{}",
            18 + i % 4,
            1 + i % 9,
            i % 10
        );
    }
    csv
}
