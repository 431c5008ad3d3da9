//! # Duet Test Helpers
//!
//! Shared grammar fixtures and the YAML case loader used by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use duet::transform::{DirectorySource, MemorySource, Transcoder};
use serde::Deserialize;
use walkdir::WalkDir;

/// Directory holding the shipped grammars.
pub fn grammar_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("grammars")
}

/// Directory holding YAML transform cases.
pub fn cases_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cases")
}

/// Transcoder over the shipped grammars.
pub fn shipped_transcoder() -> Transcoder {
    Transcoder::new(DirectorySource::new(grammar_dir()))
}

/// Transcoder over one in-memory grammar named `g`.
pub fn memory_transcoder(grammar: &str) -> Transcoder {
    Transcoder::new(MemorySource::new().with("g", grammar))
}

/// A single transform case from a YAML fixture file.
#[derive(Debug, Deserialize)]
pub struct TransformCase {
    pub name: String,
    pub grammar: String,
    pub direction: String,
    pub input: String,
    /// Expected output, for cases that succeed.
    pub expected: Option<String>,
    /// Expected diagnostic code suffix, e.g. `no_rule_matches`, for cases that fail.
    pub expect_error: Option<String>,
    /// Also require the output to transform back to the input.
    #[serde(default)]
    pub round_trip: bool,
    #[serde(default)]
    pub skip: bool,
}

/// Discovers all YAML files recursively under the given root directory.
pub fn discover_yaml_files<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Loads all cases from a YAML file. Panics with the file name on malformed fixtures.
pub fn load_cases(path: &Path) -> Vec<TransformCase> {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e));
    serde_yaml::from_str(&content)
        .unwrap_or_else(|e| panic!("failed to parse YAML in {}: {}", path.display(), e))
}
