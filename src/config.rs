//! Engine configuration, read from YAML or JSON.
//!
//! ```yaml
//! grammar_dir: grammars
//! extension: duet
//! max_call_depth: 10000
//! profiles:
//!   epidoc: epidoc-lite
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{ParseOptions, DEFAULT_MAX_CALL_DEPTH};

pub const DEFAULT_EXTENSION: &str = "duet";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    #[diagnostic(code(duet::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}: {source}", .path.display())]
    #[diagnostic(code(duet::config::yaml))]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    #[diagnostic(code(duet::config::json))]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory grammar references are resolved against.
    pub grammar_dir: PathBuf,
    /// File extension tried when a reference names no file directly.
    pub extension: String,
    pub max_call_depth: usize,
    /// Request `type` values mapped to grammar references.
    pub profiles: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grammar_dir: PathBuf::from("grammars"),
            extension: DEFAULT_EXTENSION.to_string(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            profiles: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Loads a config file; `.json` files are read as JSON, everything else as YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let mut config: EngineConfig = if is_json {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };

        // a relative grammar_dir is relative to the config file
        if config.grammar_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.grammar_dir = parent.join(&config.grammar_dir);
            }
        }
        Ok(config)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            max_call_depth: self.max_call_depth,
        }
    }
}
