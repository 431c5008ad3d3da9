//! Where grammar text comes from.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no grammar named '{0}'")]
    NotFound(String),

    #[error("'{0}' is not a valid grammar reference")]
    InvalidReference(String),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolves a grammar reference to grammar source text.
pub trait GrammarSource: Send + Sync {
    fn fetch(&self, reference: &str) -> Result<String, SourceError>;
}

/// Grammar files under one directory: `<root>/<reference>` or `<root>/<reference>.<extension>`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    extension: String,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: crate::config::DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Candidate file for `reference`, refusing anything that would leave the root.
    fn resolve(&self, reference: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(reference);
        let contained = !reference.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !contained {
            return Err(SourceError::InvalidReference(reference.to_string()));
        }

        let exact = self.root.join(relative);
        if exact.is_file() {
            return Ok(exact);
        }
        Ok(self.root.join(format!("{}.{}", reference, self.extension)))
    }
}

impl GrammarSource for DirectorySource {
    fn fetch(&self, reference: &str) -> Result<String, SourceError> {
        let path = self.resolve(reference)?;
        std::fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound(reference.to_string()),
            _ => SourceError::Io { path, source },
        })
    }
}

/// Grammars held in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    grammars: RwLock<HashMap<String, String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, reference: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(reference, text);
        self
    }

    /// Adds or replaces a grammar. Already cached grammars are not affected.
    pub fn insert(&self, reference: impl Into<String>, text: impl Into<String>) {
        self.grammars.write().insert(reference.into(), text.into());
    }

    pub fn remove(&self, reference: &str) -> Option<String> {
        self.grammars.write().remove(reference)
    }
}

impl GrammarSource for MemorySource {
    fn fetch(&self, reference: &str) -> Result<String, SourceError> {
        self.grammars
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(reference.to_string()))
    }
}
