//! Pipeline document persistence.
//!
//! Every pass does one full read, mutate, truncate and rewrite cycle against
//! the same file. The process assumes exclusive access for its lifetime; no
//! lock is taken.
mod document;

pub use document::{JobAppend, WorkflowDocument};

use crate::error::{Result, ScopeError};
use std::fs;
use std::path::{Path, PathBuf};

/// The on-disk pipeline document.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    path: PathBuf,
}

impl WorkflowFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<WorkflowDocument> {
        let text = fs::read_to_string(&self.path)
            .map_err(|err| ScopeError::io(format!("read {}", self.path.display()), err))?;
        WorkflowDocument::parse(&text)
    }

    pub fn save(&self, document: &WorkflowDocument) -> Result<()> {
        let text = document.to_yaml()?;
        fs::write(&self.path, text.as_bytes())
            .map_err(|err| ScopeError::io(format!("write {}", self.path.display()), err))?;
        tracing::debug!(path = %self.path.display(), bytes = text.len(), "workflow rewritten");
        Ok(())
    }

    /// Read the document, apply `mutate`, and write it back.
    ///
    /// Nothing is written when `mutate` fails.
    pub fn update<T>(&self, mutate: impl FnOnce(&mut WorkflowDocument) -> Result<T>) -> Result<T> {
        let mut document = self.load()?;
        let outcome = mutate(&mut document)?;
        self.save(&document)?;
        Ok(outcome)
    }
}
