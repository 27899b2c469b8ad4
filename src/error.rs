//! Error taxonomy shared by the change-detection and workflow modules.
//!
//! Each variant maps to one failure class so callers can decide whether an
//! operation may be retried. Only read-only lookups (diffs, PR listings) are
//! ever retried; everything else is fatal for the invocation.
use std::path::PathBuf;

/// Result alias for the core modules.
pub type Result<T> = std::result::Result<T, ScopeError>;

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// A git command failed or produced output we could not interpret.
    #[error("diff resolution failed: {0}")]
    DiffResolution(String),

    /// The hosting API was unreachable, answered with a non-success status,
    /// or returned a body that did not match the expected shape.
    #[error("hosting api request failed: {0}")]
    Network(String),

    /// The packaging tool exited non-zero or printed something unusable.
    #[error("packaging tool failed for {handler}: {detail}")]
    PackagingTool { handler: String, detail: String },

    /// The workflow document is missing a key or job slot we need.
    #[error("workflow document has no {path}")]
    DocumentSchema { path: String },

    /// A descriptor field still carries a `${...}` token after resolution.
    #[error("unresolved placeholder ${{{token}}} in {field}")]
    UnresolvedPlaceholder { field: String, token: String },

    #[error("invalid deployment descriptor {}: {detail}", path.display())]
    Descriptor { path: PathBuf, detail: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ScopeError {
    pub fn schema(path: impl Into<String>) -> Self {
        Self::DocumentSchema { path: path.into() }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether a failed call may be repeated without side effects.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DiffResolution(_) | Self::Network(_))
    }
}
