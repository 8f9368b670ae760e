use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Errors surfaced by the chunk store and retrieval engine
#[derive(Error, Debug)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dimension mismatch for collection {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read document {}: {reason}", path.display())]
    Document { path: PathBuf, reason: String },

    #[error("corrupt chunk snapshot {}: {source}", path.display())]
    CorruptSnapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("embedding failed: {0}")]
    Embedding(String),
}

impl RagError {
    /// True for errors caused by inconsistent configuration rather than I/O or backends
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RagError::Configuration(_) | RagError::DimensionMismatch { .. }
        )
    }

    /// True for errors reading documents or snapshot files
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            RagError::Io { .. } | RagError::Document { .. } | RagError::CorruptSnapshot { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let mismatch = RagError::DimensionMismatch {
            collection: "docs".to_string(),
            expected: 384,
            actual: 256,
        };
        assert!(mismatch.is_configuration());
        assert!(!mismatch.is_io());
        assert_eq!(
            mismatch.to_string(),
            "dimension mismatch for collection docs: expected 384, got 256"
        );

        let unavailable = RagError::IndexUnavailable("connection refused".to_string());
        assert!(!unavailable.is_configuration());
        assert!(!unavailable.is_io());
    }
}
