use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Schema conflict on collection '{collection}': {reason}")]
    SchemaConflict { collection: String, reason: String },

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Metadata store error: {0}")]
    Metadata(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index queue is closed")]
    QueueClosed,

    #[error("Background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn extraction(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Extraction { path: path.into(), reason: reason.to_string() }
    }

    pub fn schema_conflict(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaConflict { collection: collection.into(), reason: reason.into() }
    }

    /// Schema conflicts must halt indexing entirely until the collection is fixed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SchemaConflict { .. } | Self::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_display_names_path() {
        let err = Error::extraction("/tmp/a.pdf", "file not found");
        assert_eq!(err.to_string(), "Extraction failed for /tmp/a.pdf: file not found");
    }

    #[test]
    fn schema_conflict_is_fatal() {
        let err = Error::schema_conflict("pdf_embeddings", "dimension 768 != 384");
        assert!(err.is_fatal());
        assert!(!Error::VectorStore("timeout".into()).is_fatal());
    }
}
