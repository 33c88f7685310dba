use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::types::{Document, DocumentId, Metric, ScoredPoint, VectorPoint};

/// Maps text to fixed-dimension, L2-normalised vectors.
///
/// Implementations are CPU/GPU bound and synchronous; async callers go
/// through `docsearch_embed::ModelHandle`, which runs them on the blocking pool.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Upstream raw-text extraction for a stored document.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn supports(&self, mimetype: &str) -> bool;
    async fn extract(&self, path: &Path) -> Result<String>;
}

/// CRUD over document records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Document>>;
    /// Returns the records that exist, in the order of `ids`; unknown ids are skipped.
    async fn get_many(&self, ids: &[DocumentId]) -> Result<Vec<Document>>;
    async fn list(&self) -> Result<Vec<Document>>;
    async fn insert(&self, document: Document) -> Result<()>;
    /// Fails with `Error::NotFound` when the record does not exist.
    async fn update(&self, document: &Document) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Named collections of `(id, vector, payload)` points.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent create. Fails with `Error::SchemaConflict` when the
    /// existing collection has a different dimension or metric.
    async fn ensure_collection(&self, name: &str, dimension: usize, metric: Metric) -> Result<()>;
    /// Insert or overwrite by id. The batch is validated up front and
    /// written all-or-nothing.
    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<usize>;
    /// Up to `limit` points by descending score; `limit == 0` is invalid input.
    async fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredPoint>>;
    async fn count(&self, name: &str) -> Result<usize>;
    async fn delete_document(&self, name: &str, document_id: &str) -> Result<usize>;
}
