use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use docsearch_core::config::SearchSettings;
use docsearch_core::traits::{MetadataStore, VectorIndex};
use docsearch_core::types::{rank_by_score, DocumentId, DocumentSummary, SearchResult};
use docsearch_core::{Error, Result};
use docsearch_embed::ModelHandle;

/// Semantic search over the indexed collection, joined with document metadata.
#[derive(Clone)]
pub struct RetrievalService {
    model: ModelHandle,
    vectors: Arc<dyn VectorIndex>,
    metadata: Arc<dyn MetadataStore>,
    collection: String,
    default_limit: usize,
    max_limit: usize,
}

impl RetrievalService {
    pub fn new(
        model: ModelHandle,
        vectors: Arc<dyn VectorIndex>,
        metadata: Arc<dyn MetadataStore>,
        collection: impl Into<String>,
        limits: &SearchSettings,
    ) -> Self {
        Self {
            model,
            vectors,
            metadata,
            collection: collection.into(),
            default_limit: limits.default_limit,
            max_limit: limits.max_limit,
        }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub async fn search_default(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.search(query, self.default_limit).await
    }

    /// Up to `limit` passages ranked by similarity. Limits above the
    /// configured maximum are clamped.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query must not be empty".into()));
        }
        if limit == 0 {
            return Err(Error::InvalidInput("limit must be positive".into()));
        }
        let limit = if limit > self.max_limit {
            debug!(requested = limit, max = self.max_limit, "clamping search limit");
            self.max_limit
        } else {
            limit
        };

        let started = Instant::now();
        let results = self.run(query, limit).await.inspect_err(|e| {
            error!(query, limit, error = %e, "search failed");
        })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(query, limit, results = results.len(), elapsed_ms, "search complete");
        Ok(results)
    }

    async fn run(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let vector = self.model.embed(query).await?;
        let mut hits = self.vectors.search(&self.collection, &vector, limit).await?;
        rank_by_score(&mut hits, |h| h.score);

        let mut seen = HashSet::new();
        let ids: Vec<DocumentId> = hits
            .iter()
            .filter(|h| seen.insert(h.payload.document_id.as_str()))
            .map(|h| h.payload.document_id.clone())
            .collect();
        let documents: HashMap<DocumentId, DocumentSummary> =
            self.metadata.get_many(&ids).await?.into_iter().map(|d| (d.id.clone(), d.summary())).collect();
        if documents.len() < ids.len() {
            debug!(missing = ids.len() - documents.len(), "search hits reference deleted documents");
        }

        Ok(hits
            .into_iter()
            .map(|h| SearchResult {
                document: documents.get(&h.payload.document_id).cloned(),
                document_id: h.payload.document_id,
                text: h.payload.text,
                score: h.score,
                source_path: h.payload.source_path,
                chunk_index: h.payload.chunk_index,
            })
            .collect())
    }
}
