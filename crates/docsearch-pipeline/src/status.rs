//! Indexing status reports built from the metadata store.

use serde::Serialize;

use docsearch_core::traits::MetadataStore;
use docsearch_core::types::{IndexStatus, StatusLabel};
use docsearch_core::{Error, Result};

pub async fn index_status(metadata: &dyn MetadataStore) -> Result<Vec<IndexStatus>> {
    Ok(metadata.list().await?.iter().map(|d| d.status()).collect())
}

pub async fn document_status(metadata: &dyn MetadataStore, id: &str) -> Result<IndexStatus> {
    metadata
        .get(id)
        .await?
        .map(|d| d.status())
        .ok_or_else(|| Error::NotFound(format!("document {id}")))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub indexing: usize,
    pub failed: usize,
    pub chunks: usize,
}

pub fn summarize(statuses: &[IndexStatus]) -> StatusSummary {
    statuses.iter().fold(StatusSummary::default(), |mut acc, s| {
        acc.total += 1;
        acc.chunks += s.chunks_processed;
        match s.status {
            StatusLabel::Completed => acc.completed += 1,
            StatusLabel::Pending => acc.pending += 1,
            StatusLabel::Indexing => acc.indexing += 1,
            StatusLabel::Failed => acc.failed += 1,
        }
        acc
    })
}
