//! Document metadata stores.
//!
//! `MemoryMetadataStore` keeps records in a map for tests and ephemeral runs.
//! `JsonMetadataStore` persists the same map to a JSON file, rewriting it
//! through a temp file + rename on every change so a crash never leaves a
//! half-written store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::MetadataStore;
use crate::types::{Document, DocumentId};

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    docs: RwLock<BTreeMap<DocumentId, Document>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn get_many(&self, ids: &[DocumentId]) -> Result<Vec<Document>> {
        let docs = self.docs.read().await;
        Ok(ids.iter().filter_map(|id| docs.get(id).cloned()).collect())
    }

    async fn list(&self) -> Result<Vec<Document>> {
        Ok(sorted_by_upload(self.docs.read().await.values().cloned().collect()))
    }

    async fn insert(&self, document: Document) -> Result<()> {
        self.docs.write().await.insert(document.id.clone(), document);
        Ok(())
    }

    async fn update(&self, document: &Document) -> Result<()> {
        let mut docs = self.docs.write().await;
        match docs.get_mut(&document.id) {
            Some(slot) => {
                *slot = document.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("document {}", document.id))),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.docs.write().await.remove(id).is_some())
    }
}

#[derive(Debug)]
pub struct JsonMetadataStore {
    path: PathBuf,
    docs: RwLock<BTreeMap<DocumentId, Document>>,
}

impl JsonMetadataStore {
    /// Open the store at `path`, starting empty when the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let docs = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<Document> = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Metadata(format!("corrupt store {}: {e}", path.display())))?;
                list.into_iter().map(|d| (d.id.clone(), d)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), documents = docs.len(), "opened metadata store");
        Ok(Self { path, docs: RwLock::new(docs) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Called with the write lock held so concurrent writers serialise. The
    // in-memory map is only replaced once the file write has succeeded.
    async fn persist(&self, docs: &BTreeMap<DocumentId, Document>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let list: Vec<&Document> = docs.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn get_many(&self, ids: &[DocumentId]) -> Result<Vec<Document>> {
        let docs = self.docs.read().await;
        Ok(ids.iter().filter_map(|id| docs.get(id).cloned()).collect())
    }

    async fn list(&self) -> Result<Vec<Document>> {
        Ok(sorted_by_upload(self.docs.read().await.values().cloned().collect()))
    }

    async fn insert(&self, document: Document) -> Result<()> {
        let mut docs = self.docs.write().await;
        let mut next = docs.clone();
        next.insert(document.id.clone(), document);
        self.persist(&next).await?;
        *docs = next;
        Ok(())
    }

    async fn update(&self, document: &Document) -> Result<()> {
        let mut docs = self.docs.write().await;
        if !docs.contains_key(&document.id) {
            return Err(Error::NotFound(format!("document {}", document.id)));
        }
        let mut next = docs.clone();
        next.insert(document.id.clone(), document.clone());
        self.persist(&next).await?;
        *docs = next;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut docs = self.docs.write().await;
        if !docs.contains_key(id) {
            return Ok(false);
        }
        let mut next = docs.clone();
        next.remove(id);
        self.persist(&next).await?;
        *docs = next;
        Ok(true)
    }
}

// Newest upload first.
fn sorted_by_upload(mut docs: Vec<Document>) -> Vec<Document> {
    docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    docs
}
