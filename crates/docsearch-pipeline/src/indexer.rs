//! Document indexing: extract, chunk, embed, upsert.
//!
//! A document moves `NotIndexed -> Indexing -> Indexed`, or to `Failed` with
//! the reason recorded. `Failed` and a stale `Indexing` are both retryable;
//! point ids are deterministic, so a re-run overwrites instead of duplicating.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use docsearch_core::chunker::{Chunker, ChunkingConfig};
use docsearch_core::config::Settings;
use docsearch_core::extract::guess_mimetype;
use docsearch_core::traits::{MetadataStore, TextExtractor, VectorIndex};
use docsearch_core::types::{Document, DocumentId, IndexState, Metric, VectorPoint};
use docsearch_core::{Error, Result};
use docsearch_embed::ModelHandle;

/// Target collection of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunking: ChunkingConfig,
    /// Chunks per embedding call.
    pub batch_size: usize,
    pub collection: CollectionSpec,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chunking: settings.chunking,
            batch_size: settings.embedding.batch_size,
            collection: CollectionSpec {
                name: settings.vector.collection.clone(),
                dimension: settings.embedding.dimension,
                metric: settings.vector.metric,
            },
        }
    }
}

/// A file handed over for indexing.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub path: PathBuf,
    /// Name shown to users; defaults to the file name.
    pub original_name: Option<String>,
    /// Guessed from the extension when absent.
    pub mimetype: Option<String>,
    pub description: String,
}

impl Upload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub document_id: DocumentId,
    /// Points stored. Whitespace-only windows are not embedded, so this can
    /// be lower than the chunker's window count and stored positions can
    /// skip numbers (`doc_0`, `doc_3`).
    pub chunk_count: usize,
    pub text_len: usize,
    pub state: IndexState,
    /// The document was already indexed and nothing was embedded.
    pub already_indexed: bool,
}

#[derive(Debug, Clone)]
pub enum IndexOutcome {
    Indexed(IndexReport),
    AlreadyIndexed(Document),
}

impl IndexOutcome {
    pub fn report(&self) -> IndexReport {
        match self {
            Self::Indexed(report) => report.clone(),
            Self::AlreadyIndexed(doc) => IndexReport {
                document_id: doc.id.clone(),
                chunk_count: doc.chunk_count,
                text_len: doc.text_len,
                state: doc.state,
                already_indexed: true,
            },
        }
    }
}

pub struct IndexingPipeline {
    chunker: Chunker,
    batch_size: usize,
    collection: CollectionSpec,
    extractor: Arc<dyn TextExtractor>,
    model: ModelHandle,
    vectors: Arc<dyn VectorIndex>,
    metadata: Arc<dyn MetadataStore>,
}

impl IndexingPipeline {
    pub fn new(
        options: PipelineOptions,
        extractor: Arc<dyn TextExtractor>,
        model: ModelHandle,
        vectors: Arc<dyn VectorIndex>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        let chunker = Chunker::new(options.chunking)?;
        if options.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding batch size must be > 0".into()));
        }
        if model.dimension() != options.collection.dimension {
            return Err(Error::InvalidConfig(format!(
                "model dimension {} does not match collection dimension {}",
                model.dimension(),
                options.collection.dimension
            )));
        }
        Ok(Self {
            chunker,
            batch_size: options.batch_size,
            collection: options.collection,
            extractor,
            model,
            vectors,
            metadata,
        })
    }

    pub fn collection(&self) -> &CollectionSpec {
        &self.collection
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn vectors(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Create the collection if needed. A schema conflict is fatal and must
    /// stop startup.
    pub async fn ensure_ready(&self) -> Result<()> {
        let c = &self.collection;
        self.vectors.ensure_collection(&c.name, c.dimension, c.metric).await.inspect_err(|e| {
            error!(
                collection = %c.name,
                dimension = c.dimension,
                metric = %c.metric,
                error = %e,
                "vector collection unusable"
            );
        })
    }

    /// Store a new document record for `upload`. Indexing is a separate step.
    pub async fn register_upload(&self, upload: Upload) -> Result<Document> {
        let meta = tokio::fs::metadata(&upload.path)
            .await
            .map_err(|e| Error::InvalidInput(format!("cannot read upload {}: {e}", upload.path.display())))?;
        if !meta.is_file() {
            return Err(Error::InvalidInput(format!("{} is not a file", upload.path.display())));
        }
        let mimetype = upload.mimetype.unwrap_or_else(|| guess_mimetype(&upload.path).to_string());
        if !self.extractor.supports(&mimetype) {
            return Err(Error::InvalidInput(format!("unsupported file type '{mimetype}'")));
        }

        let mut doc = Document::new(Uuid::new_v4().simple().to_string(), upload.path.to_string_lossy());
        doc.size = meta.len();
        doc.mimetype = mimetype;
        doc.description = upload.description;
        if let Some(name) = upload.original_name {
            doc.original_name = name;
        }
        self.metadata.insert(doc.clone()).await?;
        info!(
            document_id = %doc.id,
            name = %doc.original_name,
            size = doc.size,
            mimetype = %doc.mimetype,
            "registered upload"
        );
        Ok(doc)
    }

    /// Index one document. Already indexed documents are returned untouched.
    pub async fn index_document(&self, id: &str) -> Result<IndexOutcome> {
        let mut doc = self.metadata.get(id).await?.ok_or_else(|| Error::NotFound(format!("document {id}")))?;
        if doc.is_indexed() {
            debug!(document_id = id, "already indexed; skipping");
            return Ok(IndexOutcome::AlreadyIndexed(doc));
        }
        if doc.state == IndexState::Indexing {
            warn!(document_id = id, "resuming interrupted indexing run");
        }

        doc.state = IndexState::Indexing;
        doc.last_error = None;
        self.metadata.update(&doc).await?;

        let started = Instant::now();
        match self.run(&doc).await {
            Ok((chunk_count, text_len)) => {
                doc.state = IndexState::Indexed;
                doc.chunk_count = chunk_count;
                doc.text_len = text_len;
                doc.indexed_at = Some(Utc::now());
                self.metadata.update(&doc).await?;
                info!(
                    document_id = id,
                    chunks = chunk_count,
                    chars = text_len,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "document indexed"
                );
                Ok(IndexOutcome::Indexed(IndexReport {
                    document_id: doc.id,
                    chunk_count,
                    text_len,
                    state: IndexState::Indexed,
                    already_indexed: false,
                }))
            }
            Err(e) => {
                error!(document_id = id, error = %e, "indexing failed");
                doc.state = IndexState::Failed;
                doc.last_error = Some(e.to_string());
                if let Err(persist) = self.metadata.update(&doc).await {
                    warn!(document_id = id, error = %persist, "could not record failed state");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, doc: &Document) -> Result<(usize, usize)> {
        let text = self.extractor.extract(Path::new(&doc.path)).await?;
        if text.trim().is_empty() {
            return Err(Error::extraction(&doc.path, "no text content"));
        }
        let text_len = text.chars().count();
        // Whitespace-only windows carry nothing to retrieve. Kept chunks keep
        // their window position so point ids still map to text offsets.
        let chunks: Vec<_> = self.chunker.split(&text).into_iter().filter(|c| !c.text.trim().is_empty()).collect();
        debug!(document_id = %doc.id, chunks = chunks.len(), chars = text_len, "chunked");

        let mut points = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.model.embed_batch(&texts).await?;
            points.extend(
                batch.iter().zip(vectors).map(|(chunk, v)| VectorPoint::from_chunk(&doc.id, &doc.path, chunk, v)),
            );
            debug!(document_id = %doc.id, embedded = points.len(), total = chunks.len(), "embedded batch");
        }

        self.vectors.upsert(&self.collection.name, &points).await?;
        Ok((points.len(), text_len))
    }

    /// Remove a document's points and its record. Returns false when the
    /// record did not exist.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let removed_points = self.vectors.delete_document(&self.collection.name, id).await?;
        let existed = self.metadata.delete(id).await?;
        info!(document_id = id, points = removed_points, existed, "deleted document");
        Ok(existed)
    }
}
