//! Indexing and retrieval services wired over the core traits.
//!
//! `Services` assembles the default stack from configuration: JSON metadata
//! store, LanceDB collections and the shared embedding model.

pub mod indexer;
pub mod queue;
pub mod retrieval;
pub mod status;

pub use indexer::{CollectionSpec, IndexOutcome, IndexReport, IndexingPipeline, PipelineOptions, Upload};
pub use queue::{IndexEvent, IndexQueue};
pub use retrieval::RetrievalService;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use docsearch_core::config::{resolve_with_base, Settings};
use docsearch_core::extract::DocumentExtractor;
use docsearch_core::metadata::{JsonMetadataStore, MemoryMetadataStore};
use docsearch_core::traits::{MetadataStore, TextExtractor, VectorIndex};
use docsearch_core::Result;
use docsearch_embed::ModelHandle;
use docsearch_vector::{LanceVectorIndex, MemoryVectorIndex};

pub struct Services {
    pub settings: Settings,
    pub model: ModelHandle,
    pub metadata: Arc<dyn MetadataStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub pipeline: Arc<IndexingPipeline>,
    pub retrieval: RetrievalService,
}

fn resolve_uri(base: &Path, uri: &str) -> String {
    if uri.contains("://") {
        uri.to_string()
    } else {
        resolve_with_base(base, uri).to_string_lossy().to_string()
    }
}

impl Services {
    /// The persistent stack. Relative paths in `settings` resolve against
    /// `base`. The collection is created or verified before returning.
    pub async fn open(settings: Settings, base: &Path) -> Result<Self> {
        let uri = resolve_uri(base, &settings.vector.uri);
        let metadata_path: PathBuf = resolve_with_base(base, &settings.metadata.path);
        info!(vector_uri = %uri, metadata = %metadata_path.display(), "opening stores");
        let metadata: Arc<dyn MetadataStore> = Arc::new(JsonMetadataStore::open(&metadata_path).await?);
        let vectors: Arc<dyn VectorIndex> = Arc::new(LanceVectorIndex::connect(&uri).await?);
        let model = ModelHandle::from_settings(&settings.embedding);
        Self::assemble(settings, model, metadata, vectors, Arc::new(DocumentExtractor::new())).await
    }

    /// Everything in memory; nothing touches disk except reading uploads.
    pub async fn in_memory(settings: Settings, model: ModelHandle) -> Result<Self> {
        Self::assemble(
            settings,
            model,
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(DocumentExtractor::new()),
        )
        .await
    }

    pub async fn assemble(
        settings: Settings,
        model: ModelHandle,
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorIndex>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self> {
        settings.validate()?;
        let pipeline = Arc::new(IndexingPipeline::new(
            PipelineOptions::from_settings(&settings),
            extractor,
            model.clone(),
            vectors.clone(),
            metadata.clone(),
        )?);
        pipeline.ensure_ready().await?;
        let retrieval = RetrievalService::new(
            model.clone(),
            vectors.clone(),
            metadata.clone(),
            settings.vector.collection.clone(),
            &settings.search,
        );
        Ok(Self { settings, model, metadata, vectors, pipeline, retrieval })
    }

    pub fn spawn_queue(&self, capacity: usize) -> IndexQueue {
        IndexQueue::spawn(self.pipeline.clone(), capacity)
    }
}
