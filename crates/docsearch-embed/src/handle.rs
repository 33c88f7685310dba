use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use docsearch_core::config::EmbeddingSettings;
use docsearch_core::traits::Embedder;
use docsearch_core::{Error, Result};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::bert::{resolve_model_dir, BertEmbedder};
use crate::fake::FakeEmbedder;

type Loader = dyn Fn() -> Result<Arc<dyn Embedder>> + Send + Sync;

/// Shared handle to the process-wide embedding model.
///
/// Built once at startup and cloned into every service that embeds text.
/// The model is loaded on first use; concurrent first callers wait on the
/// same initialisation instead of loading twice. After that the model is
/// read-only and never torn down.
#[derive(Clone)]
pub struct ModelHandle {
    inner: Arc<Inner>,
}

struct Inner {
    dimension: usize,
    loader: Arc<Loader>,
    model: OnceCell<Arc<dyn Embedder>>,
}

impl ModelHandle {
    /// A handle whose model is produced by `loader` on first use. The loaded
    /// model must report `dimension`.
    pub fn new<F>(dimension: usize, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Embedder>> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(Inner { dimension, loader: Arc::new(loader), model: OnceCell::new() }) }
    }

    /// A handle around an already constructed model.
    pub fn from_embedder(embedder: Arc<dyn Embedder>) -> Self {
        let dimension = embedder.dim();
        let loader_model = embedder.clone();
        Self {
            inner: Arc::new(Inner {
                dimension,
                loader: Arc::new(move || Ok(loader_model.clone())),
                model: OnceCell::new_with(Some(embedder)),
            }),
        }
    }

    /// Build the handle described by configuration. `APP_USE_FAKE_EMBEDDINGS=1`
    /// forces the fake embedder regardless of `use_fake`.
    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        let dimension = settings.dimension;
        if settings.use_fake || fake_forced_by_env() {
            info!(dimension, "using fake embeddings");
            return Self::new(dimension, move || Ok(Arc::new(FakeEmbedder::new(dimension)) as Arc<dyn Embedder>));
        }
        let configured = settings.model_dir.clone();
        let max_len = settings.max_len;
        Self::new(dimension, move || {
            let dir: PathBuf = resolve_model_dir(&configured)?;
            Ok(Arc::new(BertEmbedder::load(&dir, max_len)?) as Arc<dyn Embedder>)
        })
    }

    pub fn dimension(&self) -> usize {
        self.inner.dimension
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.model.initialized()
    }

    /// The model, loading it on the blocking pool if this is the first call.
    pub async fn get(&self) -> Result<Arc<dyn Embedder>> {
        let expected = self.inner.dimension;
        let loader = self.inner.loader.clone();
        let model = self
            .inner
            .model
            .get_or_try_init(|| async move {
                let started = Instant::now();
                let model = tokio::task::spawn_blocking(move || loader())
                    .await
                    .map_err(|e| Error::Embedding(format!("model initialisation aborted: {e}")))??;
                if model.dim() != expected {
                    return Err(Error::Embedding(format!(
                        "model {} produces {}-d vectors, configured dimension is {expected}",
                        model.model_id(),
                        model.dim()
                    )));
                }
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(model = model.model_id(), elapsed_ms, "embedding model ready");
                Ok(model)
            })
            .await?;
        Ok(model.clone())
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding("model returned no vector".into()))
    }

    /// Embed `texts` in one model call. Every output is checked against the
    /// configured dimension.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(Error::Embedding(format!("input {i} of batch is empty or whitespace")));
        }
        let model = self.get().await?;
        let owned = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || model.embed_batch(&owned))
            .await
            .map_err(|e| Error::Embedding(format!("embedding task aborted: {e}")))??;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "model returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.inner.dimension) {
            return Err(Error::Embedding(format!(
                "dimension mismatch: got {} expected {}",
                v.len(),
                self.inner.dimension
            )));
        }
        debug!(batch = texts.len(), "embedded batch");
        Ok(vectors)
    }
}

fn fake_forced_by_env() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}
