use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use docsearch_core::config::{EmbeddingSettings, Settings};
use docsearch_core::extract::DocumentExtractor;
use docsearch_core::metadata::MemoryMetadataStore;
use docsearch_core::traits::{Embedder, MetadataStore, VectorIndex};
use docsearch_core::types::{Document, DocumentId, IndexState, Metric, ScoredPoint, StatusLabel, VectorPoint};
use docsearch_core::{Error, Result};
use docsearch_embed::{FakeEmbedder, ModelHandle};
use docsearch_pipeline::status::{document_status, index_status, summarize};
use docsearch_pipeline::{IndexOutcome, Services, Upload};
use docsearch_vector::MemoryVectorIndex;

const DIM: usize = 384;

fn settings() -> Settings {
    Settings {
        embedding: EmbeddingSettings { use_fake: true, dimension: DIM, ..EmbeddingSettings::default() },
        ..Settings::default()
    }
}

fn fake_model() -> ModelHandle {
    ModelHandle::from_embedder(Arc::new(FakeEmbedder::new(DIM)))
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write fixture");
    path
}

async fn upload_and_index(services: &Services, path: PathBuf) -> anyhow::Result<String> {
    let doc = services.pipeline.register_upload(Upload::new(path)).await?;
    services.pipeline.index_document(&doc.id).await?;
    Ok(doc.id)
}

#[tokio::test]
async fn indexes_and_retrieves_overlapping_chunks() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::in_memory(settings(), fake_model()).await?;
    let doc = services.pipeline.register_upload(Upload::new(write(tmp.path(), "a.txt", &"A".repeat(1500)))).await?;
    let other = upload_and_index(&services, write(tmp.path(), "b.txt", "bananas grow in tropical climates")).await?;

    let outcome = services.pipeline.index_document(&doc.id).await?;
    let report = outcome.report();
    assert_eq!(report.chunk_count, 2);
    assert_eq!(report.text_len, 1500);
    assert_eq!(report.state, IndexState::Indexed);
    assert!(!report.already_indexed);

    let query = services.model.embed(&"A".repeat(1000)).await?;
    let points = services.vectors.search("pdf_embeddings", &query, 5).await?;
    let mut ids: Vec<&str> = points.iter().filter(|p| p.payload.document_id == doc.id).map(|p| p.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, [format!("{}_0", doc.id), format!("{}_1", doc.id)]);

    let results = services.retrieval.search(&"A".repeat(1000), 1).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, doc.id);
    assert_eq!(results[0].text, "A".repeat(1000));
    assert_eq!(results[0].chunk_index, 0);
    assert_eq!(results[0].document.as_ref().map(|d| d.original_name.as_str()), Some("a.txt"));

    let all = services.retrieval.search(&"A".repeat(1000), 5).await?;
    let unrelated = all.iter().find(|r| r.document_id == other).expect("other document listed");
    assert!(all[0].score > unrelated.score);
    assert!((all[0].score - 1.0).abs() < 1e-4);
    Ok(())
}

#[tokio::test]
async fn exact_chunk_query_ranks_that_chunk_first() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut s = settings();
    s.chunking.chunk_size = 50;
    s.chunking.overlap = 0;
    let services = Services::in_memory(s, fake_model()).await?;

    let segments: Vec<String> = (0..10).map(|i| format!("subject{i:02} ").repeat(5)).collect();
    assert!(segments.iter().all(|seg| seg.chars().count() == 50));
    let id = upload_and_index(&services, write(tmp.path(), "ten.txt", &segments.concat())).await?;
    assert_eq!(services.vectors.count("pdf_embeddings").await?, 10);

    let results = services.retrieval.search(&segments[7], 3).await?;
    assert_eq!(results[0].document_id, id);
    assert_eq!(results[0].chunk_index, 7);
    assert_eq!(results[0].text, segments[7]);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    Ok(())
}

#[tokio::test]
async fn deleted_metadata_degrades_to_missing_document() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::in_memory(settings(), fake_model()).await?;
    let gone = upload_and_index(&services, write(tmp.path(), "gone.txt", "solar panels on the roof")).await?;
    let kept = upload_and_index(&services, write(tmp.path(), "kept.txt", "solar panels in the field")).await?;
    assert!(services.metadata.delete(&gone).await?);

    let results = services.retrieval.search("solar panels", 5).await?;
    assert_eq!(results.len(), 2);
    for r in &results {
        if r.document_id == gone {
            assert!(r.document.is_none());
        } else {
            assert_eq!(r.document_id, kept);
            assert!(r.document.is_some());
        }
    }
    Ok(())
}

struct CountingEmbedder {
    inner: FakeEmbedder,
    calls: Arc<AtomicUsize>,
}

impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str {
        "counting"
    }
    fn dim(&self) -> usize {
        self.inner.dim()
    }
    fn max_len(&self) -> usize {
        self.inner.max_len()
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }
}

#[tokio::test]
async fn already_indexed_documents_are_not_embedded_again() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let calls = Arc::new(AtomicUsize::new(0));
    let counting = CountingEmbedder { inner: FakeEmbedder::new(DIM), calls: calls.clone() };
    let model = ModelHandle::from_embedder(Arc::new(counting));
    let services = Services::in_memory(settings(), model).await?;

    let id = upload_and_index(&services, write(tmp.path(), "once.txt", &"word ".repeat(500))).await?;
    let embedded = calls.load(Ordering::SeqCst);
    assert_eq!(embedded, 3, "2500 chars at 1000/200 make three chunks");

    match services.pipeline.index_document(&id).await? {
        IndexOutcome::AlreadyIndexed(doc) => assert_eq!(doc.chunk_count, 3),
        other => panic!("expected AlreadyIndexed, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), embedded);
    Ok(())
}

#[tokio::test]
async fn extraction_failure_marks_failed_and_is_retryable() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::in_memory(settings(), fake_model()).await?;
    let path = write(tmp.path(), "flaky.txt", "temporary content");
    let doc = services.pipeline.register_upload(Upload::new(&path)).await?;
    std::fs::remove_file(&path)?;

    let err = services.pipeline.index_document(&doc.id).await.expect_err("missing file");
    assert!(matches!(err, Error::Extraction { .. }), "{err:?}");
    let stored = services.metadata.get(&doc.id).await?.expect("record kept");
    assert_eq!(stored.state, IndexState::Failed);
    assert!(stored.last_error.is_some());
    assert_eq!(document_status(services.metadata.as_ref(), &doc.id).await?.status, StatusLabel::Failed);

    write(tmp.path(), "flaky.txt", "content is back");
    services.pipeline.index_document(&doc.id).await?;
    let stored = services.metadata.get(&doc.id).await?.expect("record kept");
    assert_eq!(stored.state, IndexState::Indexed);
    assert_eq!(stored.last_error, None);
    assert!(stored.indexed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn whitespace_windows_are_skipped_and_positions_kept() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut s = settings();
    s.chunking.chunk_size = 20;
    s.chunking.overlap = 0;
    let services = Services::in_memory(s, fake_model()).await?;

    // Four windows; the middle two are only spaces.
    let text = format!("alpha{}omega", " ".repeat(60));
    let doc = services.pipeline.register_upload(Upload::new(write(tmp.path(), "gap.txt", &text))).await?;
    let report = services.pipeline.index_document(&doc.id).await?.report();
    assert_eq!(report.chunk_count, 2);
    assert_eq!(report.text_len, 70);
    assert_eq!(services.vectors.count("pdf_embeddings").await?, 2);

    let results = services.retrieval.search("omega", 5).await?;
    let mut positions: Vec<usize> = results.iter().map(|r| r.chunk_index).collect();
    positions.sort_unstable();
    assert_eq!(positions, [0, 3]);
    Ok(())
}

#[tokio::test]
async fn empty_documents_fail_extraction() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::in_memory(settings(), fake_model()).await?;
    let doc = services.pipeline.register_upload(Upload::new(write(tmp.path(), "blank.txt", "  \n\n "))).await?;
    let err = services.pipeline.index_document(&doc.id).await.expect_err("nothing to index");
    assert!(matches!(err, Error::Extraction { .. }));
    Ok(())
}

#[tokio::test]
async fn embedding_failure_marks_failed() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let model =
        ModelHandle::new(DIM, || -> Result<Arc<dyn Embedder>> { Err(Error::Embedding("weights missing".into())) });
    let services = Services::in_memory(settings(), model).await?;
    let doc = services.pipeline.register_upload(Upload::new(write(tmp.path(), "doc.txt", "some text"))).await?;

    let err = services.pipeline.index_document(&doc.id).await.expect_err("model unavailable");
    assert!(matches!(err, Error::Embedding(_)));
    let stored = services.metadata.get(&doc.id).await?.expect("record");
    assert_eq!(stored.state, IndexState::Failed);
    assert!(stored.last_error.as_deref().is_some_and(|e| e.contains("weights missing")));
    Ok(())
}

/// Accepts collections but refuses every write.
#[derive(Default)]
struct ReadOnlyIndex(MemoryVectorIndex);

#[async_trait]
impl VectorIndex for ReadOnlyIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize, metric: Metric) -> Result<()> {
        self.0.ensure_collection(name, dimension, metric).await
    }
    async fn upsert(&self, _name: &str, _points: &[VectorPoint]) -> Result<usize> {
        Err(Error::VectorStore("store is read-only".into()))
    }
    async fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        self.0.search(name, query, limit).await
    }
    async fn count(&self, name: &str) -> Result<usize> {
        self.0.count(name).await
    }
    async fn delete_document(&self, name: &str, document_id: &str) -> Result<usize> {
        self.0.delete_document(name, document_id).await
    }
}

#[tokio::test]
async fn upsert_failure_marks_failed() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::assemble(
        settings(),
        fake_model(),
        Arc::new(MemoryMetadataStore::new()),
        Arc::new(ReadOnlyIndex::default()),
        Arc::new(DocumentExtractor::new()),
    )
    .await?;
    let doc = services.pipeline.register_upload(Upload::new(write(tmp.path(), "doc.txt", "some text"))).await?;
    let err = services.pipeline.index_document(&doc.id).await.expect_err("read-only store");
    assert!(matches!(err, Error::VectorStore(_)));
    assert_eq!(services.metadata.get(&doc.id).await?.expect("record").state, IndexState::Failed);
    Ok(())
}

/// Serves writes but every search fails, as when the vector service is down.
#[derive(Default)]
struct SearchDownIndex(MemoryVectorIndex);

#[async_trait]
impl VectorIndex for SearchDownIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize, metric: Metric) -> Result<()> {
        self.0.ensure_collection(name, dimension, metric).await
    }
    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<usize> {
        self.0.upsert(name, points).await
    }
    async fn search(&self, _name: &str, _query: &[f32], _limit: usize) -> Result<Vec<ScoredPoint>> {
        Err(Error::VectorStore("connection refused".into()))
    }
    async fn count(&self, name: &str) -> Result<usize> {
        self.0.count(name).await
    }
    async fn delete_document(&self, name: &str, document_id: &str) -> Result<usize> {
        self.0.delete_document(name, document_id).await
    }
}

/// Single-record operations work; batch lookups fail.
#[derive(Default)]
struct BatchLookupDownStore(MemoryMetadataStore);

#[async_trait]
impl MetadataStore for BatchLookupDownStore {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        self.0.get(id).await
    }
    async fn get_many(&self, _ids: &[DocumentId]) -> Result<Vec<Document>> {
        Err(Error::Metadata("metadata store unavailable".into()))
    }
    async fn list(&self) -> Result<Vec<Document>> {
        self.0.list().await
    }
    async fn insert(&self, document: Document) -> Result<()> {
        self.0.insert(document).await
    }
    async fn update(&self, document: &Document) -> Result<()> {
        self.0.update(document).await
    }
    async fn delete(&self, id: &str) -> Result<bool> {
        self.0.delete(id).await
    }
}

#[tokio::test]
async fn vector_search_failure_is_an_error_not_an_empty_result() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::assemble(
        settings(),
        fake_model(),
        Arc::new(MemoryMetadataStore::new()),
        Arc::new(SearchDownIndex::default()),
        Arc::new(DocumentExtractor::new()),
    )
    .await?;
    upload_and_index(&services, write(tmp.path(), "doc.txt", "rain barrels need screens")).await?;

    let err = services.retrieval.search("rain barrels", 5).await.expect_err("search is down");
    assert!(matches!(err, Error::VectorStore(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn metadata_lookup_failure_is_an_error_not_an_empty_result() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::assemble(
        settings(),
        fake_model(),
        Arc::new(BatchLookupDownStore::default()),
        Arc::new(MemoryVectorIndex::new()),
        Arc::new(DocumentExtractor::new()),
    )
    .await?;
    upload_and_index(&services, write(tmp.path(), "doc.txt", "compost needs turning weekly")).await?;
    assert_eq!(services.vectors.count("pdf_embeddings").await?, 1);

    let err = services.retrieval.search("compost", 5).await.expect_err("metadata is down");
    assert!(matches!(err, Error::Metadata(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn mismatched_collection_halts_startup() -> anyhow::Result<()> {
    let vectors = Arc::new(MemoryVectorIndex::new());
    vectors.ensure_collection("pdf_embeddings", 768, Metric::Cosine).await?;
    let metadata = Arc::new(MemoryMetadataStore::new());
    let err = Services::assemble(settings(), fake_model(), metadata, vectors, Arc::new(DocumentExtractor::new()))
        .await
        .err()
        .expect("schema conflict");
    assert!(matches!(err, Error::SchemaConflict { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn uploads_are_validated() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::in_memory(settings(), fake_model()).await?;

    let err = services.pipeline.register_upload(Upload::new(tmp.path().join("nope.txt"))).await.expect_err("missing");
    assert!(matches!(err, Error::InvalidInput(_)));

    let png = write(tmp.path(), "photo.png", "png");
    let err = services.pipeline.register_upload(Upload::new(png)).await.expect_err("png");
    assert!(matches!(err, Error::InvalidInput(_)));

    let upload = Upload {
        path: write(tmp.path(), "upload_0001", "renamed on disk"),
        original_name: Some("Field notes.txt".into()),
        mimetype: Some("text/plain".into()),
        description: "notes from the barn".into(),
    };
    let doc = services.pipeline.register_upload(upload).await?;
    assert_eq!(doc.id.len(), 32);
    assert_eq!(doc.filename, "upload_0001");
    assert_eq!(doc.original_name, "Field notes.txt");
    assert_eq!(doc.size, 15);
    assert_eq!(doc.state, IndexState::NotIndexed);
    Ok(())
}

#[tokio::test]
async fn search_rejects_bad_input_and_clamps_limit() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::in_memory(settings(), fake_model()).await?;
    upload_and_index(&services, write(tmp.path(), "doc.txt", "goats need shelter in winter")).await?;

    assert!(matches!(services.retrieval.search("   ", 5).await, Err(Error::InvalidInput(_))));
    assert!(matches!(services.retrieval.search("goats", 0).await, Err(Error::InvalidInput(_))));
    assert_eq!(services.retrieval.search("goats", 10_000).await?.len(), 1);
    assert_eq!(services.retrieval.search_default("goats").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn queue_indexes_in_background_and_reports_events() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::in_memory(settings(), fake_model()).await?;
    let a = services.pipeline.register_upload(Upload::new(write(tmp.path(), "a.txt", "alpha text"))).await?;
    let b = services.pipeline.register_upload(Upload::new(write(tmp.path(), "b.txt", "beta text"))).await?;

    let queue = services.spawn_queue(8);
    let mut events = queue.subscribe();
    queue.submit(a.id.clone()).await?;
    queue.submit("missing").await?;
    queue.submit(b.id.clone()).await?;

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(events.recv().await?);
    }
    let order: Vec<&str> = seen.iter().map(|e| e.document_id.as_str()).collect();
    assert_eq!(order, [a.id.as_str(), "missing", b.id.as_str()]);
    assert!(seen[0].result.is_ok());
    assert!(seen[1].result.as_ref().is_err_and(|e| e.contains("missing")));
    assert_eq!(seen[2].result.as_ref().map(|r| r.chunk_count).ok(), Some(1));
    queue.shutdown().await?;

    let statuses = index_status(services.metadata.as_ref()).await?;
    let summary = summarize(&statuses);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.chunks, 2);
    Ok(())
}

#[tokio::test]
async fn deleting_a_document_removes_its_points() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let services = Services::in_memory(settings(), fake_model()).await?;
    let id = upload_and_index(&services, write(tmp.path(), "doc.txt", &"x".repeat(1500))).await?;
    assert_eq!(services.vectors.count("pdf_embeddings").await?, 2);
    assert!(services.pipeline.delete_document(&id).await?);
    assert_eq!(services.vectors.count("pdf_embeddings").await?, 0);
    assert!(!services.pipeline.delete_document(&id).await?);
    assert!(matches!(document_status(services.metadata.as_ref(), &id).await, Err(Error::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn persistent_stack_survives_reopen() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let id = {
        let services = Services::open(settings(), tmp.path()).await?;
        upload_and_index(&services, write(tmp.path(), "kept.txt", "the well pump needs priming")).await?
    };
    assert!(tmp.path().join("data/documents.json").exists());

    let services = Services::open(settings(), tmp.path()).await?;
    let status = document_status(services.metadata.as_ref(), &id).await?;
    assert_eq!(status.status, StatusLabel::Completed);
    assert_eq!(status.chunks_processed, 1);
    let results = services.retrieval.search("the well pump needs priming", 1).await?;
    assert_eq!(results[0].document_id, id);
    Ok(())
}
