use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use docsearch_core::types::DocumentId;
use docsearch_core::{Error, Result};

use crate::indexer::{IndexReport, IndexingPipeline};

const EVENT_BUFFER: usize = 1024;

/// Published once per processed submission.
#[derive(Debug, Clone)]
pub struct IndexEvent {
    pub document_id: DocumentId,
    pub result: std::result::Result<IndexReport, String>,
}

/// Background indexing. Submissions are processed one at a time, in order,
/// by a single worker task.
pub struct IndexQueue {
    tx: mpsc::Sender<DocumentId>,
    events: broadcast::Sender<IndexEvent>,
    worker: JoinHandle<()>,
}

impl IndexQueue {
    pub fn spawn(pipeline: Arc<IndexingPipeline>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<DocumentId>(capacity.max(1));
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let publisher = events.clone();
        let worker = tokio::spawn(async move {
            while let Some(document_id) = rx.recv().await {
                let result = match pipeline.index_document(&document_id).await {
                    Ok(outcome) => Ok(outcome.report()),
                    Err(e) => {
                        if e.is_fatal() {
                            error!(
                                document_id = %document_id,
                                error = %e,
                                "indexing cannot proceed until the collection is fixed"
                            );
                        }
                        Err(e.to_string())
                    }
                };
                // No subscribers is fine; failures are also on the document record.
                let _ = publisher.send(IndexEvent { document_id, result });
            }
            debug!("index queue drained");
        });
        info!(capacity, "index queue started");
        Self { tx, events, worker }
    }

    /// Enqueue `document_id`; waits only for queue capacity, never for indexing.
    pub async fn submit(&self, document_id: impl Into<DocumentId>) -> Result<()> {
        let document_id = document_id.into();
        debug!(document_id = %document_id, "queued for indexing");
        self.tx.send(document_id).await.map_err(|_| Error::QueueClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Stop accepting work, finish what is queued and wait for the worker.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.tx);
        self.worker.await.map_err(|e| Error::Task(format!("index worker: {e}")))
    }
}
