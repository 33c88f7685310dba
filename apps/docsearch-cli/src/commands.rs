use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use walkdir::WalkDir;

use docsearch_core::traits::{MetadataStore, VectorIndex};
use docsearch_core::types::IndexState;
use docsearch_pipeline::status::{document_status, index_status, summarize};
use docsearch_pipeline::{Services, Upload};

use crate::output;

const UPLOAD_EXTENSIONS: [&str; 2] = ["txt", "pdf"];

pub async fn init(services: &Services) -> Result<()> {
    let c = services.pipeline.collection();
    let points = services.vectors.count(&c.name).await?;
    let documents = services.metadata.list().await?.len();
    println!("✅ Collection '{}' ready (dimension {}, metric {}, {} points)", c.name, c.dimension, c.metric, points);
    println!("📚 {documents} documents registered");
    Ok(())
}

/// Expand directories into the `.txt`/`.pdf` files beneath them.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
                let entry = entry.with_context(|| format!("walking {}", path.display()))?;
                let wanted = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| UPLOAD_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)));
                if entry.file_type().is_file() && wanted {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("{} does not exist", path.display());
        }
    }
    Ok(files)
}

fn progress(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

pub async fn upload(services: &Services, paths: &[PathBuf], description: &str, index: bool) -> Result<()> {
    let files = collect_files(paths)?;
    if files.is_empty() {
        println!("No .txt or .pdf files found");
        return Ok(());
    }

    let mut registered = Vec::new();
    for file in &files {
        let upload = Upload { description: description.to_string(), ..Upload::new(absolute(file)?) };
        match services.pipeline.register_upload(upload).await {
            Ok(doc) => registered.push(doc),
            Err(e) => warn!(path = %file.display(), error = %e, "skipping upload"),
        }
    }
    println!("📥 Registered {} of {} files", registered.len(), files.len());
    if !index || registered.is_empty() {
        return Ok(());
    }

    let ids: Vec<String> = registered.iter().map(|d| d.id.clone()).collect();
    run_queue(services, ids).await
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Feed `ids` through the background queue and wait for every one to finish.
async fn run_queue(services: &Services, ids: Vec<String>) -> Result<()> {
    let queue = services.spawn_queue(ids.len());
    let mut events = queue.subscribe();
    let mut pending: HashSet<String> = ids.iter().cloned().collect();
    for id in ids {
        queue.submit(id).await?;
    }

    let pb = progress(pending.len())?;
    let (mut ok, mut failed) = (0usize, 0usize);
    while !pending.is_empty() {
        match events.recv().await {
            Ok(event) => {
                if !pending.remove(&event.document_id) {
                    continue;
                }
                match event.result {
                    Ok(report) => {
                        ok += 1;
                        pb.set_message(format!("{} ({} chunks)", event.document_id, report.chunk_count));
                    }
                    Err(reason) => {
                        failed += 1;
                        pb.println(format!("❌ {}: {reason}", event.document_id));
                    }
                }
                pb.inc(1);
            }
            Err(RecvError::Lagged(n)) => {
                warn!(missed = n, "progress events dropped; waiting for the queue to drain");
                break;
            }
            Err(RecvError::Closed) => break,
        }
    }
    queue.shutdown().await?;

    // Events were missed: the queue is drained now, so the records are final.
    if !pending.is_empty() {
        let (settled_ok, settled_failed) = settle_from_records(services.metadata.as_ref(), &pending).await?;
        for (id, reason) in &settled_failed {
            pb.println(format!("❌ {id}: {reason}"));
        }
        ok += settled_ok;
        failed += settled_failed.len();
        pb.inc(pending.len() as u64);
    }
    pb.finish_with_message("done");
    println!("✅ Indexed {ok} documents, {failed} failed");
    if failed > 0 {
        bail!("{failed} documents failed to index; see `docsearch status`");
    }
    Ok(())
}

/// Count `ids` as indexed or failed from their stored records. Returns the
/// number indexed and the failures with their reasons.
async fn settle_from_records(
    metadata: &dyn MetadataStore,
    ids: &HashSet<String>,
) -> Result<(usize, Vec<(String, String)>)> {
    let mut ok = 0;
    let mut failed = Vec::new();
    let mut ids: Vec<&String> = ids.iter().collect();
    ids.sort();
    for id in ids {
        match metadata.get(id).await? {
            Some(doc) if doc.state == IndexState::Indexed => ok += 1,
            Some(doc) => {
                let reason = doc.last_error.unwrap_or_else(|| format!("left in state {:?}", doc.state));
                failed.push((id.clone(), reason));
            }
            None => failed.push((id.clone(), "document record is gone".to_string())),
        }
    }
    Ok((ok, failed))
}

pub async fn index(services: &Services, ids: Vec<String>, all: bool) -> Result<()> {
    let ids = if all {
        services.metadata.list().await?.into_iter().filter(|d| d.state != IndexState::Indexed).map(|d| d.id).collect()
    } else {
        ids
    };
    if ids.is_empty() {
        println!("Nothing to index");
        return Ok(());
    }
    info!(documents = ids.len(), "indexing");
    run_queue(services, ids).await
}

pub async fn search(services: &Services, query: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let limit = limit.unwrap_or_else(|| services.retrieval.default_limit());
    let results = services.retrieval.search(query, limit).await?;
    let rendered = if json { output::results_json(query, &results)? } else { output::results_human(query, &results) };
    println!("{rendered}");
    Ok(())
}

pub async fn status(services: &Services, id: Option<&str>, json: bool) -> Result<()> {
    let statuses = match id {
        Some(id) => vec![document_status(services.metadata.as_ref(), id).await?],
        None => index_status(services.metadata.as_ref()).await?,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        println!("{}", output::status_human(&statuses, &summarize(&statuses)));
    }
    Ok(())
}

pub async fn list(services: &Services, json: bool) -> Result<()> {
    let docs = services.metadata.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
    } else {
        println!("{}", output::documents_human(&docs));
    }
    Ok(())
}

pub async fn delete(services: &Services, id: &str) -> Result<()> {
    if services.pipeline.delete_document(id).await? {
        println!("🗑️  Deleted {id}");
        Ok(())
    } else {
        bail!("no document with id {id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsearch_core::metadata::MemoryMetadataStore;
    use docsearch_core::types::Document;

    #[test]
    fn directories_expand_to_supported_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let nested = tmp.path().join("manuals");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(nested.join("pump.txt"), "prime the pump").expect("write");
        std::fs::write(nested.join("wiring.PDF"), "%PDF").expect("write");
        std::fs::write(nested.join("photo.jpg"), "jpg").expect("write");
        let single = tmp.path().join("single.md");
        std::fs::write(&single, "# notes").expect("write");

        let files = collect_files(&[tmp.path().join("manuals"), single.clone()]).expect("collect");
        let names: Vec<_> =
            files.iter().filter_map(|p| p.file_name()).map(|n| n.to_string_lossy().to_string()).collect();
        assert_eq!(names, ["pump.txt", "wiring.PDF", "single.md"]);
    }

    #[test]
    fn missing_paths_are_errors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert!(collect_files(&[tmp.path().join("absent")]).is_err());
    }

    #[tokio::test]
    async fn missed_events_are_settled_from_document_records() {
        let store = MemoryMetadataStore::new();
        let mut done = Document::new("done", "/uploads/done.txt");
        done.state = IndexState::Indexed;
        let mut broken = Document::new("broken", "/uploads/broken.pdf");
        broken.state = IndexState::Failed;
        broken.last_error = Some("no text could be extracted".to_string());
        store.insert(done).await.expect("insert");
        store.insert(broken).await.expect("insert");

        let ids: HashSet<String> = ["done", "broken", "gone"].into_iter().map(String::from).collect();
        let (ok, failed) = settle_from_records(&store, &ids).await.expect("settle");
        assert_eq!(ok, 1);
        assert_eq!(
            failed,
            vec![
                ("broken".to_string(), "no text could be extracted".to_string()),
                ("gone".to_string(), "document record is gone".to_string()),
            ]
        );
    }
}
