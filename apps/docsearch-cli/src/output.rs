use anyhow::Result;
use serde::Serialize;

use docsearch_core::types::{Document, IndexStatus, SearchResult, StatusLabel};
use docsearch_pipeline::status::StatusSummary;

const PREVIEW_CHARS: usize = 240;

fn preview(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    }
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    results: &'a [SearchResult],
}

pub fn results_json(query: &str, results: &[SearchResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&SearchOutput { query, results })?)
}

pub fn results_human(query: &str, results: &[SearchResult]) -> String {
    let mut out = format!("🔍 Found {} results for: \"{query}\"", results.len());
    for (i, r) in results.iter().enumerate() {
        let name = r.document.as_ref().map_or("(document removed)", |d| d.original_name.as_str());
        out.push_str(&format!(
            "\n\n  {}. score={:.4}  {}  chunk {}  [{}]",
            i + 1,
            r.score,
            name,
            r.chunk_index,
            r.document_id
        ));
        out.push_str(&format!("\n     📝 {}", preview(&r.text)));
    }
    out
}

fn label(status: StatusLabel) -> &'static str {
    match status {
        StatusLabel::Completed => "completed",
        StatusLabel::Pending => "pending",
        StatusLabel::Indexing => "indexing",
        StatusLabel::Failed => "failed",
    }
}

pub fn status_human(statuses: &[IndexStatus], summary: &StatusSummary) -> String {
    let mut out = String::new();
    for s in statuses {
        out.push_str(&format!("{:<32}  {:<10} {:>5} chunks  {}", s.id, label(s.status), s.chunks_processed, s.name));
        if let Some(at) = s.completed_at {
            out.push_str(&format!("  ({})", at.format("%Y-%m-%d %H:%M")));
        }
        if let Some(err) = &s.error {
            out.push_str(&format!("\n{:<32}  ↳ {err}", ""));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "📊 {} documents: {} completed, {} pending, {} indexing, {} failed ({} chunks)",
        summary.total, summary.completed, summary.pending, summary.indexing, summary.failed, summary.chunks
    ));
    out
}

pub fn documents_human(docs: &[Document]) -> String {
    if docs.is_empty() {
        return "No documents".to_string();
    }
    docs.iter()
        .map(|d| {
            let mut line =
                format!("{}  {}  {} bytes  {}", d.id, d.uploaded_at.format("%Y-%m-%d %H:%M"), d.size, d.original_name);
            if !d.description.is_empty() {
                line.push_str(&format!(" - {}", d.description));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
