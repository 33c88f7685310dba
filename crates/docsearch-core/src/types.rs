//! Domain types shared by the indexing pipeline and the retrieval service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type DocumentId = String;
pub type PointId = String;

/// Lifecycle of a document in the vector index.
///
/// `Indexing` left behind by a crash is resumable: re-running indexing
/// overwrites the same deterministic point ids.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    #[default]
    NotIndexed,
    Indexing,
    Indexed,
    Failed,
}

/// A document record as kept by the metadata store.
///
/// - `path`: where the raw-text extractor reads the source from
/// - `text_len`: length of the extracted text in chars, 0 until indexed
/// - `last_error`: reason of the most recent failed indexing run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub original_name: String,
    pub path: String,
    pub size: u64,
    pub mimetype: String,
    #[serde(default)]
    pub description: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub text_len: usize,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub state: IndexState,
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let filename = std::path::Path::new(&path)
            .file_name()
            .map_or_else(|| path.clone(), |n| n.to_string_lossy().to_string());
        Self {
            id: id.into(),
            original_name: filename.clone(),
            filename,
            path,
            size: 0,
            mimetype: "text/plain".to_string(),
            description: String::new(),
            uploaded_at: Utc::now(),
            text_len: 0,
            chunk_count: 0,
            state: IndexState::NotIndexed,
            indexed_at: None,
            last_error: None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.state == IndexState::Indexed
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            original_name: self.original_name.clone(),
            description: self.description.clone(),
            uploaded_at: self.uploaded_at,
        }
    }

    pub fn status(&self) -> IndexStatus {
        let status = match self.state {
            IndexState::Indexed => StatusLabel::Completed,
            IndexState::Indexing => StatusLabel::Indexing,
            IndexState::Failed => StatusLabel::Failed,
            IndexState::NotIndexed => StatusLabel::Pending,
        };
        IndexStatus {
            id: self.id.clone(),
            name: self.original_name.clone(),
            status,
            chunks_processed: self.chunk_count,
            completed_at: self.indexed_at,
            error: self.last_error.clone(),
        }
    }
}

/// A window of a document's extracted text. Offsets are char positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub position: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Deterministic point id; re-indexing the same document overwrites instead of duplicating.
pub fn point_id(document_id: &str, position: usize) -> PointId {
    format!("{document_id}_{position}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointPayload {
    pub document_id: DocumentId,
    pub text: String,
    pub chunk_index: usize,
    pub source_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPoint {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl VectorPoint {
    pub fn from_chunk(document_id: &str, source_path: &str, chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: point_id(document_id, chunk.position),
            vector,
            payload: PointPayload {
                document_id: document_id.to_string(),
                text: chunk.text.clone(),
                chunk_index: chunk.position,
                source_path: source_path.to_string(),
            },
        }
    }
}

/// A stored point returned by a similarity search. Higher `score` is better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    pub payload: PointPayload,
}

/// Similarity metric of a collection. Scores are always "higher is better".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Dot,
    L2,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
            Self::L2 => "l2",
        }
    }

    /// Score two vectors of equal length.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
            }
            Self::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Self::L2 => -a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>(),
        }
    }

    /// Convert an engine distance (`_distance`) into a score.
    pub fn score_from_distance(&self, distance: f32) -> f32 {
        match self {
            Self::Cosine | Self::Dot => 1.0 - distance,
            Self::L2 => -distance,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "l2" | "euclid" | "euclidean" => Ok(Self::L2),
            other => Err(Error::InvalidConfig(format!("unknown metric '{other}'"))),
        }
    }
}

/// Order results by descending score. The sort is stable, so ties keep index order.
pub fn rank_by_score<T>(items: &mut [T], score: impl Fn(&T) -> f32) {
    items.sort_by(|a, b| score(b).total_cmp(&score(a)));
}

/// Document metadata re-attached to a search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub filename: String,
    pub original_name: String,
    pub description: String,
    pub uploaded_at: DateTime<Utc>,
}

/// One ranked passage. `document` is `None` when the document record is gone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub document_id: DocumentId,
    pub text: String,
    pub score: f32,
    pub source_path: String,
    pub chunk_index: usize,
    pub document: Option<DocumentSummary>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusLabel {
    Completed,
    Pending,
    Indexing,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStatus {
    pub id: DocumentId,
    pub name: String,
    pub status: StatusLabel,
    pub chunks_processed: usize,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
