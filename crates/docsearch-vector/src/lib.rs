//! Vector collections: a LanceDB-backed index and a brute-force in-memory one,
//! both behind `docsearch_core::traits::VectorIndex`.

pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

pub use lance::LanceVectorIndex;
pub use memory::MemoryVectorIndex;

use docsearch_core::types::{Metric, VectorPoint};
use docsearch_core::{Error, Result};
use std::collections::HashMap;

/// Layout fixed when a collection is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CollectionInfo {
    pub dimension: usize,
    pub metric: Metric,
}

impl CollectionInfo {
    pub(crate) fn check(&self, name: &str, wanted: CollectionInfo) -> Result<()> {
        if self.dimension != wanted.dimension {
            return Err(Error::schema_conflict(
                name,
                format!("existing dimension {} differs from requested {}", self.dimension, wanted.dimension),
            ));
        }
        if self.metric != wanted.metric {
            return Err(Error::schema_conflict(
                name,
                format!("existing metric {} differs from requested {}", self.metric, wanted.metric),
            ));
        }
        Ok(())
    }

    /// Whole-batch check run before anything is written.
    pub(crate) fn validate_points(&self, points: &[VectorPoint]) -> Result<()> {
        match points.iter().find(|p| p.vector.len() != self.dimension) {
            Some(bad) => Err(Error::VectorStore(format!(
                "dimension mismatch for point {}: got {} expected {}; batch of {} rejected",
                bad.id,
                bad.vector.len(),
                self.dimension,
                points.len()
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn validate_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.dimension {
            return Err(Error::VectorStore(format!(
                "query dimension mismatch: got {} expected {}",
                query.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

/// Collapse repeated ids inside one batch; the last occurrence wins and keeps
/// the position of the first.
pub(crate) fn dedup_last_wins(points: &[VectorPoint]) -> Vec<&VectorPoint> {
    let mut slot: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<&VectorPoint> = Vec::with_capacity(points.len());
    for p in points {
        match slot.get(p.id.as_str()) {
            Some(&i) => out[i] = p,
            None => {
                slot.insert(p.id.as_str(), out.len());
                out.push(p);
            }
        }
    }
    out
}
