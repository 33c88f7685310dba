use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use docsearch_core::traits::VectorIndex;
use docsearch_core::types::{rank_by_score, Metric, ScoredPoint, VectorPoint};
use docsearch_core::{Error, Result};

use crate::CollectionInfo;

struct MemCollection {
    info: CollectionInfo,
    points: Vec<VectorPoint>,
    by_id: HashMap<String, usize>,
}

impl MemCollection {
    fn reindex(&mut self) {
        self.by_id = self.points.iter().enumerate().map(|(i, p)| (p.id.clone(), i)).collect();
    }
}

/// Brute-force in-process index for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryVectorIndex {
    collections: RwLock<HashMap<String, MemCollection>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(name: &str) -> Error {
    Error::NotFound(format!("collection '{name}'"))
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize, metric: Metric) -> Result<()> {
        if dimension == 0 {
            return Err(Error::InvalidInput("collection dimension must be positive".into()));
        }
        let wanted = CollectionInfo { dimension, metric };
        let mut collections = self.collections.write().await;
        match collections.get(name) {
            Some(existing) => existing.info.check(name, wanted),
            None => {
                let collection = MemCollection { info: wanted, points: Vec::new(), by_id: HashMap::new() };
                collections.insert(name.to_string(), collection);
                Ok(())
            }
        }
    }

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let coll = collections.get_mut(name).ok_or_else(|| missing(name))?;
        coll.info.validate_points(points)?;
        let unique = crate::dedup_last_wins(points);
        for point in &unique {
            match coll.by_id.get(&point.id) {
                Some(&i) => coll.points[i] = (*point).clone(),
                None => {
                    coll.by_id.insert(point.id.clone(), coll.points.len());
                    coll.points.push((*point).clone());
                }
            }
        }
        Ok(unique.len())
    }

    async fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        if limit == 0 {
            return Err(Error::InvalidInput("search limit must be positive".into()));
        }
        let collections = self.collections.read().await;
        let coll = collections.get(name).ok_or_else(|| missing(name))?;
        coll.info.validate_query(query)?;
        let mut hits: Vec<ScoredPoint> = coll
            .points
            .iter()
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: coll.info.metric.score(query, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        rank_by_score(&mut hits, |h| h.score);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, name: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).ok_or_else(|| missing(name))?.points.len())
    }

    async fn delete_document(&self, name: &str, document_id: &str) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let coll = collections.get_mut(name).ok_or_else(|| missing(name))?;
        let before = coll.points.len();
        coll.points.retain(|p| p.payload.document_id != document_id);
        coll.reindex();
        Ok(before - coll.points.len())
    }
}
