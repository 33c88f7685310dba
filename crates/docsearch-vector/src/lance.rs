use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use arrow_array::{RecordBatch, RecordBatchIterator};
use docsearch_core::traits::VectorIndex;
use docsearch_core::types::{rank_by_score, Metric, ScoredPoint, VectorPoint};
use docsearch_core::{Error, Result};

use crate::schema::{
    batch_to_layout, batch_to_scored, build_layout_schema, build_points_schema, layout_to_batch, points_to_batch,
    vector_dimension,
};
use crate::table::{ensure_table, lance_err, open_db, sql_literal, table_exists};
use crate::{dedup_last_wins, CollectionInfo};

/// Records the dimension and metric each collection was created with.
pub const LAYOUT_TABLE: &str = "docsearch_collections";

fn distance_type(metric: Metric) -> DistanceType {
    match metric {
        Metric::Cosine => DistanceType::Cosine,
        Metric::Dot => DistanceType::Dot,
        Metric::L2 => DistanceType::L2,
    }
}

/// LanceDB-backed collections. One table per collection; the metric lives
/// in [`LAYOUT_TABLE`] and the dimension is read back from the vector field.
pub struct LanceVectorIndex {
    conn: Connection,
    uri: String,
    collections: RwLock<HashMap<String, CollectionInfo>>,
}

impl LanceVectorIndex {
    pub async fn connect(uri: &str) -> Result<Self> {
        let conn = open_db(uri).await?;
        debug!(uri, "connected to lancedb");
        Ok(Self { conn, uri: uri.to_string(), collections: RwLock::new(HashMap::new()) })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    async fn open(&self, name: &str) -> Result<Table> {
        self.conn.open_table(name).execute().await.map_err(lance_err)
    }

    async fn recorded_layout(&self, name: &str) -> Result<Option<(usize, String)>> {
        if !table_exists(&self.conn, LAYOUT_TABLE).await? {
            return Ok(None);
        }
        let batches: Vec<RecordBatch> = self
            .open(LAYOUT_TABLE)
            .await?
            .query()
            .only_if(format!("collection = {}", sql_literal(name)))
            .limit(1)
            .execute()
            .await
            .map_err(lance_err)?
            .try_collect()
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;
        for batch in &batches {
            if let Some(layout) = batch_to_layout(batch)? {
                return Ok(Some(layout));
            }
        }
        Ok(None)
    }

    async fn record_layout(&self, name: &str, info: CollectionInfo) -> Result<()> {
        ensure_table(&self.conn, LAYOUT_TABLE, build_layout_schema()).await?;
        let batch = layout_to_batch(name, info)?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_layout_schema()));
        let table = self.open(LAYOUT_TABLE).await?;
        let mut mi = table.merge_insert(&["collection"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(lance_err)?;
        Ok(())
    }

    /// Read the stored layout of `name`. The metric is `None` for tables
    /// created without a layout row.
    async fn describe(&self, name: &str) -> Result<Option<(usize, Option<Metric>)>> {
        if !table_exists(&self.conn, name).await? {
            return Ok(None);
        }
        let schema = self.open(name).await?.schema().await.map_err(lance_err)?;
        let dimension = vector_dimension(&schema)
            .ok_or_else(|| Error::schema_conflict(name, "table has no fixed-size float vector field"))?;
        let metric = match self.recorded_layout(name).await? {
            Some((recorded_dim, _)) if recorded_dim != dimension => {
                return Err(Error::schema_conflict(
                    name,
                    format!("layout records dimension {recorded_dim} but the vector field holds {dimension}"),
                ));
            }
            Some((_, raw)) => Some(raw.parse::<Metric>().map_err(|e| Error::schema_conflict(name, e.to_string()))?),
            None => None,
        };
        Ok(Some((dimension, metric)))
    }

    async fn info(&self, name: &str) -> Result<CollectionInfo> {
        if let Some(info) = self.collections.read().await.get(name) {
            return Ok(*info);
        }
        let (dimension, metric) = self
            .describe(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;
        let info = CollectionInfo { dimension, metric: metric.unwrap_or_default() };
        self.collections.write().await.insert(name.to_string(), info);
        Ok(info)
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize, metric: Metric) -> Result<()> {
        if dimension == 0 {
            return Err(Error::InvalidInput("collection dimension must be positive".into()));
        }
        let wanted = CollectionInfo { dimension, metric };
        match self.describe(name).await? {
            Some((existing_dim, existing_metric)) => {
                let existing = CollectionInfo { dimension: existing_dim, metric: existing_metric.unwrap_or(metric) };
                existing.check(name, wanted)?;
                if existing_metric.is_none() {
                    warn!(collection = name, %metric, "collection had no recorded metric; recording it");
                    self.record_layout(name, wanted).await?;
                }
                debug!(collection = name, dimension, %metric, "collection already present");
            }
            None => {
                ensure_table(&self.conn, name, build_points_schema(dimension)?).await?;
                self.record_layout(name, wanted).await?;
                info!(collection = name, dimension, %metric, uri = %self.uri, "created collection");
            }
        }
        self.collections.write().await.insert(name.to_string(), wanted);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<usize> {
        let info = self.info(name).await?;
        if points.is_empty() {
            return Ok(0);
        }
        info.validate_points(points)?;
        let unique = dedup_last_wins(points);
        let batch = points_to_batch(&unique, info.dimension)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));

        let table = self.open(name).await?;
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(lance_err)?;
        debug!(collection = name, points = unique.len(), "upserted points");
        Ok(unique.len())
    }

    async fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        if limit == 0 {
            return Err(Error::InvalidInput("search limit must be positive".into()));
        }
        let info = self.info(name).await?;
        info.validate_query(query)?;
        let table = self.open(name).await?;
        if table.count_rows(None).await.map_err(lance_err)? == 0 {
            return Ok(Vec::new());
        }

        let mut stream = table
            .vector_search(query.to_vec())
            .map_err(lance_err)?
            .distance_type(distance_type(info.metric))
            .limit(limit)
            .execute()
            .await
            .map_err(lance_err)?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| Error::VectorStore(e.to_string()))? {
            hits.extend(batch_to_scored(&batch, info.metric)?);
        }
        rank_by_score(&mut hits, |h| h.score);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, name: &str) -> Result<usize> {
        self.info(name).await?;
        self.open(name).await?.count_rows(None).await.map_err(lance_err)
    }

    async fn delete_document(&self, name: &str, document_id: &str) -> Result<usize> {
        self.info(name).await?;
        let table = self.open(name).await?;
        let filter = format!("document_id = {}", sql_literal(document_id));
        let matching = table.count_rows(Some(filter.clone())).await.map_err(lance_err)?;
        if matching > 0 {
            table.delete(&filter).await.map_err(lance_err)?;
            info!(collection = name, document_id, points = matching, "deleted document points");
        }
        Ok(matching)
    }
}
