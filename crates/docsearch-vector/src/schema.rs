use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray, TimestampMillisecondArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::Utc;
use std::sync::Arc;

use docsearch_core::types::{Metric, PointPayload, ScoredPoint, VectorPoint};
use docsearch_core::{Error, Result};

use crate::CollectionInfo;

pub const VECTOR_FIELD: &str = "vector";
pub const DISTANCE_FIELD: &str = "_distance";

pub fn build_points_schema(dimension: usize) -> Result<SchemaRef> {
    let dim = i32::try_from(dimension).map_err(|_| Error::InvalidInput(format!("dimension {dimension} is too large")))?;
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new(
            VECTOR_FIELD,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            true,
        ),
    ])))
}

/// One row per collection: the layout it was created with.
pub fn build_layout_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("collection", DataType::Utf8, false),
        Field::new("dimension", DataType::Int32, false),
        Field::new("metric", DataType::Utf8, false),
        Field::new("recorded_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}

/// Size of the fixed-size-list vector field, if the schema has one.
pub fn vector_dimension(schema: &Schema) -> Option<usize> {
    let field = schema.field_with_name(VECTOR_FIELD).ok()?;
    match field.data_type() {
        DataType::FixedSizeList(item, size) if item.data_type() == &DataType::Float32 => usize::try_from(*size).ok(),
        _ => None,
    }
}

pub(crate) fn arrow_err(e: arrow_schema::ArrowError) -> Error {
    Error::VectorStore(format!("arrow: {e}"))
}

/// Columnar form of `points`. Vectors must already be validated against
/// `dimension`.
pub fn points_to_batch(points: &[&VectorPoint], dimension: usize) -> Result<RecordBatch> {
    let schema = build_points_schema(dimension)?;
    let dim = i32::try_from(dimension).map_err(|_| Error::InvalidInput(format!("dimension {dimension} is too large")))?;
    let mut chunk_indices = Vec::with_capacity(points.len());
    for p in points {
        let idx = i32::try_from(p.payload.chunk_index)
            .map_err(|_| Error::InvalidInput(format!("chunk index {} out of range", p.payload.chunk_index)))?;
        chunk_indices.push(idx);
    }
    let vectors = points.iter().map(|p| Some(p.vector.iter().copied().map(Some).collect::<Vec<_>>()));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.id.as_str()))),
            Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.payload.document_id.as_str()))),
            Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.payload.text.as_str()))),
            Arc::new(Int32Array::from(chunk_indices)),
            Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.payload.source_path.as_str()))),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
        ],
    )
    .map_err(arrow_err)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::VectorStore(format!("column '{name}' missing or of unexpected type")))
}

/// Rows of a search result batch, scored from the engine's `_distance`.
pub fn batch_to_scored(batch: &RecordBatch, metric: Metric) -> Result<Vec<ScoredPoint>> {
    let ids = column::<StringArray>(batch, "id")?;
    let document_ids = column::<StringArray>(batch, "document_id")?;
    let texts = column::<StringArray>(batch, "text")?;
    let chunk_indices = column::<Int32Array>(batch, "chunk_index")?;
    let source_paths = column::<StringArray>(batch, "source_path")?;
    let distances = column::<Float32Array>(batch, DISTANCE_FIELD)?;

    (0..batch.num_rows())
        .map(|i| {
            let chunk_index = usize::try_from(chunk_indices.value(i))
                .map_err(|_| Error::VectorStore(format!("negative chunk index for point {}", ids.value(i))))?;
            Ok(ScoredPoint {
                id: ids.value(i).to_string(),
                score: metric.score_from_distance(distances.value(i)),
                payload: PointPayload {
                    document_id: document_ids.value(i).to_string(),
                    text: texts.value(i).to_string(),
                    chunk_index,
                    source_path: source_paths.value(i).to_string(),
                },
            })
        })
        .collect()
}

pub(crate) fn layout_to_batch(collection: &str, info: CollectionInfo) -> Result<RecordBatch> {
    let dim = i32::try_from(info.dimension)
        .map_err(|_| Error::InvalidInput(format!("dimension {} is too large", info.dimension)))?;
    RecordBatch::try_new(
        build_layout_schema(),
        vec![
            Arc::new(StringArray::from(vec![collection])),
            Arc::new(Int32Array::from(vec![dim])),
            Arc::new(StringArray::from(vec![info.metric.as_str()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )
    .map_err(arrow_err)
}

/// The recorded `(dimension, metric)` of the first row, if any.
pub(crate) fn batch_to_layout(batch: &RecordBatch) -> Result<Option<(usize, String)>> {
    if batch.num_rows() == 0 {
        return Ok(None);
    }
    let dimension = column::<Int32Array>(batch, "dimension")?.value(0);
    let dimension = usize::try_from(dimension)
        .map_err(|_| Error::VectorStore(format!("recorded dimension {dimension} is negative")))?;
    Ok(Some((dimension, column::<StringArray>(batch, "metric")?.value(0).to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            id: id.to_string(),
            vector,
            payload: PointPayload {
                document_id: "doc".into(),
                text: "hello".into(),
                chunk_index: 3,
                source_path: "/tmp/doc.txt".into(),
            },
        }
    }

    #[test]
    fn points_schema_records_dimension() {
        let schema = build_points_schema(384).expect("schema");
        assert_eq!(vector_dimension(&schema), Some(384));
        assert_eq!(vector_dimension(&build_layout_schema()), None);
    }

    #[test]
    fn points_become_one_row_each() {
        let a = point("doc_0", vec![1.0, 0.0]);
        let b = point("doc_1", vec![0.0, 1.0]);
        let batch = points_to_batch(&[&a, &b], 2).expect("batch");
        assert_eq!(batch.num_rows(), 2);
        let ids = column::<StringArray>(&batch, "id").expect("ids");
        assert_eq!(ids.value(1), "doc_1");
    }

    #[test]
    fn layout_rows_read_back() {
        let batch = layout_to_batch("manuals", CollectionInfo { dimension: 384, metric: Metric::Dot }).expect("batch");
        assert_eq!(batch_to_layout(&batch).expect("layout"), Some((384, "dot".to_string())));
        assert_eq!(batch_to_layout(&batch.slice(0, 0)).expect("empty"), None);
    }
}
