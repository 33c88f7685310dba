//! LanceDB connection and housekeeping helpers.
use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection};

use docsearch_core::{Error, Result};

pub(crate) fn lance_err(e: lancedb::Error) -> Error {
    Error::VectorStore(e.to_string())
}

/// Quote a string literal for a Lance SQL filter.
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(lance_err)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(lance_err)?;
    Ok(names.iter().any(|n| n == name))
}

/// Create `name` with zero rows unless it already exists.
pub async fn ensure_table(conn: &Connection, name: &str, schema: arrow_schema::SchemaRef) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
    conn.create_table(name, Box::new(iter)).execute().await.map_err(lance_err)?;
    Ok(())
}
