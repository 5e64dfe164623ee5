//! LanceDB connection and table helpers used by the bundle store.
use anyhow::{anyhow, Result};
use arrow_array::{
    Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray,
};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema::build_meta_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

/// Create `name` holding `batches`; all batches must share `schema`.
pub async fn create_table_from(
    conn: &Connection,
    name: &str,
    schema: Arc<arrow_schema::Schema>,
    batches: Vec<RecordBatch>,
) -> Result<()> {
    let reader = RecordBatchIterator::new(batches.into_iter().map(Ok), schema);
    conn.create_table(name, Box::new(reader)).execute().await?;
    Ok(())
}

/// Full scan of a table.
pub async fn read_all(conn: &Connection, name: &str) -> Result<Vec<RecordBatch>> {
    let t = conn.open_table(name).execute().await?;
    let stream = t.query().execute().await?;
    Ok(stream.try_collect::<Vec<_>>().await?)
}

pub async fn write_meta(conn: &Connection, table: &str, pairs: &[(&str, String)]) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(
                pairs.iter().map(|(k, _)| k.to_string()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(pairs.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>())),
            Arc::new(TimestampMillisecondArray::from(vec![now; pairs.len()])),
        ],
    )?;
    create_table_from(conn, table, build_meta_schema(), vec![rb]).await
}

pub async fn read_meta(conn: &Connection, table: &str) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for batch in read_all(conn, table).await? {
        let keys = string_column(&batch, "key")?;
        let values = string_column(&batch, "value")?;
        for i in 0..batch.num_rows() {
            out.insert(keys.value(i).to_string(), values.value(i).to_string());
        }
    }
    Ok(out)
}

pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    typed_column(batch, name)
}

pub fn typed_column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{}' missing or mistyped", name))
}
