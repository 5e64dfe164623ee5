//! Durable index bundles.
//!
//! A bundle is a LanceDB database directory holding two tables: `entries`
//! (one row per index entry, vector as `FixedSizeList<Float32, dim>`) and
//! `meta` (key/value rows describing the index). [`save`] writes a complete
//! bundle into a staging directory beside the target and swaps it in with
//! renames, so a reader finds either the previous bundle or the new one.
//! Only an absent path, an empty directory or an existing bundle is ever
//! replaced.

use anyhow::anyhow;
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Int32Array, RecordBatch, StringArray,
    TimestampMillisecondArray, UInt64Array,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use coursedb_core::types::{EntryMetadata, IndexEntry, Metric, SourceType};
use coursedb_core::{Error, Result};

use crate::index::VectorIndex;
use crate::schema::{build_entries_schema, ENTRIES_TABLE, META_TABLE};
use crate::table::{
    create_table_from, open_db, read_all, read_meta, string_column, typed_column, write_meta,
};

pub const FORMAT_VERSION: &str = "1";

/// Rows per Arrow batch written to the entries table.
const WRITE_BATCH_ROWS: usize = 4096;

fn table_dir(path: &Path, table: &str) -> PathBuf {
    path.join(format!("{table}.lance"))
}

/// True when `path` holds at least part of a bundle.
pub fn bundle_exists(path: &Path) -> bool {
    table_dir(path, ENTRIES_TABLE).exists() || table_dir(path, META_TABLE).exists()
}

/// Modification time of the bundle directory, used for cache invalidation.
pub fn bundle_modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Fails with `Persist` unless `path` is absent, an empty directory, or a
/// directory that already holds a bundle.
pub fn ensure_replaceable(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(path, e)),
    };
    if !meta.is_dir() {
        return Err(Error::persist(path, "path exists and is not an index directory"));
    }
    if bundle_exists(path) {
        return Ok(());
    }
    let mut children = fs::read_dir(path).map_err(|e| Error::io(path, e))?;
    if children.next().is_none() {
        return Ok(());
    }
    Err(Error::persist(
        path,
        "directory is not empty and holds no index; refusing to replace it",
    ))
}

/// Persist `index` at `path`, replacing any bundle already there.
pub async fn save(index: &VectorIndex, path: &Path) -> Result<()> {
    ensure_replaceable(path)?;
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(parent)
        .map_err(|e| Error::persist(path, format!("create {}: {e}", parent.display())))?;
    let staging = tempfile::Builder::new()
        .prefix(".coursedb-staging-")
        .tempdir_in(parent)
        .map_err(|e| Error::persist(path, format!("staging dir: {e}")))?;

    write_bundle(index, staging.path())
        .await
        .map_err(|e| Error::persist(path, format!("{e:#}")))?;
    swap_into_place(staging.path(), path)?;
    tracing::info!(
        "Saved index to {} ({} entries, dim={}, generation={})",
        path.display(),
        index.len(),
        index.dim(),
        index.generation()
    );
    Ok(())
}

async fn write_bundle(index: &VectorIndex, dir: &Path) -> anyhow::Result<()> {
    let dim = i32::try_from(index.dim())
        .map_err(|_| anyhow!("dimension {} too large", index.dim()))?;
    let schema = build_entries_schema(dim);
    let batches = index
        .entries()
        .chunks(WRITE_BATCH_ROWS)
        .map(|rows| entries_to_record_batch(rows, dim))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let conn = open_db(&dir.to_string_lossy()).await?;
    create_table_from(&conn, ENTRIES_TABLE, schema, batches).await?;
    let meta = [
        ("format_version", FORMAT_VERSION.to_string()),
        ("metric", index.metric().as_str().to_string()),
        ("dim", index.dim().to_string()),
        ("entry_count", index.len().to_string()),
        ("generation", index.generation().to_string()),
        ("embedder_id", index.embedder_id().to_string()),
        ("saved_at", Utc::now().to_rfc3339()),
    ];
    write_meta(&conn, META_TABLE, &meta).await
}

fn entries_to_record_batch(rows: &[Arc<IndexEntry>], dim: i32) -> anyhow::Result<RecordBatch> {
    let to_i32 =
        |v: usize| i32::try_from(v).map_err(|_| anyhow!("value {v} does not fit in Int32"));
    let mut chunk_indices = Vec::with_capacity(rows.len());
    let mut total_chunks = Vec::with_capacity(rows.len());
    for e in rows {
        chunk_indices.push(to_i32(e.metadata.chunk_index)?);
        total_chunks.push(to_i32(e.metadata.total_chunks)?);
    }
    let strings = |f: fn(&IndexEntry) -> &str| -> ArrayRef {
        Arc::new(StringArray::from(rows.iter().map(|e| f(e.as_ref())).collect::<Vec<_>>()))
    };
    let loaded_at: Vec<Option<i64>> =
        rows.iter().map(|e| e.metadata.loaded_at.map(|t| t.timestamp_millis())).collect();
    let vectors =
        rows.iter().map(|e| Some(e.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    let batch = RecordBatch::try_new(
        build_entries_schema(dim),
        vec![
            Arc::new(UInt64Array::from(rows.iter().map(|e| e.ordinal).collect::<Vec<_>>())),
            strings(|e| e.metadata.chunk_id.as_str()),
            strings(|e| e.metadata.doc_id.as_str()),
            strings(|e| e.metadata.doc_path.as_str()),
            strings(|e| e.metadata.category.as_str()),
            strings(|e| e.metadata.source_type.as_str()),
            Arc::new(Int32Array::from(chunk_indices)),
            Arc::new(Int32Array::from(total_chunks)),
            Arc::new(UInt64Array::from(
                rows.iter().map(|e| e.metadata.start as u64).collect::<Vec<_>>(),
            )),
            Arc::new(UInt64Array::from(
                rows.iter().map(|e| e.metadata.end as u64).collect::<Vec<_>>(),
            )),
            Arc::new(TimestampMillisecondArray::from(loaded_at)),
            strings(|e| e.text.as_str()),
            strings(|e| e.metadata.content_hash.as_str()),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
        ],
    )?;
    Ok(batch)
}

/// Replace `target` with `staged`: move the old bundle aside, move the new
/// one in, then delete the old one. Restores the old bundle if the second
/// rename fails.
fn swap_into_place(staged: &Path, target: &Path) -> Result<()> {
    ensure_replaceable(target)?;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    let backup = target.with_file_name(format!(".{name}.previous"));
    if backup.exists() {
        fs::remove_dir_all(&backup).map_err(|e| {
            Error::persist(target, format!("remove stale {}: {e}", backup.display()))
        })?;
    }
    let had_previous = target.exists();
    if had_previous {
        fs::rename(target, &backup)
            .map_err(|e| Error::persist(target, format!("move old bundle aside: {e}")))?;
    }
    if let Err(e) = fs::rename(staged, target) {
        if had_previous {
            if let Err(restore) = fs::rename(&backup, target) {
                tracing::error!(
                    "Could not restore previous bundle from {}: {}",
                    backup.display(),
                    restore
                );
            }
        }
        return Err(Error::persist(target, format!("move new bundle into place: {e}")));
    }
    if had_previous {
        if let Err(e) = fs::remove_dir_all(&backup) {
            tracing::warn!("Could not remove previous bundle {}: {}", backup.display(), e);
        }
    }
    Ok(())
}

/// Restore the index persisted at `path`.
pub async fn load(path: &Path) -> Result<VectorIndex> {
    let has_entries = table_dir(path, ENTRIES_TABLE).exists();
    let has_meta = table_dir(path, META_TABLE).exists();
    match (has_entries, has_meta) {
        (false, false) => return Err(Error::IndexNotFound { path: path.to_path_buf() }),
        (true, false) => return Err(Error::corrupt(path, "meta table missing")),
        (false, true) => return Err(Error::corrupt(path, "entries table missing")),
        (true, true) => {}
    }

    let conn = open_db(&path.to_string_lossy())
        .await
        .map_err(|e| Error::corrupt(path, format!("{e:#}")))?;
    let meta = read_meta(&conn, META_TABLE)
        .await
        .map_err(|e| Error::corrupt(path, format!("meta: {e:#}")))?;
    let header = Header::parse(&meta).map_err(|reason| Error::corrupt(path, reason))?;

    let batches = read_all(&conn, ENTRIES_TABLE)
        .await
        .map_err(|e| Error::corrupt(path, format!("entries: {e:#}")))?;
    let mut entries = Vec::with_capacity(header.entry_count);
    for batch in &batches {
        read_entries(batch, header.dim, &mut entries)
            .map_err(|e| Error::corrupt(path, format!("{e:#}")))?;
    }
    entries.sort_by_key(|e| e.ordinal);

    if entries.len() != header.entry_count {
        return Err(Error::corrupt(
            path,
            format!(
                "meta declares {} entries but the table holds {}",
                header.entry_count,
                entries.len()
            ),
        ));
    }
    if let Some((expected, e)) =
        entries.iter().enumerate().find(|(i, e)| e.ordinal != *i as u64)
    {
        return Err(Error::corrupt(
            path,
            format!("ordinal {} found where {} was expected", e.ordinal, expected),
        ));
    }

    tracing::debug!(
        "Loaded index from {} ({} entries, dim={})",
        path.display(),
        entries.len(),
        header.dim
    );
    Ok(VectorIndex::from_parts(
        header.metric,
        header.dim,
        header.generation,
        header.embedder_id,
        entries,
    ))
}

struct Header {
    metric: Metric,
    dim: usize,
    entry_count: usize,
    generation: u64,
    embedder_id: String,
}

impl Header {
    fn parse(meta: &BTreeMap<String, String>) -> std::result::Result<Self, String> {
        let get = |key: &str| meta.get(key).ok_or_else(|| format!("meta key '{key}' missing"));
        let version = get("format_version")?;
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version '{version}'"));
        }
        let metric: Metric = get("metric")?.parse().map_err(|e: Error| e.to_string())?;
        let dim: usize = get("dim")?.parse().map_err(|e| format!("bad dim: {e}"))?;
        if dim == 0 {
            return Err("dim must be positive".to_string());
        }
        let entry_count: usize =
            get("entry_count")?.parse().map_err(|e| format!("bad entry_count: {e}"))?;
        let generation: u64 =
            get("generation")?.parse().map_err(|e| format!("bad generation: {e}"))?;
        let embedder_id = get("embedder_id")?.clone();
        Ok(Self { metric, dim, entry_count, generation, embedder_id })
    }
}

fn read_entries(batch: &RecordBatch, dim: usize, out: &mut Vec<IndexEntry>) -> anyhow::Result<()> {
    let ordinals = typed_column::<UInt64Array>(batch, "ordinal")?;
    let chunk_ids = string_column(batch, "chunk_id")?;
    let doc_ids = string_column(batch, "doc_id")?;
    let doc_paths = string_column(batch, "doc_path")?;
    let categories = string_column(batch, "category")?;
    let source_types = string_column(batch, "source_type")?;
    let chunk_indices = typed_column::<Int32Array>(batch, "chunk_index")?;
    let total_chunks = typed_column::<Int32Array>(batch, "total_chunks")?;
    let starts = typed_column::<UInt64Array>(batch, "start")?;
    let ends = typed_column::<UInt64Array>(batch, "end")?;
    let loaded_at = typed_column::<TimestampMillisecondArray>(batch, "loaded_at")?;
    let contents = string_column(batch, "content")?;
    let hashes = string_column(batch, "content_hash")?;
    let vectors = typed_column::<FixedSizeListArray>(batch, "vector")?;

    for i in 0..batch.num_rows() {
        let vector = vectors.value(i).as_primitive::<Float32Type>().values().to_vec();
        if vector.len() != dim {
            return Err(anyhow!(
                "row {} has a {}-dim vector, index dim is {}",
                ordinals.value(i),
                vector.len(),
                dim
            ));
        }
        let loaded = if loaded_at.is_null(i) {
            None
        } else {
            DateTime::<Utc>::from_timestamp_millis(loaded_at.value(i))
        };
        out.push(IndexEntry {
            ordinal: ordinals.value(i),
            vector,
            text: contents.value(i).to_string(),
            metadata: EntryMetadata {
                chunk_id: chunk_ids.value(i).to_string(),
                doc_id: doc_ids.value(i).to_string(),
                doc_path: doc_paths.value(i).to_string(),
                category: categories.value(i).to_string(),
                source_type: source_types.value(i).parse::<SourceType>()?,
                chunk_index: usize::try_from(chunk_indices.value(i))?,
                total_chunks: usize::try_from(total_chunks.value(i))?,
                start: usize::try_from(starts.value(i))?,
                end: usize::try_from(ends.value(i))?,
                loaded_at: loaded,
                content_hash: hashes.value(i).to_string(),
            },
        });
    }
    Ok(())
}
