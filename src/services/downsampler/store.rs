use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{DownsampleError, Downsampler, NewDownsampler};
use crate::store::encode_tags;

const SELECT_COLUMNS: &str = "id, source_metric, out_metric, tags, window_spec, aggregators, \
     run_every_ns, last_progress_mark";

struct DownsamplerRow {
    id: i64,
    source_metric: String,
    out_metric: String,
    tags: String,
    window_spec: String,
    aggregators: String,
    run_every_ns: i64,
    last_progress_mark: Option<i64>,
}

impl DownsamplerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_metric: row.get(1)?,
            out_metric: row.get(2)?,
            tags: row.get(3)?,
            window_spec: row.get(4)?,
            aggregators: row.get(5)?,
            run_every_ns: row.get(6)?,
            last_progress_mark: row.get(7)?,
        })
    }
}

impl TryFrom<DownsamplerRow> for Downsampler {
    type Error = serde_json::Error;

    fn try_from(row: DownsamplerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            source_metric: row.source_metric,
            out_metric: row.out_metric,
            tags: serde_json::from_str(&row.tags)?,
            window: serde_json::from_str(&row.window_spec)?,
            aggregators: serde_json::from_str(&row.aggregators)?,
            run_every_ns: row.run_every_ns,
            last_progress_mark: row.last_progress_mark,
        })
    }
}

/// Persists an already validated request.
pub fn create_downsampler(
    conn: &Connection,
    request: &NewDownsampler,
    run_every_ns: i64,
) -> Result<Downsampler, DownsampleError> {
    conn.execute(
        "INSERT INTO downsamplers (source_metric, out_metric, tags, window_spec, aggregators, run_every_ns) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            request.source_metric.trim(),
            request.out_metric.trim(),
            encode_tags(&request.tags)?,
            serde_json::to_string(&request.window)?,
            serde_json::to_string(&request.aggregators)?,
            run_every_ns,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_downsampler(conn, id)?.ok_or(DownsampleError::NotFound(id))
}

pub fn get_downsampler(conn: &Connection, id: i64) -> Result<Option<Downsampler>, DownsampleError> {
    let row = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM downsamplers WHERE id = ?1"),
            params![id],
            DownsamplerRow::from_row,
        )
        .optional()?;
    Ok(row.map(Downsampler::try_from).transpose()?)
}

pub fn list_downsamplers(conn: &Connection) -> Result<Vec<Downsampler>, DownsampleError> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM downsamplers ORDER BY id"))?;
    let rows = stmt
        .query_map([], DownsamplerRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter()
        .map(|row| Downsampler::try_from(row).map_err(DownsampleError::from))
        .collect()
}

/// Returns false when no such downsampler existed.
pub fn delete_downsampler(conn: &Connection, id: i64) -> Result<bool, DownsampleError> {
    let deleted = conn.execute("DELETE FROM downsamplers WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn set_progress_mark(conn: &Connection, id: i64, mark: i64) -> Result<(), DownsampleError> {
    let updated = conn.execute(
        "UPDATE downsamplers SET last_progress_mark = ?1 WHERE id = ?2",
        params![mark, id],
    )?;
    if updated == 0 {
        return Err(DownsampleError::NotFound(id));
    }
    Ok(())
}
