//! Recording persistence
//!
//! Recordings are immutable after ingestion: the seeding pass inserts them
//! once and everything afterwards only reads.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// One ingested audio recording
#[derive(Debug, Clone)]
pub struct Recording {
    pub id: i64,
    pub filename: String,
    /// Total duration in seconds
    pub duration: f64,
    pub created_at: DateTime<Utc>,
}

/// Listing row with per-recording label progress
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    pub id: i64,
    pub filename: String,
    pub duration: f64,
    pub segment_count: i64,
    pub labeled_count: i64,
}

/// Insert a recording, returning its id
pub async fn insert(pool: &SqlitePool, filename: &str, duration: f64) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO recordings (filename, duration, created_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(filename)
    .bind(duration)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Load a recording by id
pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Recording>> {
    let row = sqlx::query(
        "SELECT id, filename, duration, created_at FROM recordings WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_recording).transpose()
}

/// All recordings ordered by filename
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Recording>> {
    let rows = sqlx::query(
        "SELECT id, filename, duration, created_at FROM recordings ORDER BY filename",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_recording).collect()
}

/// Listing with segment/label counts for the corpus overview
pub async fn list_summaries(pool: &SqlitePool) -> Result<Vec<RecordingSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.filename, r.duration,
               COUNT(s.id) AS segment_count,
               COALESCE(SUM(CASE WHEN s.labels IS NOT NULL THEN 1 ELSE 0 END), 0) AS labeled_count
        FROM recordings r
        LEFT JOIN segments s ON s.recording_id = r.id
        GROUP BY r.id
        ORDER BY r.filename
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(RecordingSummary {
                id: row.try_get("id")?,
                filename: row.try_get("filename")?,
                duration: row.try_get("duration")?,
                segment_count: row.try_get("segment_count")?,
                labeled_count: row.try_get("labeled_count")?,
            })
        })
        .collect()
}

/// Number of ingested recordings
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recordings")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn row_to_recording(row: sqlx::sqlite::SqliteRow) -> Result<Recording> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Recording {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        duration: row.try_get("duration")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("invalid timestamp '{}': {}", value, e)))
}
