//! Segment persistence
//!
//! The `labels` column holds a JSON string array; NULL means "unlabeled" and
//! `[]` means a confirmed "no call". `uncertainty` starts at the −1.0
//! sentinel ("never scored") and is overwritten by label submission (to 0)
//! and by each retraining run's scoring pass.

use crate::db::recordings::parse_timestamp;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// Uncertainty value for segments that have never been scored
pub const UNSCORED: f64 = -1.0;

/// One fixed-stride segment of a recording
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: i64,
    pub recording_id: i64,
    /// Start offset in seconds
    pub t_start: f64,
    /// None = unlabeled; Some(vec![]) = confirmed no call
    pub labels: Option<Vec<String>>,
    pub uncertainty: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    pub fn is_labeled(&self) -> bool {
        self.labels.is_some()
    }
}

/// Insert one segment (used by seeding)
pub async fn insert(pool: &SqlitePool, recording_id: i64, t_start: f64) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO segments (recording_id, t_start, labels, uncertainty, created_at, updated_at)
        VALUES (?, ?, NULL, ?, ?, ?)
        "#,
    )
    .bind(recording_id)
    .bind(t_start)
    .bind(UNSCORED)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Load one segment scoped to its recording (404 when either is wrong)
pub async fn get_in_recording(
    pool: &SqlitePool,
    recording_id: i64,
    segment_id: i64,
) -> Result<Option<Segment>> {
    let row = sqlx::query(
        r#"
        SELECT id, recording_id, t_start, labels, uncertainty, created_at, updated_at
        FROM segments WHERE id = ? AND recording_id = ?
        "#,
    )
    .bind(segment_id)
    .bind(recording_id)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_segment).transpose()
}

/// A recording's segments ordered by start offset
pub async fn for_recording(pool: &SqlitePool, recording_id: i64) -> Result<Vec<Segment>> {
    let rows = sqlx::query(
        r#"
        SELECT id, recording_id, t_start, labels, uncertainty, created_at, updated_at
        FROM segments WHERE recording_id = ? ORDER BY t_start
        "#,
    )
    .bind(recording_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_segment).collect()
}

/// Apply an annotator's label set: store the labels and reset uncertainty to
/// zero (labeled segments are certain by definition)
pub async fn apply_labels(pool: &SqlitePool, segment_id: i64, labels: &[String]) -> Result<()> {
    let labels_json = serde_json::to_string(labels)
        .map_err(|e| Error::Internal(format!("cannot serialize labels: {}", e)))?;

    let result = sqlx::query(
        r#"
        UPDATE segments SET labels = ?, uncertainty = 0.0, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&labels_json)
    .bind(Utc::now().to_rfc3339())
    .bind(segment_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("segment {}", segment_id)));
    }
    Ok(())
}

/// Count of segments carrying a label set (the retrain-threshold input)
pub async fn labeled_count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM segments WHERE labels IS NOT NULL")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Write a full scoring pass back in one transaction: either every segment's
/// uncertainty is updated and committed, or none of them are
pub async fn write_scores(pool: &SqlitePool, scores: &[(i64, f64)]) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;
    for (segment_id, uncertainty) in scores {
        sqlx::query("UPDATE segments SET uncertainty = ?, updated_at = ? WHERE id = ?")
            .bind(uncertainty)
            .bind(&now)
            .bind(segment_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

fn row_to_segment(row: sqlx::sqlite::SqliteRow) -> Result<Segment> {
    let labels_json: Option<String> = row.try_get("labels")?;
    let labels = labels_json
        .map(|json| {
            serde_json::from_str::<Vec<String>>(&json)
                .map_err(|e| Error::Internal(format!("invalid labels column '{}': {}", json, e)))
        })
        .transpose()?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Segment {
        id: row.try_get("id")?,
        recording_id: row.try_get("recording_id")?,
        t_start: row.try_get("t_start")?,
        labels,
        uncertainty: row.try_get("uncertainty")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
