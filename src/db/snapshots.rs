//! Corpus-wide uncertainty snapshots
//!
//! Append-only: one row per completed retraining run, holding the mean
//! mutual information across all scored segments. The sequence charts the
//! model's learning progress for annotators.

use crate::Result;
use chrono::Utc;
use sqlx::SqlitePool;

/// Append one snapshot
pub async fn insert(pool: &SqlitePool, value: f64) -> Result<()> {
    sqlx::query("INSERT INTO uncertainty_snapshots (value, created_at) VALUES (?, ?)")
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    Ok(())
}

/// Distinct snapshot values in first-seen order
pub async fn distinct_history(pool: &SqlitePool) -> Result<Vec<f64>> {
    let values: Vec<f64> =
        sqlx::query_scalar("SELECT value FROM uncertainty_snapshots ORDER BY id")
            .fetch_all(pool)
            .await?;

    // Snapshot values are rounded to 4 decimals, so bit-exact comparison is
    // a stable dedup key
    let mut seen = std::collections::HashSet::new();
    Ok(values
        .into_iter()
        .filter(|v| seen.insert(v.to_bits()))
        .collect())
}

/// Total number of snapshots written
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uncertainty_snapshots")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
