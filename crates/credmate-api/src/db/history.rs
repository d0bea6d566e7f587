//! Snapshot history persistence.
//!
//! Entries are immutable once written. [`flush`] writes whatever the
//! in-memory chain holds beyond the highest persisted sequence, so it is
//! safe to call after any operation that may have appended snapshots.

use credmate_core::LicenseId;
use credmate_monitor::{HistoryEntry, SnapshotHistory};
use sqlx::PgPool;

use super::{from_document, load_error, to_document, HydrationError};

pub async fn insert(pool: &PgPool, entry: &HistoryEntry) -> Result<(), sqlx::Error> {
    let document = to_document("snapshot_history", entry)?;
    sqlx::query(
        "INSERT INTO snapshot_history
             (license_id, sequence, as_of, snapshot_id, previous_hash, entry_hash, document, recorded_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (license_id, sequence) DO NOTHING",
    )
    .bind(*entry.license_id.as_uuid())
    .bind(i64::try_from(entry.sequence).unwrap_or(i64::MAX))
    .bind(entry.snapshot.as_of)
    .bind(entry.snapshot.snapshot_id.to_hex())
    .bind(&entry.previous_hash)
    .bind(&entry.entry_hash)
    .bind(&document)
    .bind(*entry.recorded_at.as_datetime())
    .execute(pool)
    .await?;
    Ok(())
}

/// Highest persisted sequence for a license, zero when none.
pub async fn persisted_sequence(pool: &PgPool, license_id: LicenseId) -> Result<u64, sqlx::Error> {
    let (max,): (Option<i64>,) =
        sqlx::query_as("SELECT MAX(sequence) FROM snapshot_history WHERE license_id = $1")
            .bind(*license_id.as_uuid())
            .fetch_one(pool)
            .await?;
    Ok(max.and_then(|m| u64::try_from(m).ok()).unwrap_or(0))
}

/// Persist every in-memory entry for `license_id` not yet in the database.
/// Returns the number written.
pub async fn flush(
    pool: &PgPool,
    history: &SnapshotHistory,
    license_id: LicenseId,
) -> Result<usize, sqlx::Error> {
    let persisted = persisted_sequence(pool, license_id).await?;
    let pending: Vec<HistoryEntry> = history
        .history(license_id)
        .into_iter()
        .filter(|e| e.sequence > persisted)
        .collect();
    for entry in &pending {
        insert(pool, entry).await?;
    }
    Ok(pending.len())
}

/// All entries, each license's chain in sequence order.
pub async fn load_all(pool: &PgPool) -> Result<Vec<HistoryEntry>, HydrationError> {
    let rows: Vec<(serde_json::Value,)> =
        sqlx::query_as("SELECT document FROM snapshot_history ORDER BY license_id, sequence")
            .fetch_all(pool)
            .await
            .map_err(load_error("snapshot_history"))?;
    rows.into_iter()
        .map(|(doc,)| from_document("snapshot_history", doc))
        .collect()
}
