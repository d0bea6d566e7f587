//! Jurisdiction and rule-version persistence.

use credmate_rules::{Jurisdiction, RuleVersion};
use sqlx::PgPool;

use super::{from_document, load_error, to_document, HydrationError};

/// Insert a jurisdiction. Re-registering an identical definition is a no-op.
pub async fn insert_jurisdiction(pool: &PgPool, jurisdiction: &Jurisdiction) -> Result<(), sqlx::Error> {
    let document = to_document("jurisdictions", jurisdiction)?;
    sqlx::query(
        "INSERT INTO jurisdictions (id, document) VALUES ($1, $2)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(jurisdiction.id.as_str())
    .bind(&document)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert a published rule version. Versions are immutable, so a second
/// insert of the same `(jurisdiction, sequence)` is ignored.
pub async fn insert_version(pool: &PgPool, version: &RuleVersion) -> Result<(), sqlx::Error> {
    let document = to_document("rule_versions", version)?;
    sqlx::query(
        "INSERT INTO rule_versions
             (jurisdiction_id, sequence, effective_from, content_digest, document, published_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (jurisdiction_id, sequence) DO NOTHING",
    )
    .bind(version.jurisdiction_id.as_str())
    .bind(i32::try_from(version.version_id.sequence).unwrap_or(i32::MAX))
    .bind(version.effective_from)
    .bind(version.content_digest.to_hex())
    .bind(&document)
    .bind(*version.published_at.as_datetime())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_jurisdictions(pool: &PgPool) -> Result<Vec<Jurisdiction>, HydrationError> {
    let rows: Vec<(serde_json::Value,)> =
        sqlx::query_as("SELECT document FROM jurisdictions ORDER BY registered_at, id")
            .fetch_all(pool)
            .await
            .map_err(load_error("jurisdictions"))?;
    rows.into_iter()
        .map(|(doc,)| from_document("jurisdictions", doc))
        .collect()
}

/// All versions, ordered so each jurisdiction's versions arrive in
/// sequence order.
pub async fn load_versions(pool: &PgPool) -> Result<Vec<RuleVersion>, HydrationError> {
    let rows: Vec<(serde_json::Value,)> =
        sqlx::query_as("SELECT document FROM rule_versions ORDER BY jurisdiction_id, sequence")
            .fetch_all(pool)
            .await
            .map_err(load_error("rule_versions"))?;
    rows.into_iter()
        .map(|(doc,)| from_document("rule_versions", doc))
        .collect()
}
