//! License, activity, claim and observation persistence.

use credmate_ledger::{Claim, CmeActivity, License, StatusObservation};
use sqlx::PgPool;

use super::{from_document, load_error, to_document, HydrationError};

/// Insert or replace a license document with its latest state.
pub async fn upsert_license(pool: &PgPool, license: &License) -> Result<(), sqlx::Error> {
    let document = to_document("licenses", license)?;
    sqlx::query(
        "INSERT INTO licenses (id, licensee_id, jurisdiction_id, document, registered_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, now())
         ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document, updated_at = now()",
    )
    .bind(*license.license_id.as_uuid())
    .bind(*license.licensee_id.as_uuid())
    .bind(license.jurisdiction_id.as_str())
    .bind(&document)
    .bind(*license.registered_at.as_datetime())
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert or replace an activity. Corrections rewrite the superseded
/// record's `superseded_by` link, so the original row is updated too.
pub async fn upsert_activity(pool: &PgPool, activity: &CmeActivity) -> Result<(), sqlx::Error> {
    let document = to_document("activities", activity)?;
    sqlx::query(
        "INSERT INTO activities (id, licensee_id, completion_date, document, recorded_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document",
    )
    .bind(*activity.activity_id.as_uuid())
    .bind(*activity.licensee_id.as_uuid())
    .bind(activity.completion_date)
    .bind(&document)
    .bind(*activity.recorded_at.as_datetime())
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert or replace a claim (withdrawal sets `withdrawn_at`).
pub async fn upsert_claim(pool: &PgPool, claim: &Claim) -> Result<(), sqlx::Error> {
    let document = to_document("claims", claim)?;
    sqlx::query(
        "INSERT INTO claims (id, activity_id, license_id, document, claimed_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document",
    )
    .bind(*claim.claim_id.as_uuid())
    .bind(*claim.activity_id.as_uuid())
    .bind(*claim.license_id.as_uuid())
    .bind(&document)
    .bind(*claim.claimed_at.as_datetime())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_observation(
    pool: &PgPool,
    observation: &StatusObservation,
) -> Result<(), sqlx::Error> {
    let document = to_document("status_observations", observation)?;
    sqlx::query(
        "INSERT INTO status_observations (license_id, document, observed_at) VALUES ($1, $2, $3)",
    )
    .bind(*observation.license_id.as_uuid())
    .bind(&document)
    .bind(*observation.observed_at.as_datetime())
    .execute(pool)
    .await?;
    Ok(())
}

async fn load_documents(
    pool: &PgPool,
    table: &'static str,
    sql: &'static str,
) -> Result<Vec<serde_json::Value>, HydrationError> {
    let rows: Vec<(serde_json::Value,)> = sqlx::query_as(sql)
        .fetch_all(pool)
        .await
        .map_err(load_error(table))?;
    Ok(rows.into_iter().map(|(doc,)| doc).collect())
}

pub async fn load_licenses(pool: &PgPool) -> Result<Vec<License>, HydrationError> {
    load_documents(pool, "licenses", "SELECT document FROM licenses ORDER BY registered_at")
        .await?
        .into_iter()
        .map(|doc| from_document("licenses", doc))
        .collect()
}

pub async fn load_activities(pool: &PgPool) -> Result<Vec<CmeActivity>, HydrationError> {
    load_documents(pool, "activities", "SELECT document FROM activities ORDER BY recorded_at")
        .await?
        .into_iter()
        .map(|doc| from_document("activities", doc))
        .collect()
}

pub async fn load_claims(pool: &PgPool) -> Result<Vec<Claim>, HydrationError> {
    load_documents(pool, "claims", "SELECT document FROM claims ORDER BY claimed_at")
        .await?
        .into_iter()
        .map(|doc| from_document("claims", doc))
        .collect()
}

pub async fn load_observations(pool: &PgPool) -> Result<Vec<StatusObservation>, HydrationError> {
    load_documents(
        pool,
        "status_observations",
        "SELECT document FROM status_observations ORDER BY id",
    )
    .await?
    .into_iter()
    .map(|doc| from_document("status_observations", doc))
    .collect()
}
