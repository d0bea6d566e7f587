//! # Database Persistence Layer
//!
//! Optional Postgres persistence via SQLx. When `DATABASE_URL` is set,
//! every accepted write is also stored as a JSONB document and the
//! in-memory stores are hydrated from the database at start-up. When
//! absent, the API runs in-memory only (development and tests).
//!
//! The in-memory engine stays authoritative for reads. Tables are
//! append-only except for the license and claim documents, whose latest
//! state replaces the previous row.

pub mod history;
pub mod ledger;
pub mod rules;

use std::time::Duration;

use credmate_monitor::ComplianceEngine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` when `database_url` is `None` (in-memory-only mode).
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = database_url else {
        tracing::warn!(
            "DATABASE_URL not set, running in-memory only. State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Failure while loading persisted state back into memory.
#[derive(Error, Debug)]
pub enum HydrationError {
    #[error("failed to load {table}: {source}")]
    Load {
        table: &'static str,
        source: sqlx::Error,
    },
    #[error("stored {table} document is unreadable: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

/// Counts of records restored by [`hydrate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationReport {
    pub jurisdictions: usize,
    pub rule_versions: usize,
    pub licenses: usize,
    pub activities: usize,
    pub claims: usize,
    pub observations: usize,
    pub snapshots: usize,
}

/// Load every persisted record into the engine's stores, in dependency
/// order: jurisdictions, rule versions, licenses, activities, claims,
/// observations, then snapshot history.
pub async fn hydrate(
    pool: &PgPool,
    engine: &ComplianceEngine,
) -> Result<HydrationReport, HydrationError> {
    let mut report = HydrationReport::default();

    for jurisdiction in rules::load_jurisdictions(pool).await? {
        engine
            .rules()
            .register_jurisdiction(jurisdiction)
            .map_err(|e| corrupt("jurisdictions", e))?;
        report.jurisdictions += 1;
    }
    for version in rules::load_versions(pool).await? {
        engine
            .rules()
            .restore_version(version)
            .map_err(|e| corrupt("rule_versions", e))?;
        report.rule_versions += 1;
    }
    for license in ledger::load_licenses(pool).await? {
        engine.ledger().restore_license(license);
        report.licenses += 1;
    }
    for activity in ledger::load_activities(pool).await? {
        engine.ledger().restore_activity(activity);
        report.activities += 1;
    }
    for claim in ledger::load_claims(pool).await? {
        engine.ledger().restore_claim(claim);
        report.claims += 1;
    }
    for observation in ledger::load_observations(pool).await? {
        engine
            .ledger()
            .record_status_observation(observation)
            .map_err(|e| corrupt("status_observations", e))?;
        report.observations += 1;
    }
    for entry in history::load_all(pool).await? {
        engine
            .history()
            .restore(entry)
            .map_err(|e| corrupt("snapshot_history", e))?;
        report.snapshots += 1;
    }

    tracing::info!(
        jurisdictions = report.jurisdictions,
        rule_versions = report.rule_versions,
        licenses = report.licenses,
        activities = report.activities,
        claims = report.claims,
        observations = report.observations,
        snapshots = report.snapshots,
        "Hydrated in-memory stores from database"
    );
    Ok(report)
}

fn corrupt(table: &'static str, err: impl std::fmt::Display) -> HydrationError {
    HydrationError::Corrupt {
        table,
        detail: err.to_string(),
    }
}

/// Serialize a domain value into a JSONB document.
pub(crate) fn to_document<T: Serialize>(
    table: &'static str,
    value: &T,
) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, table, "failed to serialize document");
        sqlx::Error::Encode(Box::new(e))
    })
}

/// Deserialize a stored JSONB document.
pub(crate) fn from_document<T: DeserializeOwned>(
    table: &'static str,
    document: serde_json::Value,
) -> Result<T, HydrationError> {
    serde_json::from_value(document).map_err(|e| corrupt(table, e))
}

pub(crate) fn load_error(table: &'static str) -> impl FnOnce(sqlx::Error) -> HydrationError {
    move |source| HydrationError::Load { table, source }
}
