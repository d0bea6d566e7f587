//! # Start-up Sequence
//!
//! Brings a fresh process to a serving state before the listener binds.
//!
//! ## Bootstrap Sequence
//!
//! 1. **Hydrate**: Restore persisted records into the engine (when a
//!    database pool is configured).
//! 2. **Install Rulepacks**: Load every YAML pack in `RULEPACK_DIR`.
//!    Versions already present are skipped, so restarts publish nothing.
//! 3. **Catch Up**: Re-evaluate every license once. Hydration restores
//!    history but not the evaluation schedule; this repopulates it and
//!    records anything that changed while the process was down.
//!
//! The sweep is started separately with [`spawn_sweep`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use credmate_core::LicenseId;
use credmate_monitor::{run_sweep_once, sweep_loop, ComplianceEngine, SweepRunner};
use credmate_rules::{load_rulepack_dir, RulepackError};
use sqlx::PgPool;
use tokio::task::JoinHandle;

use crate::db::{self, HydrationError, HydrationReport};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors during start-up.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Persisted state could not be restored.
    #[error("hydration failed: {0}")]
    Hydration(#[from] HydrationError),

    /// A rulepack could not be loaded or installed.
    #[error("rulepack error: {0}")]
    Rulepack(#[from] RulepackError),

    /// Installed rules could not be written through.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What start-up did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub hydration: Option<HydrationReport>,
    pub rulepacks_installed: usize,
    pub versions_published: usize,
    pub licenses_evaluated: usize,
    pub evaluation_failures: usize,
}

/// Run the start-up sequence against `state`.
pub async fn bootstrap(state: &AppState) -> Result<BootstrapReport, BootstrapError> {
    let mut report = BootstrapReport::default();

    if let Some(pool) = &state.db_pool {
        report.hydration = Some(db::hydrate(pool, &state.engine).await?);
    }

    if let Some(dir) = &state.config.rulepack_dir {
        let (packs, published) = install_rulepacks(&state.engine, dir)?;
        report.rulepacks_installed = packs;
        report.versions_published = published;
        if let Some(pool) = &state.db_pool {
            persist_rules(pool, &state.engine).await?;
        }
    }

    let engine = state.engine.clone();
    let (evaluated, failed) = tokio::task::spawn_blocking(move || catch_up(&engine))
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "catch-up evaluation task failed");
            (0, 0)
        });
    report.licenses_evaluated = evaluated;
    report.evaluation_failures = failed;

    if let Some(pool) = &state.db_pool {
        flush_all_history(pool, &state.engine).await?;
    }

    tracing::info!(
        hydrated = report.hydration.is_some(),
        rulepacks = report.rulepacks_installed,
        versions_published = report.versions_published,
        licenses_evaluated = report.licenses_evaluated,
        evaluation_failures = report.evaluation_failures,
        jurisdictions = state.rules().jurisdictions().len(),
        "bootstrap complete"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Phase 2: Rulepacks
// ---------------------------------------------------------------------------

fn install_rulepacks(
    engine: &ComplianceEngine,
    dir: &Path,
) -> Result<(usize, usize), RulepackError> {
    let packs = load_rulepack_dir(dir)?;
    let mut published = 0;
    for pack in &packs {
        published += pack.install(engine.rules())?.versions_published;
    }
    tracing::info!(dir = %dir.display(), packs = packs.len(), published, "rulepacks loaded");
    Ok((packs.len(), published))
}

/// Write every jurisdiction and version through. Inserts of rows that
/// already exist are ignored.
async fn persist_rules(pool: &PgPool, engine: &ComplianceEngine) -> Result<(), sqlx::Error> {
    for jurisdiction in engine.rules().jurisdictions() {
        db::rules::insert_jurisdiction(pool, &jurisdiction).await?;
        if let Ok(versions) = engine.rules().versions(&jurisdiction.id) {
            for version in versions {
                db::rules::insert_version(pool, &version).await?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Phase 3: Catch-up evaluation
// ---------------------------------------------------------------------------

fn catch_up(engine: &ComplianceEngine) -> (usize, usize) {
    // Rule events from the install are covered by the full pass below.
    engine.sync_rule_events();

    let mut evaluated = 0;
    let mut failed = 0;
    for license in engine.ledger().licenses() {
        match engine.reevaluate(license.license_id) {
            Ok(_) => evaluated += 1,
            Err(err) => {
                failed += 1;
                tracing::warn!(
                    license_id = %license.license_id,
                    kind = err.kind(),
                    error = %err,
                    "catch-up evaluation failed"
                );
            }
        }
    }
    (evaluated, failed)
}

async fn flush_all_history(pool: &PgPool, engine: &ComplianceEngine) -> Result<usize, sqlx::Error> {
    let mut written = 0;
    let licenses: Vec<LicenseId> = engine
        .ledger()
        .licenses()
        .into_iter()
        .map(|l| l.license_id)
        .collect();
    for license_id in licenses {
        written += db::history::flush(pool, engine.history(), license_id).await?;
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Start the periodic sweep. With a database pool configured each pass is
/// followed by a history flush so swept snapshots survive restarts.
pub fn spawn_sweep(state: &AppState) -> JoinHandle<()> {
    let engine = state.engine.clone();
    let runner = SweepRunner::new(state.config.sweep.clone());
    let interval = state.config.sweep_interval;
    match state.db_pool.clone() {
        None => tokio::spawn(sweep_loop(engine, runner, interval)),
        Some(pool) => tokio::spawn(persistent_sweep_loop(engine, runner, interval, pool)),
    }
}

async fn persistent_sweep_loop(
    engine: Arc<ComplianceEngine>,
    runner: SweepRunner,
    interval: Duration,
    pool: PgPool,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let report = run_sweep_once(engine.clone(), &runner).await;
        if !report.is_clean() {
            tracing::warn!(failed = report.failed.len(), "sweep completed with failures");
        }
        match flush_all_history(&pool, &engine).await {
            Ok(written) => tracing::debug!(written, "sweep history flushed"),
            Err(err) => tracing::error!(error = %err, "failed to persist sweep history"),
        }
    }
}
