//! # Re-evaluation Sweep
//!
//! Evaluates a batch of licenses on the tokio runtime. Each evaluation runs
//! on the blocking pool under a timeout, at most `concurrency` at a time.
//! Transient failures (timeouts, task failures, unavailable dependencies)
//! are retried with backoff. A license that still fails is reported and
//! handed back to the evaluator for rescheduling; the rest of the sweep
//! carries on.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use credmate_compliance::ComplianceStatus;
use credmate_core::{LicenseId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::engine::{ComplianceEngine, LicenseEvaluator};
use crate::error::MonitorError;

/// Delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Do not retry.
    None,
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// `initial_delay_ms * multiplier^(attempt - 1)`, capped.
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: u32,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: 2,
        }
    }
}

impl RetryStrategy {
    /// Delay after failed attempt number `attempt` (1-based), or `None`
    /// when the strategy does not retry.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed { delay_ms } => Some(Duration::from_millis(*delay_ms)),
            Self::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let factor = u64::from(*multiplier).saturating_pow(attempt.saturating_sub(1));
                let delay = initial_delay_ms.saturating_mul(factor).min(*max_delay_ms);
                Some(Duration::from_millis(delay))
            }
        }
    }
}

/// Sweep tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Per-license evaluation budget.
    pub timeout_ms: u64,
    /// Licenses evaluated concurrently.
    pub concurrency: usize,
    /// Attempts per license, including the first.
    pub max_attempts: u32,
    /// Backoff between attempts.
    pub retry: RetryStrategy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            concurrency: 8,
            max_attempts: 3,
            retry: RetryStrategy::default(),
        }
    }
}

/// One license the sweep could not evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub license_id: LicenseId,
    /// Machine-readable error kind.
    pub kind: String,
    pub error: String,
    pub attempts: u32,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// The evaluation date.
    pub as_of: NaiveDate,
    /// Licenses evaluated successfully.
    pub evaluated: usize,
    /// Licenses that exhausted their attempts.
    pub failed: Vec<SweepFailure>,
    /// Retries performed across all licenses.
    pub retried: usize,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl SweepReport {
    /// Whether every license was evaluated.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct LicenseRun {
    license_id: LicenseId,
    result: Result<ComplianceStatus, MonitorError>,
    attempts: u32,
}

/// Runs sweeps with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct SweepRunner {
    config: SweepConfig,
}

impl SweepRunner {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Evaluate every license in `licenses` as of `as_of`.
    pub async fn run<E: LicenseEvaluator>(
        &self,
        evaluator: Arc<E>,
        licenses: Vec<LicenseId>,
        as_of: NaiveDate,
    ) -> SweepReport {
        let started_at = Timestamp::now();
        let total = licenses.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for license_id in licenses {
            let semaphore = semaphore.clone();
            let evaluator = evaluator.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return LicenseRun {
                        license_id,
                        result: Err(MonitorError::TaskFailed("sweep cancelled".into())),
                        attempts: 0,
                    };
                };
                evaluate_with_retry(evaluator, license_id, as_of, &config).await
            });
        }

        let mut evaluated = 0;
        let mut retried = 0;
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let run = match joined {
                Ok(run) => run,
                Err(err) => {
                    tracing::error!(error = %err, "sweep task aborted");
                    continue;
                }
            };
            retried += run.attempts.saturating_sub(1) as usize;
            match run.result {
                Ok(_) => evaluated += 1,
                Err(err) => {
                    tracing::warn!(
                        license_id = %run.license_id,
                        attempts = run.attempts,
                        kind = err.kind(),
                        error = %err,
                        "license evaluation failed during sweep"
                    );
                    evaluator.record_failure(run.license_id, &err);
                    failed.push(SweepFailure {
                        license_id: run.license_id,
                        kind: err.kind().to_string(),
                        error: err.to_string(),
                        attempts: run.attempts,
                    });
                }
            }
        }

        tracing::info!(
            %as_of,
            total,
            evaluated,
            failed = failed.len(),
            retried,
            "sweep finished"
        );

        SweepReport {
            as_of,
            evaluated,
            failed,
            retried,
            started_at,
            finished_at: Timestamp::now(),
        }
    }
}

async fn evaluate_once<E: LicenseEvaluator>(
    evaluator: Arc<E>,
    license_id: LicenseId,
    as_of: NaiveDate,
    timeout_ms: u64,
) -> Result<ComplianceStatus, MonitorError> {
    // On timeout the blocking task is detached and its result discarded.
    let task = tokio::task::spawn_blocking(move || evaluator.evaluate_license(license_id, as_of));
    match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(MonitorError::TaskFailed(join.to_string())),
        Err(_) => Err(MonitorError::Timeout {
            license: license_id,
            after_ms: timeout_ms,
        }),
    }
}

async fn evaluate_with_retry<E: LicenseEvaluator>(
    evaluator: Arc<E>,
    license_id: LicenseId,
    as_of: NaiveDate,
    config: &SweepConfig,
) -> LicenseRun {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = evaluate_once(evaluator.clone(), license_id, as_of, config.timeout_ms).await;
        let retry_delay = match result {
            Err(ref err) if err.is_transient() && attempt < max_attempts => {
                config.retry.delay_for_attempt(attempt)
            }
            _ => None,
        };
        let Some(delay) = retry_delay else {
            return LicenseRun {
                license_id,
                result,
                attempts: attempt,
            };
        };
        if let Err(ref err) = result {
            tracing::debug!(%license_id, attempt, ?delay, error = %err, "retrying license evaluation");
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// One full pass: consume rule events, then evaluate every due license.
pub async fn run_sweep_once(engine: Arc<ComplianceEngine>, runner: &SweepRunner) -> SweepReport {
    let sync_engine = engine.clone();
    match tokio::task::spawn_blocking(move || sync_engine.sync_rule_events()).await {
        Ok(events) if events > 0 => tracing::info!(events, "rule events processed"),
        Ok(_) => {}
        Err(err) => tracing::error!(error = %err, "rule event sync failed"),
    }
    let as_of = engine.today();
    let candidates = engine.sweep_candidates(as_of);
    runner.run(engine, candidates, as_of).await
}

/// Run [`run_sweep_once`] every `interval`, forever.
pub async fn sweep_loop(engine: Arc<ComplianceEngine>, runner: SweepRunner, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let report = run_sweep_once(engine.clone(), &runner).await;
        if !report.is_clean() {
            tracing::warn!(failed = report.failed.len(), "sweep completed with failures");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        FailTransientTimes(u32),
        FailPermanently,
        Sleep(Duration),
        Panic,
    }

    #[derive(Default)]
    struct MockEvaluator {
        behavior: Mutex<HashMap<LicenseId, Behavior>>,
        calls: Mutex<HashMap<LicenseId, u32>>,
        failures: Mutex<Vec<LicenseId>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl MockEvaluator {
        fn with(behaviors: &[(LicenseId, Behavior)]) -> Arc<Self> {
            let mock = Self::default();
            mock.behavior.lock().extend(behaviors.iter().copied());
            Arc::new(mock)
        }

        fn calls(&self, id: LicenseId) -> u32 {
            self.calls.lock().get(&id).copied().unwrap_or(0)
        }
    }

    impl LicenseEvaluator for MockEvaluator {
        fn evaluate_license(
            &self,
            license_id: LicenseId,
            _as_of: NaiveDate,
        ) -> Result<ComplianceStatus, MonitorError> {
            let call = {
                let mut calls = self.calls.lock();
                let c = calls.entry(license_id).or_insert(0);
                *c += 1;
                *c
            };
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            let behavior = self
                .behavior
                .lock()
                .get(&license_id)
                .copied()
                .unwrap_or(Behavior::Succeed);
            let result = match behavior {
                Behavior::Succeed => {
                    std::thread::sleep(Duration::from_millis(5));
                    Ok(ComplianceStatus::Compliant)
                }
                Behavior::FailTransientTimes(n) if call <= n => {
                    Err(MonitorError::Transient("ledger busy".into()))
                }
                Behavior::FailTransientTimes(_) => Ok(ComplianceStatus::AtRisk),
                Behavior::FailPermanently => Err(MonitorError::History("corrupt".into())),
                Behavior::Sleep(d) => {
                    std::thread::sleep(d);
                    Ok(ComplianceStatus::Compliant)
                }
                Behavior::Panic => {
                    self.running.fetch_sub(1, Ordering::SeqCst);
                    panic!("evaluator bug");
                }
            };
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn record_failure(&self, license_id: LicenseId, _error: &MonitorError) {
            self.failures.lock().push(license_id);
        }
    }

    fn fast_config() -> SweepConfig {
        SweepConfig {
            timeout_ms: 1_000,
            concurrency: 4,
            max_attempts: 3,
            retry: RetryStrategy::Fixed { delay_ms: 1 },
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let s = RetryStrategy::default();
        assert_eq!(s.delay_for_attempt(1), Some(Duration::from_millis(200)));
        assert_eq!(s.delay_for_attempt(2), Some(Duration::from_millis(400)));
        assert_eq!(s.delay_for_attempt(10), Some(Duration::from_millis(5_000)));
        assert_eq!(RetryStrategy::None.delay_for_attempt(1), None);
    }

    #[tokio::test]
    async fn all_licenses_evaluated() {
        let ids: Vec<LicenseId> = (0..10).map(|_| LicenseId::new()).collect();
        let mock = MockEvaluator::with(&[]);
        let report = SweepRunner::new(fast_config())
            .run(mock.clone(), ids.clone(), as_of())
            .await;
        assert_eq!(report.evaluated, 10);
        assert!(report.is_clean());
        assert_eq!(report.retried, 0);
        assert!(ids.iter().all(|id| mock.calls(*id) == 1));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let flaky = LicenseId::new();
        let mock = MockEvaluator::with(&[(flaky, Behavior::FailTransientTimes(2))]);
        let report = SweepRunner::new(fast_config())
            .run(mock.clone(), vec![flaky, LicenseId::new()], as_of())
            .await;
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.retried, 2);
        assert_eq!(mock.calls(flaky), 3);
        assert!(mock.failures.lock().is_empty());
    }

    #[tokio::test]
    async fn permanent_failure_is_isolated() {
        let bad = LicenseId::new();
        let good = LicenseId::new();
        let mock = MockEvaluator::with(&[(bad, Behavior::FailPermanently)]);
        let report = SweepRunner::new(fast_config())
            .run(mock.clone(), vec![bad, good], as_of())
            .await;
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].license_id, bad);
        assert_eq!(report.failed[0].kind, "HISTORY");
        assert_eq!(report.failed[0].attempts, 1);
        assert_eq!(mock.calls(bad), 1);
        assert_eq!(*mock.failures.lock(), vec![bad]);
    }

    #[tokio::test]
    async fn slow_evaluation_times_out() {
        let slow = LicenseId::new();
        let mock = MockEvaluator::with(&[(slow, Behavior::Sleep(Duration::from_millis(300)))]);
        let config = SweepConfig {
            timeout_ms: 30,
            max_attempts: 2,
            ..fast_config()
        };
        let report = SweepRunner::new(config)
            .run(mock.clone(), vec![slow, LicenseId::new()], as_of())
            .await;
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].kind, "EVALUATION_TIMEOUT");
        assert_eq!(report.failed[0].attempts, 2);
    }

    #[tokio::test]
    async fn panicking_evaluation_reported_as_task_failure() {
        let broken = LicenseId::new();
        let mock = MockEvaluator::with(&[(broken, Behavior::Panic)]);
        let report = SweepRunner::new(fast_config())
            .run(mock.clone(), vec![broken], as_of())
            .await;
        assert_eq!(report.evaluated, 0);
        assert_eq!(report.failed[0].kind, "EVALUATION_TASK_FAILED");
        assert_eq!(report.failed[0].attempts, 3);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let ids: Vec<LicenseId> = (0..12).map(|_| LicenseId::new()).collect();
        let behaviors: Vec<(LicenseId, Behavior)> = ids
            .iter()
            .map(|id| (*id, Behavior::Sleep(Duration::from_millis(20))))
            .collect();
        let mock = MockEvaluator::with(&behaviors);
        let config = SweepConfig {
            concurrency: 2,
            ..fast_config()
        };
        let report = SweepRunner::new(config).run(mock.clone(), ids, as_of()).await;
        assert_eq!(report.evaluated, 12);
        assert!(mock.max_running.load(Ordering::SeqCst) <= 2);
    }
}
