//! # credmate-monitor: Continuous Compliance Monitoring
//!
//! Keeps every license's compliance snapshot current as the ledger, the
//! rules and the calendar move.
//!
//! - [`scheduler`]: when each license must next be evaluated.
//! - [`notification`]: which snapshot transitions are worth announcing.
//! - [`history`]: hash-chained per-license snapshot time series.
//! - [`engine`]: the [`ComplianceEngine`] that ties them together.
//! - [`sweep`]: tokio batch re-evaluation with timeouts and retries.

pub mod engine;
pub mod error;
pub mod history;
pub mod notification;
pub mod scheduler;
pub mod sweep;

pub use engine::{
    ComplianceEngine, EngineConfig, EngineMetrics, EngineMetricsSnapshot, EvaluationOutcome,
    LicenseEvaluator,
};
pub use error::MonitorError;
pub use history::{ChainVerification, HistoryEntry, SnapshotHistory, GENESIS_HASH};
pub use notification::{
    decide, decide_with, DeadlineKind, Notification, NotificationIntent, NotificationOutbox,
    Severity,
};
pub use scheduler::{
    next_evaluation_date, upcoming_deadlines, EntryStatus, EvaluationSchedule, ReminderConfig,
    ScheduleEntry, ScheduleReason, ScheduledDeadline,
};
pub use sweep::{
    run_sweep_once, sweep_loop, RetryStrategy, SweepConfig, SweepFailure, SweepReport, SweepRunner,
};
