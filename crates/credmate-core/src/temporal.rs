//! # Temporal Types
//!
//! UTC-only timestamps plus the calendar-month arithmetic that cycle
//! windows and proration depend on.
//!
//! ## Design Decision
//!
//! Licensing boards state deadlines as calendar dates, so compliance
//! evaluation works on [`NaiveDate`]. Record-keeping instants (when an
//! activity was recorded, when a snapshot was computed) are [`Timestamp`]s in
//! UTC, truncated to whole seconds so that they canonicalize deterministically.
//!
//! Wall-clock access goes through the [`Clock`] trait. The engine never calls
//! `Utc::now()` directly, which lets tests pin "today" with [`FixedClock`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A UTC timestamp with second-level precision.
///
/// Serializes to RFC 3339 with a `Z` suffix (e.g. `2026-01-15T12:00:00Z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current UTC time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating
    /// sub-second precision.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.with_nanosecond(0).unwrap_or(dt))
    }

    /// Midnight UTC at the start of the given date.
    pub fn start_of(date: NaiveDate) -> Self {
        Self(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)))
    }

    /// Access the underlying `chrono::DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// The UTC calendar date of this instant.
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Return the timestamp as an ISO 8601 string with Z suffix.
    pub fn to_canonical_string(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// The current UTC instant.
    fn now(&self) -> Timestamp;

    /// The current UTC calendar date.
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A manually-driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    epoch_seconds: AtomicI64,
}

impl FixedClock {
    /// A clock frozen at midnight UTC on `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        Self::at(Timestamp::start_of(date))
    }

    /// A clock frozen at `instant`.
    pub fn at(instant: Timestamp) -> Self {
        Self {
            epoch_seconds: AtomicI64::new(instant.as_datetime().timestamp()),
        }
    }

    /// Move the clock to midnight UTC on `date`.
    pub fn set_date(&self, date: NaiveDate) {
        let secs = Timestamp::start_of(date).as_datetime().timestamp();
        self.epoch_seconds.store(secs, Ordering::SeqCst);
    }

    /// Advance the clock by whole days.
    pub fn advance_days(&self, days: i64) {
        self.epoch_seconds.fetch_add(days * 86_400, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        let secs = self.epoch_seconds.load(Ordering::SeqCst);
        match Utc.timestamp_opt(secs, 0).single() {
            Some(dt) => Timestamp(dt),
            None => Timestamp(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar-month arithmetic
// ---------------------------------------------------------------------------

/// Add whole calendar months to a date.
///
/// Day-of-month clamps to the end of shorter months: January 31 plus one
/// month is February 28 (or 29).
///
/// # Errors
///
/// Returns [`ValidationError::DateOutOfRange`] if the result is not
/// representable.
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate, ValidationError> {
    date.checked_add_months(Months::new(months))
        .ok_or(ValidationError::DateOutOfRange { date, months })
}

/// The smallest number of whole months `m` such that `from + m months`
/// falls on or after `to`. A partial month counts as a full month.
///
/// Returns 0 when `to` is on or before `from`.
pub fn months_until(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }
    let raw = (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32);
    let mut months = raw.max(0) as u32;
    match from.checked_add_months(Months::new(months)) {
        Some(reached) if reached >= to => {}
        _ => months += 1,
    }
    months
}
