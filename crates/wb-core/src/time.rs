//! Query windows and local-day boundaries.

use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window ending at `end` and reaching back `lookback_ms`.
    pub fn trailing(end: DateTime<Utc>, lookback_ms: i64) -> Self {
        Self {
            start: end - Duration::milliseconds(lookback_ms),
            end,
        }
    }

    /// Length of the window in milliseconds, never negative.
    pub fn span_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds().max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// The `[midnight, next midnight)` window of `day` in `tz`.
///
/// Returns `None` when local midnight does not exist (a DST gap at 00:00).
pub fn day_window<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Option<TimeWindow> {
    let start = local_midnight(day, tz)?;
    let end = local_midnight(day.succ_opt()?, tz)?;
    Some(TimeWindow::new(start, end))
}

fn local_midnight<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Option<DateTime<Utc>> {
    let naive = day.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Inclusive list of days from `first` to `last`; empty when `first > last`.
pub fn days_inclusive(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    first.iter_days().take_while(|day| *day <= last).collect()
}

/// Source of wall-clock time and the local calendar.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The local calendar day containing `now()`.
    fn today(&self) -> NaiveDate;

    /// The local-day window for `day`.
    fn day_window(&self, day: NaiveDate) -> Option<TimeWindow>;

    /// `[start of today, now)`.
    fn today_so_far(&self) -> Option<TimeWindow> {
        let window = self.day_window(self.today())?;
        Some(TimeWindow::new(window.start, self.now()))
    }
}

/// The system clock in the machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn day_window(&self, day: NaiveDate) -> Option<TimeWindow> {
        day_window(day, &Local)
    }
}

/// A clock that only moves when told to, at a fixed UTC offset.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    pub const fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    /// A UTC clock stopped at `now`.
    pub fn utc(now: DateTime<Utc>) -> Self {
        Self::new(now, Utc.fix())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
    }

    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.offset).date_naive()
    }

    fn day_window(&self, day: NaiveDate) -> Option<TimeWindow> {
        day_window(day, &self.offset)
    }
}
