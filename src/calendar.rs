//! Local-time policy.
//!
//! The whole system runs on one fixed UTC offset. There is no DST handling:
//! a local day is always exactly 24 hours and "today" is the local date of
//! the clock's current instant under that offset.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};

use crate::model::{MINUTE_MS, Ms, Span};

const DAY_MS: Ms = 24 * 60 * MINUTE_MS;

pub trait Clock: Send + Sync {
    fn now(&self) -> Ms;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Ms {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: Ms) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: Ms) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Ms) {
        self.0.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Ms {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCalendar {
    offset: FixedOffset,
    granularity_minutes: u32,
}

impl LocalCalendar {
    /// Returns `None` when the offset is out of range or the granularity does
    /// not evenly divide a day.
    pub fn new(utc_offset_minutes: i32, granularity_minutes: u32) -> Option<Self> {
        if granularity_minutes == 0 || (24 * 60) % granularity_minutes != 0 {
            return None;
        }
        let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
        Some(Self {
            offset,
            granularity_minutes,
        })
    }

    pub fn utc(granularity_minutes: u32) -> Option<Self> {
        Self::new(0, granularity_minutes)
    }

    pub fn granularity_minutes(&self) -> u32 {
        self.granularity_minutes
    }

    pub fn granularity_ms(&self) -> Ms {
        Ms::from(self.granularity_minutes) * MINUTE_MS
    }

    fn local(&self, t: Ms) -> DateTime<FixedOffset> {
        // Out-of-range instants clamp to the epoch; callers validate ranges first.
        let utc = DateTime::<Utc>::from_timestamp_millis(t).unwrap_or_default();
        utc.with_timezone(&self.offset)
    }

    /// Instant of `time` on `date`, local.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> Ms {
        let naive = date.and_time(time);
        naive.and_utc().timestamp_millis() - Ms::from(self.offset.local_minus_utc()) * 1000
    }

    /// `[local midnight, next local midnight)` of `date`.
    pub fn day_window(&self, date: NaiveDate) -> Span {
        let start = self.at(date, NaiveTime::MIN);
        Span::new(start, start + DAY_MS)
    }

    pub fn local_date(&self, t: Ms) -> NaiveDate {
        self.local(t).date_naive()
    }

    pub fn local_time(&self, t: Ms) -> NaiveTime {
        self.local(t).time()
    }

    /// 0 = Sunday .. 6 = Saturday.
    pub fn weekday(date: NaiveDate) -> u8 {
        date.weekday().num_days_from_sunday() as u8
    }

    /// Whether `t` falls on a granularity boundary of its local day.
    pub fn is_aligned(&self, t: Ms) -> bool {
        let time = self.local_time(t);
        let minute_of_day = time.hour() * 60 + time.minute();
        time.second() == 0
            && time.nanosecond() == 0
            && minute_of_day % self.granularity_minutes == 0
    }

    /// Smallest boundary `>= t`, counting boundaries from `origin`.
    pub fn align_up(&self, t: Ms, origin: Ms) -> Ms {
        let g = self.granularity_ms();
        let offset = (t - origin).rem_euclid(g);
        if offset == 0 { t } else { t + (g - offset) }
    }

    /// Local `HH:MM`.
    pub fn format_time_of_day(&self, t: Ms) -> String {
        self.local(t).format("%H:%M").to_string()
    }

    /// Local midnight of the Monday starting the week of `date`.
    pub fn week_start(&self, date: NaiveDate) -> Ms {
        let back = i64::from(date.weekday().num_days_from_monday());
        self.at(date - Duration::days(back), NaiveTime::MIN)
    }

    /// Local midnight of the first day of the month of `date`.
    pub fn month_start(&self, date: NaiveDate) -> Ms {
        let first = date.with_day(1).unwrap_or(date);
        self.at(first, NaiveTime::MIN)
    }
}
