//! Annual birthday notifications.

use std::sync::Mutex;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use chronobot_shared::{ChannelId, EntryId};

use crate::error::{Result, StoreError};
use crate::lock;
use crate::snapshot::BirthdaySnapshot;

#[derive(Debug)]
struct BirthdayState {
    year: Option<i32>,
    month: u32,
    day: u32,
    hour: u32,
    /// Rolling counter: the UTC year of the next occurrence. Advanced by
    /// [`BirthdayEntry::notified`] after each fire.
    next_year: i32,
    channel: ChannelId,
}

/// A birthday entry, stored as a UTC-normalized `(year?, month, day, hour)`.
///
/// Fires annually; never auto-removed.
#[derive(Debug)]
pub struct BirthdayEntry {
    id: EntryId,
    state: Mutex<BirthdayState>,
}

impl BirthdayEntry {
    /// Create a birthday record.
    ///
    /// `timezone` is the creator's timezone, used once to seed the rolling
    /// year counter: it starts at that zone's current year and is advanced
    /// if this year's occurrence is already at or before `now`.
    ///
    /// February 29 is rejected outright, as are dates and hours that do not
    /// exist.
    pub fn new(
        year: Option<i32>,
        month: u32,
        day: u32,
        hour: u32,
        timezone: Tz,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        validate_date(month, day, hour)?;

        let mut next_year = now.with_timezone(&timezone).year();
        if let Some(occurrence) = utc_occurrence(next_year, month, day, hour) {
            if occurrence <= now {
                next_year += 1;
            }
        }

        Ok(Self {
            id: EntryId::new(),
            state: Mutex::new(BirthdayState {
                year,
                month,
                day,
                hour,
                next_year,
                channel,
            }),
        })
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    /// The next instant this birthday fires: `UTC(next_year, month, day, hour)`.
    pub fn next_occurrence(&self) -> Option<DateTime<Utc>> {
        let state = lock(&self.state);
        utc_occurrence(state.next_year, state.month, state.day, state.hour)
    }

    /// Advance the rolling year counter after a fire.
    pub fn notified(&self) {
        lock(&self.state).next_year += 1;
    }

    /// Age in years, when a birth year was recorded.
    ///
    /// Compares UTC calendar years only, with no month/day adjustment: the
    /// age ticks over at the UTC-year boundary of the record, which may be a
    /// day off relative to the local observation instant.
    pub fn age(&self, now: DateTime<Utc>) -> Option<i32> {
        let state = lock(&self.state);
        state.year.map(|year| now.year() - year)
    }

    pub fn channel(&self) -> ChannelId {
        lock(&self.state).channel
    }

    pub fn set_channel(&self, channel: ChannelId) {
        lock(&self.state).channel = channel;
    }

    pub(crate) fn snapshot(&self) -> BirthdaySnapshot {
        let state = lock(&self.state);
        BirthdaySnapshot {
            id: self.id,
            year: state.year,
            month: state.month,
            day: state.day,
            hour: state.hour,
            next_year: state.next_year,
            channel: state.channel,
        }
    }

    pub(crate) fn from_snapshot(snap: &BirthdaySnapshot) -> Result<Self> {
        validate_date(snap.month, snap.day, snap.hour)?;
        Ok(Self {
            id: snap.id,
            state: Mutex::new(BirthdayState {
                year: snap.year,
                month: snap.month,
                day: snap.day,
                hour: snap.hour,
                next_year: snap.next_year,
                channel: snap.channel,
            }),
        })
    }
}

fn validate_date(month: u32, day: u32, hour: u32) -> Result<()> {
    if month == 2 && day == 29 {
        return Err(StoreError::InvalidDate("February 29 is not allowed".into()));
    }
    // 2001 is a non-leap year, so this checks month/day against the lengths
    // valid in every year a notification can land on.
    if NaiveDate::from_ymd_opt(2001, month, day).is_none() {
        return Err(StoreError::InvalidDate(format!("month {month}, day {day}")));
    }
    if hour > 23 {
        return Err(StoreError::InvalidDate(format!("hour {hour}")));
    }
    Ok(())
}

fn utc_occurrence(year: i32, month: u32, day: u32, hour: u32) -> Option<DateTime<Utc>> {
    Some(
        NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(hour, 0, 0)?
            .and_utc(),
    )
}
