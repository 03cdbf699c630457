//! Repeating wall-clock alarms.

use std::sync::Mutex;

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use chronobot_shared::{ChannelId, EntryId, WeekdaySet};

use crate::lock;
use crate::snapshot::AlarmSnapshot;

#[derive(Debug)]
struct AlarmState {
    local_time: NaiveTime,
    repeat: WeekdaySet,
    channel: ChannelId,
    message: String,
    /// Cached next-fire instant. `None` means unarmed: either never
    /// computed, invalidated by an edit or a fire, or the owner has no
    /// timezone configured.
    target: Option<DateTime<Utc>>,
}

/// An alarm entry: a wall-clock time of day, optionally repeating on a set
/// of weekdays, interpreted in the owner's timezone.
#[derive(Debug)]
pub struct AlarmEntry {
    id: EntryId,
    state: Mutex<AlarmState>,
}

impl AlarmEntry {
    pub fn new(local_time: NaiveTime, channel: ChannelId, message: impl Into<String>) -> Self {
        Self {
            id: EntryId::new(),
            state: Mutex::new(AlarmState {
                local_time,
                repeat: WeekdaySet::empty(),
                channel,
                message: message.into(),
                target: None,
            }),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn local_time(&self) -> NaiveTime {
        lock(&self.state).local_time
    }

    /// Change the time of day. Invalidates the cached target.
    pub fn set_local_time(&self, local_time: NaiveTime) {
        let mut state = lock(&self.state);
        state.local_time = local_time;
        state.target = None;
    }

    pub fn repeat_days(&self) -> WeekdaySet {
        lock(&self.state).repeat
    }

    /// Returns `true` if the day was newly added. Invalidates the cached
    /// target on change, since the next matching day may differ.
    pub fn add_repeat_day(&self, day: Weekday) -> bool {
        let mut state = lock(&self.state);
        let added = state.repeat.insert(day);
        if added {
            state.target = None;
        }
        added
    }

    /// Returns `true` if the day was present. Invalidates the cached target
    /// on change.
    pub fn remove_repeat_day(&self, day: Weekday) -> bool {
        let mut state = lock(&self.state);
        let removed = state.repeat.remove(day);
        if removed {
            state.target = None;
        }
        removed
    }

    pub fn message(&self) -> String {
        lock(&self.state).message.clone()
    }

    pub fn set_message(&self, message: impl Into<String>) {
        lock(&self.state).message = message.into();
    }

    pub fn channel(&self) -> ChannelId {
        lock(&self.state).channel
    }

    pub fn set_channel(&self, channel: ChannelId) {
        lock(&self.state).channel = channel;
    }

    /// Drop the cached target so the next [`target_time`](Self::target_time)
    /// recomputes. Called after the alarm fires.
    pub fn clear_target(&self) {
        lock(&self.state).target = None;
    }

    /// The next instant this alarm should fire, or `None` when the owner has
    /// no timezone configured.
    ///
    /// The result is cached: repeated calls return the same instant until an
    /// edit or a fire invalidates it, so recomputation is idempotent while
    /// an event stays armed.
    pub fn target_time(&self, timezone: Option<Tz>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut state = lock(&self.state);

        let Some(tz) = timezone else {
            state.target = None;
            return None;
        };

        if let Some(target) = state.target {
            return Some(target);
        }

        let target = next_local_occurrence(state.local_time, state.repeat, tz, now);
        state.target = target;
        target
    }

    pub(crate) fn snapshot(&self) -> AlarmSnapshot {
        let state = lock(&self.state);
        AlarmSnapshot {
            id: self.id,
            local_time: state.local_time,
            repeating_days: state.repeat,
            channel: state.channel,
            message: state.message.clone(),
        }
    }

    pub(crate) fn from_snapshot(snap: &AlarmSnapshot) -> Self {
        Self {
            id: snap.id,
            state: Mutex::new(AlarmState {
                local_time: snap.local_time,
                repeat: snap.repeating_days,
                channel: snap.channel,
                message: snap.message.clone(),
                target: None,
            }),
        }
    }
}

/// Compose `local_time` with "today" in `tz`; if the instant is not strictly
/// after `now`, advance one day; keep advancing until the weekday matches
/// the repeat set (when non-empty). Each step recombines the wall-clock time
/// in the zone, so the local time is preserved across DST transitions; a
/// date whose local time does not exist (spring-forward gap) is skipped.
fn next_local_occurrence(
    local_time: NaiveTime,
    repeat: WeekdaySet,
    tz: Tz,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&tz).date_naive();

    // One day for "already passed today", up to seven for the weekday scan,
    // plus slack for gap-skipped dates.
    for offset in 0..=15u64 {
        let date = today.checked_add_days(Days::new(offset))?;
        let Some(candidate) = resolve_local(tz, date, local_time) else {
            continue;
        };
        if candidate <= now {
            continue;
        }
        if !repeat.is_empty() && !repeat.contains(candidate.weekday()) {
            continue;
        }
        return Some(candidate.with_timezone(&Utc));
    }
    None
}

fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Some(dt),
        // Fall-back overlap: take the earlier instant.
        LocalResult::Ambiguous(earlier, _) => Some(earlier),
        LocalResult::None => None,
    }
}
