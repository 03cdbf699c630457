//! Per-user state: preferences and owned scheduling entries.

use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use chronobot_shared::{EntryId, UserId};

use crate::alarm::AlarmEntry;
use crate::birthday::BirthdayEntry;
use crate::error::{Result, StoreError};
use crate::lock;
use crate::snapshot::UserSnapshot;
use crate::timer::TimerEntry;

/// Display/formatting preferences. Absent fields mean "unset", deferring to
/// command-layer defaults.
#[derive(Debug, Clone, Default)]
pub struct UserPrefs {
    pub timezone: Option<Tz>,
    pub locale: Option<String>,
    pub format_pattern: Option<String>,
    pub timezone_visible: Option<bool>,
}

/// One user within a server or DM scope: the unit that owns entries.
///
/// Preferences, the birthday slot, and each entry list sit behind their own
/// locks, held only for the duration of a single operation.
#[derive(Debug)]
pub struct UserNode {
    id: UserId,
    prefs: Mutex<UserPrefs>,
    birthday: Mutex<Option<Arc<BirthdayEntry>>>,
    timers: Mutex<Vec<Arc<TimerEntry>>>,
    alarms: Mutex<Vec<Arc<AlarmEntry>>>,
}

impl UserNode {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            prefs: Mutex::new(UserPrefs::default()),
            birthday: Mutex::new(None),
            timers: Mutex::new(Vec::new()),
            alarms: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    // ------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------

    pub fn prefs(&self) -> UserPrefs {
        lock(&self.prefs).clone()
    }

    pub fn timezone(&self) -> Option<Tz> {
        lock(&self.prefs).timezone
    }

    pub fn set_timezone(&self, timezone: Option<Tz>) {
        lock(&self.prefs).timezone = timezone;
    }

    pub fn locale(&self) -> Option<String> {
        lock(&self.prefs).locale.clone()
    }

    pub fn set_locale(&self, locale: Option<String>) {
        lock(&self.prefs).locale = locale;
    }

    pub fn format_pattern(&self) -> Option<String> {
        lock(&self.prefs).format_pattern.clone()
    }

    pub fn set_format_pattern(&self, pattern: Option<String>) {
        lock(&self.prefs).format_pattern = pattern;
    }

    pub fn timezone_visible(&self) -> Option<bool> {
        lock(&self.prefs).timezone_visible
    }

    pub fn set_timezone_visible(&self, visible: Option<bool>) {
        lock(&self.prefs).timezone_visible = visible;
    }

    // ------------------------------------------------------------------
    // Birthday (zero-or-one)
    // ------------------------------------------------------------------

    pub fn birthday(&self) -> Option<Arc<BirthdayEntry>> {
        lock(&self.birthday).clone()
    }

    /// Set or replace the birthday record.
    pub fn set_birthday(&self, birthday: Arc<BirthdayEntry>) {
        *lock(&self.birthday) = Some(birthday);
    }

    /// Returns `true` if a record was present.
    pub fn clear_birthday(&self) -> bool {
        lock(&self.birthday).take().is_some()
    }

    // ------------------------------------------------------------------
    // Timers (ordered, addressed by stable id; index is presentation only)
    // ------------------------------------------------------------------

    pub fn timers(&self) -> Vec<Arc<TimerEntry>> {
        lock(&self.timers).clone()
    }

    pub fn timer(&self, id: EntryId) -> Option<Arc<TimerEntry>> {
        lock(&self.timers).iter().find(|t| t.id() == id).cloned()
    }

    pub fn timer_at(&self, index: usize) -> Option<Arc<TimerEntry>> {
        lock(&self.timers).get(index).cloned()
    }

    pub fn add_timer(&self, timer: Arc<TimerEntry>) {
        lock(&self.timers).push(timer);
    }

    /// Returns `true` if the timer was present.
    pub fn remove_timer(&self, id: EntryId) -> bool {
        let mut timers = lock(&self.timers);
        let before = timers.len();
        timers.retain(|t| t.id() != id);
        timers.len() != before
    }

    pub fn has_timer(&self, id: EntryId) -> bool {
        lock(&self.timers).iter().any(|t| t.id() == id)
    }

    // ------------------------------------------------------------------
    // Alarms
    // ------------------------------------------------------------------

    pub fn alarms(&self) -> Vec<Arc<AlarmEntry>> {
        lock(&self.alarms).clone()
    }

    pub fn alarm(&self, id: EntryId) -> Option<Arc<AlarmEntry>> {
        lock(&self.alarms).iter().find(|a| a.id() == id).cloned()
    }

    pub fn alarm_at(&self, index: usize) -> Option<Arc<AlarmEntry>> {
        lock(&self.alarms).get(index).cloned()
    }

    pub fn add_alarm(&self, alarm: Arc<AlarmEntry>) {
        lock(&self.alarms).push(alarm);
    }

    /// Returns `true` if the alarm was present.
    pub fn remove_alarm(&self, id: EntryId) -> bool {
        let mut alarms = lock(&self.alarms);
        let before = alarms.len();
        alarms.retain(|a| a.id() != id);
        alarms.len() != before
    }

    pub fn has_alarm(&self, id: EntryId) -> bool {
        lock(&self.alarms).iter().any(|a| a.id() == id)
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    pub(crate) fn snapshot(&self) -> UserSnapshot {
        let prefs = self.prefs();
        UserSnapshot {
            user_id: self.id,
            timezone: prefs.timezone.map(|tz| tz.name().to_string()),
            locale: prefs.locale,
            format_pattern: prefs.format_pattern,
            timezone_visible: prefs.timezone_visible,
            birthday: self.birthday().map(|b| b.snapshot()),
            timers: self.timers().iter().map(|t| t.snapshot()).collect(),
            alarms: self.alarms().iter().map(|a| a.snapshot()).collect(),
        }
    }

    pub(crate) fn from_snapshot(snap: &UserSnapshot) -> Result<Self> {
        let timezone = snap
            .timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| StoreError::InvalidTimezone(name.to_string()))
            })
            .transpose()?;

        let node = Self::new(snap.user_id);
        {
            let mut prefs = lock(&node.prefs);
            prefs.timezone = timezone;
            prefs.locale = snap.locale.clone();
            prefs.format_pattern = snap.format_pattern.clone();
            prefs.timezone_visible = snap.timezone_visible;
        }
        if let Some(birthday) = &snap.birthday {
            node.set_birthday(Arc::new(BirthdayEntry::from_snapshot(birthday)?));
        }
        for timer in &snap.timers {
            node.add_timer(Arc::new(TimerEntry::from_snapshot(timer)));
        }
        for alarm in &snap.alarms {
            node.add_alarm(Arc::new(AlarmEntry::from_snapshot(alarm)));
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};
    use chronobot_shared::ChannelId;
    use std::time::Duration;

    #[test]
    fn test_entries_addressed_by_id_not_index() {
        let user = UserNode::new(UserId::new());
        let first = Arc::new(
            TimerEntry::new(Duration::from_secs(60), ChannelId::new(), "a", Utc::now()).unwrap(),
        );
        let second = Arc::new(
            TimerEntry::new(Duration::from_secs(120), ChannelId::new(), "b", Utc::now()).unwrap(),
        );
        user.add_timer(first.clone());
        user.add_timer(second.clone());

        assert!(user.remove_timer(first.id()));
        // The survivor keeps its identity even though its index shifted.
        assert_eq!(user.timer_at(0).unwrap().id(), second.id());
        assert!(user.timer(second.id()).is_some());
        assert!(!user.remove_timer(first.id()));
    }

    #[test]
    fn test_birthday_slot_replace_and_clear() {
        let user = UserNode::new(UserId::new());
        assert!(!user.clear_birthday());

        let tz: Tz = "UTC".parse().unwrap();
        let b1 = Arc::new(
            BirthdayEntry::new(None, 6, 15, 0, tz, ChannelId::new(), Utc::now()).unwrap(),
        );
        let b2 = Arc::new(
            BirthdayEntry::new(None, 7, 1, 0, tz, ChannelId::new(), Utc::now()).unwrap(),
        );

        user.set_birthday(b1.clone());
        user.set_birthday(b2.clone());
        assert_eq!(user.birthday().unwrap().id(), b2.id());
        assert!(user.clear_birthday());
        assert!(user.birthday().is_none());
    }

    #[test]
    fn test_alarm_lookup_by_id() {
        let user = UserNode::new(UserId::new());
        let alarm = Arc::new(AlarmEntry::new(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            ChannelId::new(),
            "wake",
        ));
        user.add_alarm(alarm.clone());

        assert!(user.has_alarm(alarm.id()));
        assert!(user.remove_alarm(alarm.id()));
        assert!(!user.has_alarm(alarm.id()));
    }
}
