//! Per-kind scheduling behavior: how each event kind enumerates its live
//! entries, recomputes targets, and fires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronobot_shared::{EntryKey, EventKind, Scope};
use chronobot_store::Store;
use tracing::warn;

use crate::sink::NotificationSink;

/// The behavior the registry/sweep machinery needs from one event kind.
#[async_trait]
pub trait KindDriver: Send + Sync {
    fn kind(&self) -> EventKind;

    /// All live, schedulable entries of this kind with their current
    /// targets. Entries with no computable target (an alarm whose owner has
    /// no timezone) are omitted: they stay unarmed until a later sweep.
    fn live_entries(&self, store: &Store, now: DateTime<Utc>) -> Vec<(EntryKey, DateTime<Utc>)>;

    /// Recompute the target for one entry. `None` means the entry is gone
    /// or currently unschedulable; the armed event covering it is dropped.
    fn current_target(
        &self,
        store: &Store,
        key: &EntryKey,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>>;

    /// Deliver the notification and advance or remove the entry.
    ///
    /// Returns `false` if the entry was already gone (resolved as a
    /// cancelled fire, not an error). Delivery failure is logged and does
    /// not prevent the advance.
    async fn fire(
        &self,
        store: &Store,
        sink: &dyn NotificationSink,
        key: &EntryKey,
        now: DateTime<Utc>,
    ) -> bool;
}

pub fn driver_for(kind: EventKind) -> &'static dyn KindDriver {
    match kind {
        EventKind::Timer => &TimerDriver,
        EventKind::Alarm => &AlarmDriver,
        EventKind::Birthday => &BirthdayDriver,
    }
}

async fn deliver_best_effort(
    sink: &dyn NotificationSink,
    key: &EntryKey,
    channel: chronobot_shared::ChannelId,
    text: &str,
) {
    if let Err(e) = sink.deliver(channel, text).await {
        warn!(%key, %channel, error = %e, "notification delivery failed");
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

pub struct TimerDriver;

#[async_trait]
impl KindDriver for TimerDriver {
    fn kind(&self) -> EventKind {
        EventKind::Timer
    }

    fn live_entries(&self, store: &Store, _now: DateTime<Utc>) -> Vec<(EntryKey, DateTime<Utc>)> {
        let mut entries = Vec::new();
        store.for_each_user(|scope, user| {
            for timer in user.timers() {
                let key = EntryKey {
                    scope,
                    user: user.id(),
                    entry: timer.id(),
                };
                entries.push((key, timer.target()));
            }
        });
        entries
    }

    fn current_target(
        &self,
        store: &Store,
        key: &EntryKey,
        _now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        // A timer's target never changes; the only question is existence.
        let timer = store.user(key.scope, key.user)?.timer(key.entry)?;
        Some(timer.target())
    }

    async fn fire(
        &self,
        store: &Store,
        sink: &dyn NotificationSink,
        key: &EntryKey,
        _now: DateTime<Utc>,
    ) -> bool {
        let Some(user) = store.user(key.scope, key.user) else {
            return false;
        };
        let Some(timer) = user.timer(key.entry) else {
            return false;
        };

        deliver_best_effort(sink, key, timer.channel(), timer.message()).await;
        user.remove_timer(key.entry);
        true
    }
}

// ---------------------------------------------------------------------------
// Alarms
// ---------------------------------------------------------------------------

pub struct AlarmDriver;

#[async_trait]
impl KindDriver for AlarmDriver {
    fn kind(&self) -> EventKind {
        EventKind::Alarm
    }

    fn live_entries(&self, store: &Store, now: DateTime<Utc>) -> Vec<(EntryKey, DateTime<Utc>)> {
        let mut entries = Vec::new();
        store.for_each_user(|scope, user| {
            let timezone = user.timezone();
            for alarm in user.alarms() {
                if let Some(target) = alarm.target_time(timezone, now) {
                    let key = EntryKey {
                        scope,
                        user: user.id(),
                        entry: alarm.id(),
                    };
                    entries.push((key, target));
                }
            }
        });
        entries
    }

    fn current_target(
        &self,
        store: &Store,
        key: &EntryKey,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let user = store.user(key.scope, key.user)?;
        let alarm = user.alarm(key.entry)?;
        alarm.target_time(user.timezone(), now)
    }

    async fn fire(
        &self,
        store: &Store,
        sink: &dyn NotificationSink,
        key: &EntryKey,
        _now: DateTime<Utc>,
    ) -> bool {
        let Some(user) = store.user(key.scope, key.user) else {
            return false;
        };
        let Some(alarm) = user.alarm(key.entry) else {
            return false;
        };

        deliver_best_effort(sink, key, alarm.channel(), &alarm.message()).await;

        if alarm.repeat_days().is_empty() {
            user.remove_alarm(key.entry);
        } else {
            // Repeats: drop the spent target so the follow-up revalidation
            // arms the next matching day.
            alarm.clear_target();
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Birthdays
// ---------------------------------------------------------------------------

pub struct BirthdayDriver;

#[async_trait]
impl KindDriver for BirthdayDriver {
    fn kind(&self) -> EventKind {
        EventKind::Birthday
    }

    fn live_entries(&self, store: &Store, _now: DateTime<Utc>) -> Vec<(EntryKey, DateTime<Utc>)> {
        // Birthdays announce into server channels; DM scopes hold none.
        let mut entries = Vec::new();
        store.for_each_user(|scope, user| {
            if !matches!(scope, Scope::Server(_)) {
                return;
            }
            if let Some(birthday) = user.birthday() {
                if let Some(target) = birthday.next_occurrence() {
                    let key = EntryKey {
                        scope,
                        user: user.id(),
                        entry: birthday.id(),
                    };
                    entries.push((key, target));
                }
            }
        });
        entries
    }

    fn current_target(
        &self,
        store: &Store,
        key: &EntryKey,
        _now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let birthday = store.user(key.scope, key.user)?.birthday()?;
        // A replaced record keeps the slot but not the identity.
        if birthday.id() != key.entry {
            return None;
        }
        birthday.next_occurrence()
    }

    async fn fire(
        &self,
        store: &Store,
        sink: &dyn NotificationSink,
        key: &EntryKey,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(user) = store.user(key.scope, key.user) else {
            return false;
        };
        let Some(birthday) = user.birthday() else {
            return false;
        };
        if birthday.id() != key.entry {
            return false;
        }

        let mention = key.user.mention();
        let text = match birthday.age(now) {
            Some(age) => format!(
                "Today is {mention}'s birthday! They're now {age} years old! Happy birthday!"
            ),
            None => format!("Today is {mention}'s birthday! Happy birthday!"),
        };
        deliver_best_effort(sink, key, birthday.channel(), &text).await;

        birthday.notified();
        true
    }
}
