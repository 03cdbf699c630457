//! The engine facade: store + registries + fire timeline + sweep.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chronobot_shared::{EntryKey, EventKind};
use chronobot_store::{DurableStore, Store};
use tracing::{debug, error, info};

use crate::dispatch::{Dispatcher, FireJob};
use crate::error::EngineError;
use crate::kinds::driver_for;
use crate::registry::{ArmedEvent, Registry};
use crate::sink::NotificationSink;

/// The notification engine.
///
/// Owns the record store, one registry of armed fire-events per kind, and
/// the fire timeline. Callers mutate entries through the store directly and
/// signal [`Engine::notify_entry_change`] afterwards; the sweep re-derives
/// the armed set from store state, so a missed or duplicated signal degrades
/// to a late or redundant sweep, never to a wrong one.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<Store>,
    sink: Arc<dyn NotificationSink>,
    durable: Arc<dyn DurableStore>,
    dispatcher: Dispatcher,
    timers: Registry,
    alarms: Registry,
    birthdays: Registry,
}

impl Engine {
    /// Load the persisted snapshot (if any), spawn the fire timeline, and
    /// run an initial sweep of every kind. Must be called within a tokio
    /// runtime.
    pub fn start(
        durable: Arc<dyn DurableStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, EngineError> {
        let store = match durable.load()? {
            Some(snapshot) => Store::from_snapshot(&snapshot)?,
            None => Store::new(),
        };

        let inner = Arc::new(EngineInner {
            store: Arc::new(store),
            sink,
            durable,
            dispatcher: Dispatcher::spawn(),
            timers: Registry::new(EventKind::Timer),
            alarms: Registry::new(EventKind::Alarm),
            birthdays: Registry::new(EventKind::Birthday),
        });
        for kind in EventKind::ALL {
            inner.sweep(kind);
        }
        info!("engine started");
        Ok(Self { inner })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.inner.store
    }

    /// Reconcile one kind's registry against the store after a mutation,
    /// then persist. Safe to call redundantly or concurrently.
    pub fn notify_entry_change(&self, kind: EventKind) {
        self.inner.sweep(kind);
        self.inner.save_async();
    }

    /// Reconcile one kind without persisting.
    pub fn sweep(&self, kind: EventKind) {
        self.inner.sweep(kind);
    }

    /// Number of currently armed fire-events of one kind.
    pub fn armed_count(&self, kind: EventKind) -> usize {
        self.inner.registry(kind).len()
    }

    /// Queue a snapshot save without blocking the caller.
    pub fn save_async(&self) {
        self.inner.save_async();
    }

    /// Cancel every armed event, stop the fire timeline, and write a final
    /// snapshot.
    pub async fn shutdown(&self) {
        for kind in EventKind::ALL {
            self.inner.registry(kind).cancel_all();
        }
        self.inner.dispatcher.shutdown().await;

        let inner = Arc::clone(&self.inner);
        if tokio::task::spawn_blocking(move || inner.save()).await.is_err() {
            error!("final snapshot save task panicked");
        }
        info!("engine stopped");
    }
}

impl EngineInner {
    fn registry(&self, kind: EventKind) -> &Registry {
        match kind {
            EventKind::Timer => &self.timers,
            EventKind::Alarm => &self.alarms,
            EventKind::Birthday => &self.birthdays,
        }
    }

    /// Reconcile one kind: arm every live entry with no armed event, then
    /// revalidate every armed event against its entry's current target.
    fn sweep(self: &Arc<Self>, kind: EventKind) {
        let now = Utc::now();
        let registry = self.registry(kind);

        let covered: HashSet<EntryKey> = registry.armed_keys().into_iter().collect();
        for (key, target) in driver_for(kind).live_entries(&self.store, now) {
            if !covered.contains(&key) {
                self.arm_event(kind, key, target);
            }
        }

        for key in registry.armed_keys() {
            self.update_event(kind, key, now);
        }
        debug!(%kind, armed = registry.len(), "sweep complete");
    }

    /// Arm one fire-event, unless the entry is already covered. Losing the
    /// insert race leaves the existing event in place and cancels ours.
    fn arm_event(self: &Arc<Self>, kind: EventKind, key: EntryKey, target: DateTime<Utc>) {
        let handle = self.dispatcher.arm(target, self.make_job(kind, key, target));
        let event = ArmedEvent {
            target,
            handle: handle.clone(),
        };
        if !self.registry(kind).insert_if_absent(key, event) {
            handle.cancel();
        }
    }

    /// Revalidate one armed event: drop it if its entry is gone or
    /// unschedulable, re-arm it if the entry's target moved.
    fn update_event(self: &Arc<Self>, kind: EventKind, key: EntryKey, now: DateTime<Utc>) {
        let registry = self.registry(kind);
        let Some(existing) = registry.get(&key) else {
            return;
        };
        match driver_for(kind).current_target(&self.store, &key, now) {
            None => {
                debug!(%kind, %key, "entry gone or unschedulable; disarming");
                registry.remove(&key);
            }
            Some(target) if target != existing.target => {
                debug!(%kind, %key, old = %existing.target, new = %target, "target moved; re-arming");
                let handle = self.dispatcher.arm(target, self.make_job(kind, key, target));
                registry.replace(key, ArmedEvent { target, handle });
            }
            Some(_) => {}
        }
    }

    fn make_job(self: &Arc<Self>, kind: EventKind, key: EntryKey, target: DateTime<Utc>) -> FireJob {
        let inner = Arc::clone(self);
        Box::pin(async move { inner.fire_due(kind, key, target).await })
    }

    /// Runs on the fire timeline when an armed event comes due.
    ///
    /// The registry record must still exist and still carry the target this
    /// job was armed for; otherwise a reschedule superseded us and the newer
    /// event owns the fire. The record is left in place for the duration of
    /// the fire, so a concurrent sweep sees the entry as covered and cannot
    /// re-arm the occurrence being delivered; it is swapped out only after
    /// the entry has advanced, re-checked under the registry lock.
    async fn fire_due(self: Arc<Self>, kind: EventKind, key: EntryKey, target: DateTime<Utc>) {
        let registry = self.registry(kind);
        match registry.get(&key) {
            None => {
                debug!(%kind, %key, "due event no longer registered; skipping");
                return;
            }
            Some(event) if event.target != target => {
                debug!(%kind, %key, "due event superseded by re-arm; skipping");
                return;
            }
            Some(event) if event.handle.is_pending() => {
                // Our own handle was claimed before this job ran, so a
                // pending record at the fired instant means a second armed
                // event covers the same occurrence.
                error!(%kind, %key, %target, "duplicate armed event detected at fire");
                debug_assert!(false, "duplicate armed event for {key}");
                return;
            }
            Some(_) => {}
        }

        let now = Utc::now();
        if !driver_for(kind).fire(&self.store, self.sink.as_ref(), &key, now).await {
            debug!(%kind, %key, "entry gone at fire; resolved as cancelled");
            registry.finish(&key, target, None);
            return;
        }

        // Repeating entries advance at fire; arm the follow-up occurrence.
        match driver_for(kind).current_target(&self.store, &key, now) {
            Some(next) => {
                let handle = self.dispatcher.arm(next, self.make_job(kind, key, next));
                let follow_up = ArmedEvent {
                    target: next,
                    handle: handle.clone(),
                };
                if !registry.finish(&key, target, Some(follow_up)) {
                    // A sweep already re-armed the entry; its event wins.
                    handle.cancel();
                }
            }
            None => {
                registry.finish(&key, target, None);
            }
        }
        self.save_async();
    }

    fn save_async(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let _ = tokio::task::spawn_blocking(move || inner.save());
    }

    /// Last-write-wins snapshot overwrite. A failed save is logged together
    /// with the serialized snapshot so the state is recoverable from logs.
    fn save(&self) {
        let snapshot = self.store.snapshot();
        if let Err(e) = self.durable.save(&snapshot) {
            error!(error = %e, "snapshot save failed");
            match serde_json::to_string(&snapshot) {
                Ok(json) => error!(snapshot = %json, "unsaved snapshot contents"),
                Err(e) => error!(error = %e, "unsaved snapshot could not be serialized"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;
    use crate::sink::SinkError;
    use chrono::{Datelike, NaiveTime};
    use chrono_tz::Tz;
    use chronobot_shared::{ChannelId, Scope, ServerId, UserId};
    use chronobot_store::{AlarmEntry, BirthdayEntry, Result as StoreResult, Snapshot, TimerEntry, UserNode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sink that holds every delivery open for a fixed interval.
    struct SlowSink {
        delay: Duration,
        sent: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl NotificationSink for SlowSink {
        async fn deliver(&self, _channel: ChannelId, _text: &str) -> Result<(), SinkError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
    }

    /// Durable-store double that persists nothing.
    struct NullStore;

    impl DurableStore for NullStore {
        fn load(&self) -> StoreResult<Option<Snapshot>> {
            Ok(None)
        }

        fn save(&self, _snapshot: &Snapshot) -> StoreResult<()> {
            Ok(())
        }
    }

    fn start_engine() -> (Engine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::start(Arc::new(NullStore), sink.clone()).unwrap();
        (engine, sink)
    }

    fn server_user(engine: &Engine) -> (Scope, Arc<UserNode>) {
        let server_id = ServerId::new();
        let user = engine
            .store()
            .obtain_server(server_id)
            .obtain_user(UserId::new());
        (Scope::Server(server_id), user)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timer_fires_once_and_entry_is_removed() {
        let (engine, sink) = start_engine();
        let (_, user) = server_user(&engine);

        user.add_timer(Arc::new(
            TimerEntry::new(Duration::from_millis(200), ChannelId::new(), "tea", Utc::now())
                .unwrap(),
        ));
        engine.notify_entry_change(EventKind::Timer);
        assert_eq!(engine.armed_count(EventKind::Timer), 1);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(sink.sent_count(), 1);
        assert!(user.timers().is_empty());
        assert_eq!(engine.armed_count(EventKind::Timer), 0);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_redundant_sweeps_arm_exactly_once() {
        let (engine, sink) = start_engine();
        let (_, user) = server_user(&engine);

        user.add_timer(Arc::new(
            TimerEntry::new(Duration::from_millis(300), ChannelId::new(), "once", Utc::now())
                .unwrap(),
        ));
        engine.notify_entry_change(EventKind::Timer);
        engine.notify_entry_change(EventKind::Timer);
        engine.notify_entry_change(EventKind::Timer);
        assert_eq!(engine.armed_count(EventKind::Timer), 1);

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(sink.sent_count(), 1);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_removed_timer_is_disarmed_and_never_fires() {
        let (engine, sink) = start_engine();
        let (_, user) = server_user(&engine);

        let timer = Arc::new(
            TimerEntry::new(Duration::from_millis(300), ChannelId::new(), "gone", Utc::now())
                .unwrap(),
        );
        user.add_timer(timer.clone());
        engine.notify_entry_change(EventKind::Timer);
        assert_eq!(engine.armed_count(EventKind::Timer), 1);

        user.remove_timer(timer.id());
        engine.notify_entry_change(EventKind::Timer);
        assert_eq!(engine.armed_count(EventKind::Timer), 0);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(sink.sent_count(), 0);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_alarm_edit_moves_armed_target() {
        let (engine, _) = start_engine();
        let (scope, user) = server_user(&engine);
        user.set_timezone(Some("UTC".parse::<Tz>().unwrap()));

        let alarm = Arc::new(AlarmEntry::new(
            (Utc::now() + chrono::Duration::hours(1)).time(),
            ChannelId::new(),
            "standup",
        ));
        user.add_alarm(alarm.clone());
        engine.notify_entry_change(EventKind::Alarm);

        let key = EntryKey {
            scope,
            user: user.id(),
            entry: alarm.id(),
        };
        let before = engine.inner.alarms.get(&key).unwrap();

        alarm.set_local_time((Utc::now() + chrono::Duration::hours(2)).time());
        engine.notify_entry_change(EventKind::Alarm);

        let after = engine.inner.alarms.get(&key).unwrap();
        assert_ne!(after.target, before.target);
        assert!(!before.handle.is_pending(), "stale event must be cancelled");
        assert!(after.handle.is_pending());
        assert_eq!(engine.armed_count(EventKind::Alarm), 1);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timezone_removal_disarms_alarm() {
        let (engine, _) = start_engine();
        let (_, user) = server_user(&engine);
        user.set_timezone(Some("Europe/Berlin".parse::<Tz>().unwrap()));

        user.add_alarm(Arc::new(AlarmEntry::new(
            NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            ChannelId::new(),
            "wake",
        )));
        engine.notify_entry_change(EventKind::Alarm);
        assert_eq!(engine.armed_count(EventKind::Alarm), 1);

        user.set_timezone(None);
        engine.notify_entry_change(EventKind::Alarm);
        assert_eq!(engine.armed_count(EventKind::Alarm), 0);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_non_repeating_alarm_fires_and_is_removed() {
        let (engine, sink) = start_engine();
        let (_, user) = server_user(&engine);
        user.set_timezone(Some("UTC".parse::<Tz>().unwrap()));

        user.add_alarm(Arc::new(AlarmEntry::new(
            (Utc::now() + chrono::Duration::seconds(1)).time(),
            ChannelId::new(),
            "soon",
        )));
        engine.notify_entry_change(EventKind::Alarm);
        assert_eq!(engine.armed_count(EventKind::Alarm), 1);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(sink.sent_count(), 1);
        assert!(user.alarms().is_empty());
        assert_eq!(engine.armed_count(EventKind::Alarm), 0);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sweep_during_slow_delivery_fires_once() {
        let sink = Arc::new(SlowSink {
            delay: Duration::from_millis(1500),
            sent: AtomicUsize::new(0),
        });
        let engine = Engine::start(Arc::new(NullStore), sink.clone()).unwrap();
        let (_, user) = server_user(&engine);
        user.set_timezone(Some("UTC".parse::<Tz>().unwrap()));

        let due = Utc::now() + chrono::Duration::seconds(2);
        let alarm = Arc::new(AlarmEntry::new(due.time(), ChannelId::new(), "weekly"));
        alarm.add_repeat_day(due.weekday());
        user.add_alarm(alarm);
        engine.notify_entry_change(EventKind::Alarm);
        assert_eq!(engine.armed_count(EventKind::Alarm), 1);

        // Reconcile while the delivery is still in flight: the armed record
        // must keep covering the entry, so the occurrence being delivered is
        // not re-armed and delivered a second time.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        engine.sweep(EventKind::Alarm);
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(sink.sent.load(Ordering::SeqCst), 1);
        // Repeats: re-armed once, a week out.
        assert_eq!(engine.armed_count(EventKind::Alarm), 1);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_birthday_replacement_rearms_under_new_identity() {
        let (engine, _) = start_engine();
        let (scope, user) = server_user(&engine);
        let tz: Tz = "UTC".parse().unwrap();

        let old = Arc::new(
            BirthdayEntry::new(None, 6, 15, 0, tz, ChannelId::new(), Utc::now()).unwrap(),
        );
        user.set_birthday(old.clone());
        engine.notify_entry_change(EventKind::Birthday);

        let old_key = EntryKey {
            scope,
            user: user.id(),
            entry: old.id(),
        };
        assert!(engine.inner.birthdays.contains(&old_key));

        let replacement = Arc::new(
            BirthdayEntry::new(None, 7, 1, 0, tz, ChannelId::new(), Utc::now()).unwrap(),
        );
        user.set_birthday(replacement.clone());
        engine.notify_entry_change(EventKind::Birthday);

        let new_key = EntryKey {
            scope,
            user: user.id(),
            entry: replacement.id(),
        };
        assert!(!engine.inner.birthdays.contains(&old_key));
        assert!(engine.inner.birthdays.contains(&new_key));
        assert_eq!(engine.armed_count(EventKind::Birthday), 1);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_arms_entries_from_loaded_snapshot() {
        // Build state through one engine, snapshot it by hand, feed it to a
        // second engine through its durable store.
        let (first, _) = start_engine();
        let (_, user) = server_user(&first);
        user.add_timer(Arc::new(
            TimerEntry::new(Duration::from_secs(3600), ChannelId::new(), "later", Utc::now())
                .unwrap(),
        ));
        let snapshot = first.store().snapshot();
        first.shutdown().await;

        struct Seeded(Snapshot);
        impl DurableStore for Seeded {
            fn load(&self) -> StoreResult<Option<Snapshot>> {
                Ok(Some(self.0.clone()))
            }
            fn save(&self, _snapshot: &Snapshot) -> StoreResult<()> {
                Ok(())
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let second = Engine::start(Arc::new(Seeded(snapshot)), sink).unwrap();
        assert_eq!(second.armed_count(EventKind::Timer), 1);

        second.shutdown().await;
    }
}
