//! Registries of armed fire-events, one per event kind.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use chronobot_shared::{EntryKey, EventKind};
use tracing::debug;

use crate::dispatch::ArmedHandle;
use crate::lock;

/// One armed fire-event as the registry sees it: the instant it was armed
/// for and the timeline handle that can cancel it.
#[derive(Debug, Clone)]
pub struct ArmedEvent {
    pub target: DateTime<Utc>,
    pub handle: ArmedHandle,
}

/// Armed fire-events for one kind, keyed by entry identity.
///
/// Invariant: at most one armed event per live entry. The registry is never
/// the source of truth for entry state; it only correlates armed events back
/// to entries by key.
#[derive(Debug)]
pub struct Registry {
    kind: EventKind,
    events: Mutex<HashMap<EntryKey, ArmedEvent>>,
}

impl Registry {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            events: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Insert unless the entry is already covered.
    ///
    /// Returns `false` (leaving the existing event in place) when another
    /// armed event holds the key; the caller must cancel the rejected
    /// handle. This is what makes concurrent redundant sweeps safe.
    pub fn insert_if_absent(&self, key: EntryKey, event: ArmedEvent) -> bool {
        let mut events = lock(&self.events);
        if events.contains_key(&key) {
            return false;
        }
        events.insert(key, event);
        true
    }

    /// Conclude the armed event for `key` that fired at `target`: swap in
    /// `next`, or remove the record when `next` is `None`, under one lock
    /// and only while the record still carries `target`. Returns `false`
    /// when the record is gone or was re-armed for a different instant in
    /// the meantime; the caller then owns cancelling `next`.
    pub fn finish(&self, key: &EntryKey, target: DateTime<Utc>, next: Option<ArmedEvent>) -> bool {
        let mut events = lock(&self.events);
        match events.get(key) {
            Some(existing) if existing.target == target => {}
            _ => return false,
        }
        let old = match next {
            Some(event) => events.insert(*key, event),
            None => events.remove(key),
        };
        if let Some(old) = old {
            old.handle.cancel();
        }
        true
    }

    pub fn get(&self, key: &EntryKey) -> Option<ArmedEvent> {
        lock(&self.events).get(key).cloned()
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        lock(&self.events).contains_key(key)
    }

    /// Cancel and remove. Idempotent.
    pub fn remove(&self, key: &EntryKey) -> bool {
        let removed = lock(&self.events).remove(key);
        match removed {
            Some(event) => {
                event.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Atomically replace the armed event for `key` (remove old, insert
    /// new under one lock). The old handle, if any, is cancelled.
    pub fn replace(&self, key: EntryKey, event: ArmedEvent) {
        let old = lock(&self.events).insert(key, event);
        if let Some(old) = old {
            old.handle.cancel();
        }
    }

    /// Keys of all currently armed events (copy-before-iterate: callers may
    /// mutate the registry while walking this).
    pub fn armed_keys(&self) -> Vec<EntryKey> {
        lock(&self.events).keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    /// Cancel every armed event and clear the registry. Teardown only.
    pub fn cancel_all(&self) {
        let events = {
            let mut map = lock(&self.events);
            std::mem::take(&mut *map)
        };
        let count = events.len();
        for event in events.into_values() {
            event.handle.cancel();
        }
        if count > 0 {
            debug!(kind = %self.kind, count, "cancelled all armed events");
        }
    }
}
