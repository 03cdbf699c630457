//! # chronobot-store
//!
//! The mutable, persisted record store behind the scheduling engine.
//!
//! The store is a lock-per-node tree: servers and DM contexts hold user
//! nodes, user nodes hold preferences plus their timer/alarm/birthday
//! entries. Every container is guarded by its own lock, held only for the
//! duration of a single container operation; entry state sits behind the
//! entry's own lock. Persistence is a whole-tree [`Snapshot`] written
//! through the [`DurableStore`] boundary.

pub mod alarm;
pub mod birthday;
pub mod chats;
pub mod persist;
pub mod snapshot;
pub mod store;
pub mod timer;
pub mod user;

mod error;

pub use alarm::AlarmEntry;
pub use birthday::BirthdayEntry;
pub use chats::{DmNode, ServerNode, ServerSettings};
pub use error::{Result, StoreError};
pub use persist::{DurableStore, JsonSnapshotFile};
pub use snapshot::Snapshot;
pub use store::Store;
pub use timer::TimerEntry;
pub use user::{UserNode, UserPrefs};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the inner value if a writer panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
