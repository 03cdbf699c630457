//! # chronobot-engine
//!
//! The scheduling and reconciliation core.
//!
//! An [`Engine`] owns one delay-ordered fire timeline (the
//! [`Dispatcher`](dispatch::Dispatcher)), one [`Registry`](registry::Registry)
//! of armed fire-events per event kind, and the reconciliation sweep that
//! keeps those registries consistent with the record store. Mutations go
//! through the store as usual; callers only signal
//! [`Engine::notify_entry_change`] afterwards and the sweep re-derives
//! registry state.

pub mod dispatch;
pub mod engine;
pub mod kinds;
pub mod registry;
pub mod sink;

mod error;

pub use engine::Engine;
pub use error::EngineError;
pub use sink::{NotificationSink, SinkError};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the inner value if a writer panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
