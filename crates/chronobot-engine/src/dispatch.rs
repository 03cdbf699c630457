//! The fire timeline: a single delay-ordered execution queue.
//!
//! One spawned task owns a min-heap of armed items and runs each fire
//! callback at or after its target instant, in non-decreasing target order,
//! one at a time. A slow callback delays subsequently due callbacks; that is
//! an accepted trade-off at this event volume.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::lock;

/// A fire callback, boxed so the timeline can hold it until due.
pub type FireJob = BoxFuture<'static, ()>;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to one armed item on the timeline.
///
/// Firing and cancellation race on a single atomic claim, so exactly one of
/// them wins: a cancelled item never runs its callback, and a claimed item
/// can no longer be cancelled.
#[derive(Debug, Clone)]
pub struct ArmedHandle {
    state: Arc<AtomicU8>,
}

impl ArmedHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    fn cancelled() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(CANCELLED)),
        }
    }

    /// Returns `true` if this call won the claim (the item will not fire).
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }
}

struct ArmedItem {
    due: DateTime<Utc>,
    seq: u64,
    state: Arc<AtomicU8>,
    job: FireJob,
}

impl PartialEq for ArmedItem {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ArmedItem {}

impl PartialOrd for ArmedItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArmedItem {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

/// Handle to the timeline task.
pub struct Dispatcher {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<ArmedItem>>>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
    seq: AtomicU64,
}

impl Dispatcher {
    /// Spawn the timeline task. Must be called within a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_timeline(rx));
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            task: std::sync::Mutex::new(Some(task)),
            seq: AtomicU64::new(0),
        }
    }

    /// Register a fire callback for `due`. The returned handle cancels it.
    pub fn arm(&self, due: DateTime<Utc>, job: FireJob) -> ArmedHandle {
        let sender = lock(&self.tx).clone();
        let Some(sender) = sender else {
            warn!("dispatcher already stopped; dropping armed event");
            return ArmedHandle::cancelled();
        };

        let handle = ArmedHandle::new();
        let item = ArmedItem {
            due,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            state: Arc::clone(&handle.state),
            job,
        };
        if sender.send(item).is_err() {
            warn!("dispatcher task gone; dropping armed event");
            handle.cancel();
        }
        handle
    }

    /// Stop the timeline: no further items are accepted, queued pending
    /// items are cancelled, and the task is awaited to completion.
    pub async fn shutdown(&self) {
        let tx = lock(&self.tx).take();
        drop(tx);
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "dispatcher task ended abnormally");
            }
        }
    }
}

async fn run_timeline(mut rx: mpsc::UnboundedReceiver<ArmedItem>) {
    let mut queue: BinaryHeap<Reverse<ArmedItem>> = BinaryHeap::new();

    loop {
        let next_delay = queue.peek().map(|Reverse(item)| delay_until(item.due));

        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(item) => {
                        trace!(due = %item.due, "item armed");
                        queue.push(Reverse(item));
                    }
                    // All senders gone: engine shutdown.
                    None => break,
                }
            }
            _ = tokio::time::sleep(next_delay.unwrap_or(Duration::ZERO)), if next_delay.is_some() => {
                if let Some(Reverse(item)) = queue.pop() {
                    fire_item(item).await;
                }
            }
        }
    }

    let mut dropped = 0usize;
    while let Some(Reverse(item)) = queue.pop() {
        if item
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            dropped += 1;
        }
    }
    debug!(dropped, "fire timeline stopped");
}

async fn fire_item(item: ArmedItem) {
    // The claim makes firing and cancellation mutually exclusive.
    if item
        .state
        .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        trace!(due = %item.due, "skipping cancelled item");
        return;
    }
    item.job.await;
}

fn delay_until(due: DateTime<Utc>) -> Duration {
    (due - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}
