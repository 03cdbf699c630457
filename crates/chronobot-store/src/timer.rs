//! One-shot countdown timers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use chronobot_shared::{ChannelId, EntryId};

use crate::error::{Result, StoreError};
use crate::snapshot::TimerSnapshot;

/// A one-shot timer entry.
///
/// The target instant is fixed at creation (`armed_at + duration`) and never
/// recomputed; no mutation primitive exists. The entry is removed from its
/// owner once it has fired.
#[derive(Debug)]
pub struct TimerEntry {
    id: EntryId,
    duration: Duration,
    target: DateTime<Utc>,
    channel: ChannelId,
    message: String,
}

impl TimerEntry {
    pub fn new(
        duration: Duration,
        channel: ChannelId,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let delta = chrono::Duration::from_std(duration)
            .map_err(|_| StoreError::InvalidDuration(format!("{duration:?} out of range")))?;
        Ok(Self {
            id: EntryId::new(),
            duration,
            target: now + delta,
            channel,
            message: message.into(),
        })
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn target(&self) -> DateTime<Utc> {
        self.target
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            id: self.id,
            target: self.target,
            duration_secs: self.duration.as_secs(),
            channel: self.channel,
            message: self.message.clone(),
        }
    }

    pub(crate) fn from_snapshot(snap: &TimerSnapshot) -> Self {
        Self {
            id: snap.id,
            duration: Duration::from_secs(snap.duration_secs),
            target: snap.target,
            channel: snap.channel,
            message: snap.message.clone(),
        }
    }
}
