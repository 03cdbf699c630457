//! The notification-delivery boundary.

use async_trait::async_trait;
use chronobot_shared::ChannelId;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("delivery failed: {0}")]
pub struct SinkError(pub String);

/// Delivery boundary consumed by fire callbacks.
///
/// Delivery is best-effort: a failure is logged and the event still counts
/// as fired (the underlying entry is advanced or removed either way).
/// Called from the fire timeline, so a slow implementation delays
/// subsequently due events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, channel: ChannelId, text: &str) -> Result<(), SinkError>;
}
