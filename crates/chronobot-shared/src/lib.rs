//! # chronobot-shared
//!
//! Identifier newtypes and small value types shared by the record store and
//! the scheduling engine.

pub mod format;
pub mod types;
pub mod weekdays;

pub use format::format_duration;
pub use types::{ChannelId, EntryId, EntryKey, EventKind, ResponderFlag, Scope, ServerId, UserId};
pub use weekdays::WeekdaySet;
