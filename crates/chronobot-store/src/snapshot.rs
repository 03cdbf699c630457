//! Serializable tree mirroring the record store.
//!
//! The snapshot is the unit of persistence: the whole store is copied out
//! into this tree and handed to the [`DurableStore`](crate::DurableStore).
//! Absent optional fields are omitted from the JSON; absence always means
//! "unset", never a sentinel value.

use chrono::{DateTime, NaiveTime, Utc};
use chronobot_shared::{ChannelId, EntryId, ResponderFlag, ServerId, UserId, WeekdaySet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub servers: Vec<ServerSnapshot>,
    #[serde(default)]
    pub dms: Vec<DmSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub server_id: ServerId,
    #[serde(default)]
    pub users: Vec<UserSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_flag: Option<ResponderFlag>,
    #[serde(default)]
    pub allowed_birthday_channels: Vec<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_custom_messages: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmSnapshot {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub users: Vec<UserSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_flag: Option<ResponderFlag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: UserId,
    /// IANA timezone name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// BCP 47 language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<BirthdaySnapshot>,
    #[serde(default)]
    pub timers: Vec<TimerSnapshot>,
    #[serde(default)]
    pub alarms: Vec<AlarmSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub id: EntryId,
    pub target: DateTime<Utc>,
    pub duration_secs: u64,
    pub channel: ChannelId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmSnapshot {
    pub id: EntryId,
    pub local_time: NaiveTime,
    #[serde(default)]
    pub repeating_days: WeekdaySet,
    pub channel: ChannelId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BirthdaySnapshot {
    pub id: EntryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub next_year: i32,
    pub channel: ChannelId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_are_omitted() {
        let user = UserSnapshot {
            user_id: UserId::new(),
            timezone: None,
            locale: None,
            format_pattern: None,
            timezone_visible: None,
            birthday: None,
            timers: Vec::new(),
            alarms: Vec::new(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("timezone"));
        assert!(!json.contains("birthday"));
        assert!(!json.contains("locale"));
    }

    #[test]
    fn test_missing_fields_deserialize_as_unset() {
        let snap: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snap.servers.is_empty());
        assert!(snap.dms.is_empty());

        let user: UserSnapshot =
            serde_json::from_str(&format!(r#"{{"user_id":"{}"}}"#, uuid::Uuid::new_v4())).unwrap();
        assert!(user.timezone.is_none());
        assert!(user.timers.is_empty());
    }
}
