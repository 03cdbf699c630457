use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Chat-platform identifiers. The platform client resolves these to real
// server/channel/user handles; the engine only correlates by value.

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ServerId(pub Uuid);

impl ServerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Mention form understood by the platform client.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of one scheduling entry (timer, alarm or birthday).
///
/// Generated at entry creation and carried through the snapshot, so armed
/// fire-events stay correlated to their entries across edits and restarts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a user-in-scope lives: a server or a direct-message context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Scope {
    Server(ServerId),
    Dm(ChannelId),
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => write!(f, "server:{id}"),
            Self::Dm(id) => write!(f, "dm:{id}"),
        }
    }
}

/// Full correlation key between an armed fire-event and the entry it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub scope: Scope,
    pub user: UserId,
    pub entry: EntryId,
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.scope, self.user, self.entry)
    }
}

/// The three kinds of scheduled fire-events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Timer,
    Alarm,
    Birthday,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Timer, EventKind::Alarm, EventKind::Birthday];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timer => write!(f, "timer"),
            Self::Alarm => write!(f, "alarm"),
            Self::Birthday => write!(f, "birthday"),
        }
    }
}

/// Message flag a moderator can force onto command responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponderFlag {
    Ephemeral,
    Silent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(EntryId::new(), EntryId::new());
        assert_ne!(UserId::new(), UserId::new());
    }

    #[test]
    fn test_scope_distinguishes_server_and_dm() {
        let id = Uuid::new_v4();
        assert_ne!(Scope::Server(ServerId(id)), Scope::Dm(ChannelId(id)));
    }

    #[test]
    fn test_mention_format() {
        let user = UserId::new();
        assert_eq!(user.mention(), format!("<@{}>", user.0));
    }
}
