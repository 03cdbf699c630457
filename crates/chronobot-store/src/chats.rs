//! Scope nodes: servers and direct-message contexts.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chronobot_shared::{ChannelId, ResponderFlag, ServerId, UserId};

use crate::error::Result;
use crate::lock;
use crate::snapshot::{DmSnapshot, ServerSnapshot};
use crate::user::UserNode;

/// The user map every scope node embeds.
#[derive(Debug, Default)]
pub(crate) struct UserMap {
    users: Mutex<HashMap<UserId, Arc<UserNode>>>,
}

impl UserMap {
    pub(crate) fn get(&self, id: UserId) -> Option<Arc<UserNode>> {
        lock(&self.users).get(&id).cloned()
    }

    pub(crate) fn obtain(&self, id: UserId) -> Arc<UserNode> {
        lock(&self.users)
            .entry(id)
            .or_insert_with(|| Arc::new(UserNode::new(id)))
            .clone()
    }

    pub(crate) fn insert(&self, user: Arc<UserNode>) {
        lock(&self.users).insert(user.id(), user);
    }

    pub(crate) fn all(&self) -> Vec<Arc<UserNode>> {
        lock(&self.users).values().cloned().collect()
    }
}

/// Server-level moderation settings.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    pub forced_flag: Option<ResponderFlag>,
    pub allowed_birthday_channels: HashSet<ChannelId>,
    pub allow_custom_messages: Option<bool>,
}

/// One server and the users known within it.
#[derive(Debug)]
pub struct ServerNode {
    id: ServerId,
    users: UserMap,
    settings: Mutex<ServerSettings>,
}

impl ServerNode {
    pub fn new(id: ServerId) -> Self {
        Self {
            id,
            users: UserMap::default(),
            settings: Mutex::new(ServerSettings::default()),
        }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn user(&self, id: UserId) -> Option<Arc<UserNode>> {
        self.users.get(id)
    }

    pub fn obtain_user(&self, id: UserId) -> Arc<UserNode> {
        self.users.obtain(id)
    }

    pub fn users(&self) -> Vec<Arc<UserNode>> {
        self.users.all()
    }

    pub fn forced_flag(&self) -> Option<ResponderFlag> {
        lock(&self.settings).forced_flag
    }

    pub fn set_forced_flag(&self, flag: Option<ResponderFlag>) {
        lock(&self.settings).forced_flag = flag;
    }

    pub fn allow_custom_messages(&self) -> Option<bool> {
        lock(&self.settings).allow_custom_messages
    }

    pub fn set_allow_custom_messages(&self, allow: Option<bool>) {
        lock(&self.settings).allow_custom_messages = allow;
    }

    pub fn allowed_birthday_channels(&self) -> HashSet<ChannelId> {
        lock(&self.settings).allowed_birthday_channels.clone()
    }

    /// Returns `true` if the channel was newly added.
    pub fn add_allowed_birthday_channel(&self, channel: ChannelId) -> bool {
        lock(&self.settings).allowed_birthday_channels.insert(channel)
    }

    /// Returns `true` if the channel was present.
    pub fn remove_allowed_birthday_channel(&self, channel: ChannelId) -> bool {
        lock(&self.settings).allowed_birthday_channels.remove(&channel)
    }

    pub fn is_allowed_birthday_channel(&self, channel: ChannelId) -> bool {
        lock(&self.settings).allowed_birthday_channels.contains(&channel)
    }

    pub(crate) fn snapshot(&self) -> ServerSnapshot {
        let settings = lock(&self.settings).clone();
        let mut channels: Vec<ChannelId> =
            settings.allowed_birthday_channels.into_iter().collect();
        channels.sort_by_key(|c| c.0);

        ServerSnapshot {
            server_id: self.id,
            users: self.users().iter().map(|u| u.snapshot()).collect(),
            forced_flag: settings.forced_flag,
            allowed_birthday_channels: channels,
            allow_custom_messages: settings.allow_custom_messages,
        }
    }

    pub(crate) fn from_snapshot(snap: &ServerSnapshot) -> Result<Self> {
        let node = Self::new(snap.server_id);
        {
            let mut settings = lock(&node.settings);
            settings.forced_flag = snap.forced_flag;
            settings.allowed_birthday_channels =
                snap.allowed_birthday_channels.iter().copied().collect();
            settings.allow_custom_messages = snap.allow_custom_messages;
        }
        for user in &snap.users {
            node.users.insert(Arc::new(UserNode::from_snapshot(user)?));
        }
        Ok(node)
    }
}

/// One direct-message context (private or group) and its users.
#[derive(Debug)]
pub struct DmNode {
    id: ChannelId,
    users: UserMap,
    forced_flag: Mutex<Option<ResponderFlag>>,
}

impl DmNode {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            users: UserMap::default(),
            forced_flag: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn user(&self, id: UserId) -> Option<Arc<UserNode>> {
        self.users.get(id)
    }

    pub fn obtain_user(&self, id: UserId) -> Arc<UserNode> {
        self.users.obtain(id)
    }

    pub fn users(&self) -> Vec<Arc<UserNode>> {
        self.users.all()
    }

    pub fn forced_flag(&self) -> Option<ResponderFlag> {
        *lock(&self.forced_flag)
    }

    pub fn set_forced_flag(&self, flag: Option<ResponderFlag>) {
        *lock(&self.forced_flag) = flag;
    }

    pub(crate) fn snapshot(&self) -> DmSnapshot {
        DmSnapshot {
            channel_id: self.id,
            users: self.users().iter().map(|u| u.snapshot()).collect(),
            forced_flag: self.forced_flag(),
        }
    }

    pub(crate) fn from_snapshot(snap: &DmSnapshot) -> Result<Self> {
        let node = Self::new(snap.channel_id);
        node.set_forced_flag(snap.forced_flag);
        for user in &snap.users {
            node.users.insert(Arc::new(UserNode::from_snapshot(user)?));
        }
        Ok(node)
    }
}
