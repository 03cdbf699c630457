//! The record store root: server and DM scope maps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chronobot_shared::{ChannelId, Scope, ServerId, UserId};

use crate::chats::{DmNode, ServerNode};
use crate::error::Result;
use crate::lock;
use crate::snapshot::Snapshot;
use crate::user::UserNode;

/// Root of the record store tree.
///
/// The store exclusively owns all entries; schedulers correlate to them by
/// value keys only. Each map is guarded by its own lock, held only for the
/// container operation itself — walks copy the node lists out first.
#[derive(Debug, Default)]
pub struct Store {
    servers: Mutex<HashMap<ServerId, Arc<ServerNode>>>,
    dms: Mutex<HashMap<ChannelId, Arc<DmNode>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(&self, id: ServerId) -> Option<Arc<ServerNode>> {
        lock(&self.servers).get(&id).cloned()
    }

    pub fn obtain_server(&self, id: ServerId) -> Arc<ServerNode> {
        lock(&self.servers)
            .entry(id)
            .or_insert_with(|| Arc::new(ServerNode::new(id)))
            .clone()
    }

    pub fn servers(&self) -> Vec<Arc<ServerNode>> {
        lock(&self.servers).values().cloned().collect()
    }

    pub fn dm(&self, id: ChannelId) -> Option<Arc<DmNode>> {
        lock(&self.dms).get(&id).cloned()
    }

    pub fn obtain_dm(&self, id: ChannelId) -> Arc<DmNode> {
        lock(&self.dms)
            .entry(id)
            .or_insert_with(|| Arc::new(DmNode::new(id)))
            .clone()
    }

    pub fn dms(&self) -> Vec<Arc<DmNode>> {
        lock(&self.dms).values().cloned().collect()
    }

    /// Resolve a user node within a scope.
    pub fn user(&self, scope: Scope, user: UserId) -> Option<Arc<UserNode>> {
        match scope {
            Scope::Server(id) => self.server(id)?.user(user),
            Scope::Dm(id) => self.dm(id)?.user(user),
        }
    }

    /// Get-or-create a user node within a scope.
    pub fn obtain_user(&self, scope: Scope, user: UserId) -> Arc<UserNode> {
        match scope {
            Scope::Server(id) => self.obtain_server(id).obtain_user(user),
            Scope::Dm(id) => self.obtain_dm(id).obtain_user(user),
        }
    }

    /// Walk every user in every scope. No store lock is held while `f` runs.
    pub fn for_each_user<F>(&self, mut f: F)
    where
        F: FnMut(Scope, &Arc<UserNode>),
    {
        for server in self.servers() {
            for user in server.users() {
                f(Scope::Server(server.id()), &user);
            }
        }
        for dm in self.dms() {
            for user in dm.users() {
                f(Scope::Dm(dm.id()), &user);
            }
        }
    }

    /// Copy the whole tree out into a serializable snapshot.
    pub fn snapshot(&self) -> Snapshot {
        let mut servers: Vec<_> = self.servers().iter().map(|s| s.snapshot()).collect();
        servers.sort_by_key(|s| s.server_id.0);

        let mut dms: Vec<_> = self.dms().iter().map(|d| d.snapshot()).collect();
        dms.sort_by_key(|d| d.channel_id.0);

        Snapshot { servers, dms }
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        let store = Self::new();
        {
            let mut servers = lock(&store.servers);
            for server in &snapshot.servers {
                let node = Arc::new(ServerNode::from_snapshot(server)?);
                servers.insert(node.id(), node);
            }
        }
        {
            let mut dms = lock(&store.dms);
            for dm in &snapshot.dms {
                let node = Arc::new(DmNode::from_snapshot(dm)?);
                dms.insert(node.id(), node);
            }
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmEntry;
    use crate::birthday::BirthdayEntry;
    use crate::timer::TimerEntry;
    use chrono::{NaiveTime, Utc};
    use chrono_tz::Tz;
    use std::time::Duration;

    fn populated_store() -> (Store, ServerId, UserId) {
        let store = Store::new();
        let server_id = ServerId::new();
        let user_id = UserId::new();
        let tz: Tz = "Europe/Berlin".parse().unwrap();

        let server = store.obtain_server(server_id);
        server.add_allowed_birthday_channel(ChannelId::new());

        let user = server.obtain_user(user_id);
        user.set_timezone(Some(tz));
        user.set_locale(Some("de-DE".into()));
        user.set_timezone_visible(Some(true));
        user.add_timer(Arc::new(
            TimerEntry::new(Duration::from_secs(600), ChannelId::new(), "tea", Utc::now())
                .unwrap(),
        ));
        user.add_alarm(Arc::new(AlarmEntry::new(
            NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            ChannelId::new(),
            "wake",
        )));
        user.set_birthday(Arc::new(
            BirthdayEntry::new(Some(1990), 6, 15, 0, tz, ChannelId::new(), Utc::now()).unwrap(),
        ));

        let dm_user = store.obtain_dm(ChannelId::new()).obtain_user(UserId::new());
        dm_user.add_timer(Arc::new(
            TimerEntry::new(Duration::from_secs(60), ChannelId::new(), "dm", Utc::now()).unwrap(),
        ));

        (store, server_id, user_id)
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let (store, server_id, user_id) = populated_store();

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        let restored = Store::from_snapshot(&parsed).unwrap();

        let user = restored
            .user(Scope::Server(server_id), user_id)
            .expect("user survives the round trip");
        assert_eq!(user.timezone().unwrap().name(), "Europe/Berlin");
        assert_eq!(user.locale().as_deref(), Some("de-DE"));
        assert_eq!(user.timers().len(), 1);
        assert_eq!(user.alarms().len(), 1);
        assert!(user.birthday().is_some());

        let original_timer = store
            .user(Scope::Server(server_id), user_id)
            .unwrap()
            .timer_at(0)
            .unwrap();
        let restored_timer = user.timer_at(0).unwrap();
        assert_eq!(restored_timer.id(), original_timer.id());
        assert_eq!(restored_timer.target(), original_timer.target());

        assert_eq!(restored.dms().len(), 1);
    }

    #[test]
    fn test_invalid_timezone_in_snapshot_is_rejected() {
        let (store, ..) = populated_store();
        let mut snapshot = store.snapshot();
        snapshot.servers[0].users[0].timezone = Some("Mars/Olympus_Mons".into());

        assert!(Store::from_snapshot(&snapshot).is_err());
    }

    #[test]
    fn test_for_each_user_covers_servers_and_dms() {
        let (store, ..) = populated_store();
        let mut server_users = 0;
        let mut dm_users = 0;
        store.for_each_user(|scope, _| match scope {
            Scope::Server(_) => server_users += 1,
            Scope::Dm(_) => dm_users += 1,
        });
        assert_eq!(server_users, 1);
        assert_eq!(dm_users, 1);
    }
}
