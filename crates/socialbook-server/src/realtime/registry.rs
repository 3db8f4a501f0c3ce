//! In-memory map of live realtime connections.
//!
//! A connection is registered unbound when its socket opens, bound to a
//! user by an authenticated `join`, and may subscribe to any number of
//! group rooms. A user owns a *set* of connections, so every open tab or
//! device is addressable. Nothing here is persisted; a restart starts
//! with an empty registry.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use socialbook_shared::{ConnectionId, GroupId, UserId};

use super::events::ServerEvent;

pub type EventSender = mpsc::Sender<ServerEvent>;

struct Slot {
    tx: EventSender,
    user: Option<UserId>,
    groups: HashSet<GroupId>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Slot>,
    users: HashMap<UserId, HashSet<ConnectionId>>,
    groups: HashMap<GroupId, HashSet<ConnectionId>>,
}

impl Inner {
    /// Detach `id` from its user's set. Returns the departure, if bound.
    fn detach_user(&mut self, id: ConnectionId, user: UserId) -> Departure {
        let remaining = match self.users.get_mut(&user) {
            Some(set) => {
                set.remove(&id);
                let n = set.len();
                if n == 0 {
                    self.users.remove(&user);
                }
                n
            }
            None => 0,
        };
        Departure { user, remaining }
    }
}

/// A connection that stopped counting towards `user`'s presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub user: UserId,
    /// Connections `user` still has after this one left.
    pub remaining: usize,
}

impl Departure {
    pub fn was_last(&self) -> bool {
        self.remaining == 0
    }
}

/// Result of binding a connection to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// The connection is not registered (it already closed).
    Unknown,
    /// Bound. `previous` is set when the connection moved away from a
    /// different user.
    Ok { previous: Option<Departure> },
}

pub struct PresenceRegistry {
    inner: RwLock<Inner>,
    buffer: usize,
}

impl PresenceRegistry {
    /// `buffer` is the outbound queue depth of every connection.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            buffer: buffer.max(1),
        }
    }

    /// Register a freshly opened, unbound connection.
    pub async fn register(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.buffer);

        let mut inner = self.inner.write().await;
        inner.connections.insert(
            id,
            Slot {
                tx,
                user: None,
                groups: HashSet::new(),
            },
        );
        debug!(connection = %id, total = inner.connections.len(), "Connection registered");

        (id, rx)
    }

    /// Bind `id` to `user`. Binding the same user twice is a no-op.
    pub async fn bind(&self, id: ConnectionId, user: UserId) -> Bound {
        let mut inner = self.inner.write().await;

        let previous = match inner.connections.get_mut(&id) {
            Some(slot) => slot.user.replace(user),
            None => return Bound::Unknown,
        };

        let previous = match previous {
            Some(prev) if prev == user => None,
            Some(prev) => Some(inner.detach_user(id, prev)),
            None => None,
        };

        inner.users.entry(user).or_default().insert(id);

        info!(
            connection = %id,
            user = %user,
            connections = inner.users.get(&user).map_or(0, HashSet::len),
            "Connection joined"
        );

        Bound::Ok { previous }
    }

    /// Drop a closed connection from every index.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Departure> {
        let mut inner = self.inner.write().await;
        let slot = inner.connections.remove(&id)?;

        for group in &slot.groups {
            if let Some(set) = inner.groups.get_mut(group) {
                set.remove(&id);
                if set.is_empty() {
                    inner.groups.remove(group);
                }
            }
        }

        let departure = slot.user.map(|user| inner.detach_user(id, user));
        debug!(
            connection = %id,
            user = ?slot.user,
            total = inner.connections.len(),
            "Connection unregistered"
        );
        departure
    }

    /// Unbind every connection of `user`, keeping the connections registered
    /// and subscribed. Returns the senders of the unbound connections.
    pub async fn unbind_user(&self, user: UserId) -> Vec<(ConnectionId, EventSender)> {
        let mut inner = self.inner.write().await;
        let Some(ids) = inner.users.remove(&user) else {
            return Vec::new();
        };
        let unbound: Vec<_> = ids
            .into_iter()
            .filter_map(|id| {
                let slot = inner.connections.get_mut(&id)?;
                slot.user = None;
                Some((id, slot.tx.clone()))
            })
            .collect();
        debug!(user = %user, count = unbound.len(), "User connections unbound");
        unbound
    }

    /// Subscribe `id` to a group room. No membership check is made here;
    /// group traffic is authorized on the request/response path.
    pub async fn subscribe_group(&self, id: ConnectionId, group: GroupId) -> bool {
        let mut inner = self.inner.write().await;
        match inner.connections.get_mut(&id) {
            Some(slot) => {
                slot.groups.insert(group);
                inner.groups.entry(group).or_default().insert(id);
                true
            }
            None => false,
        }
    }

    pub async fn unsubscribe_group(&self, id: ConnectionId, group: GroupId) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner
            .connections
            .get_mut(&id)
            .is_some_and(|slot| slot.groups.remove(&group));
        if let Some(set) = inner.groups.get_mut(&group) {
            set.remove(&id);
            if set.is_empty() {
                inner.groups.remove(&group);
            }
        }
        removed
    }

    pub async fn user_of(&self, id: ConnectionId) -> Option<UserId> {
        self.inner
            .read()
            .await
            .connections
            .get(&id)
            .and_then(|slot| slot.user)
    }

    pub async fn sender_for_connection(&self, id: ConnectionId) -> Option<EventSender> {
        self.inner
            .read()
            .await
            .connections
            .get(&id)
            .map(|slot| slot.tx.clone())
    }

    pub async fn senders_for_user(&self, user: UserId) -> Vec<(ConnectionId, EventSender)> {
        let inner = self.inner.read().await;
        collect_senders(&inner, inner.users.get(&user))
    }

    pub async fn senders_for_group(&self, group: GroupId) -> Vec<(ConnectionId, EventSender)> {
        let inner = self.inner.read().await;
        collect_senders(&inner, inner.groups.get(&group))
    }

    /// Every open connection, bound or not.
    pub async fn all_senders(&self) -> Vec<(ConnectionId, EventSender)> {
        self.inner
            .read()
            .await
            .connections
            .iter()
            .map(|(id, slot)| (*id, slot.tx.clone()))
            .collect()
    }

    pub async fn is_online(&self, user: UserId) -> bool {
        self.inner.read().await.users.contains_key(&user)
    }

    pub async fn connections_of(&self, user: UserId) -> usize {
        self.inner
            .read()
            .await
            .users
            .get(&user)
            .map_or(0, HashSet::len)
    }

    /// Users with at least one bound connection.
    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.read().await.users.keys().copied().collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}

fn collect_senders(
    inner: &Inner,
    ids: Option<&HashSet<ConnectionId>>,
) -> Vec<(ConnectionId, EventSender)> {
    ids.into_iter()
        .flatten()
        .filter_map(|id| inner.connections.get(id).map(|slot| (*id, slot.tx.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_is_unbound() {
        let registry = PresenceRegistry::new(8);
        let (conn, _rx) = registry.register().await;

        assert_eq!(registry.connection_count().await, 1);
        assert!(registry.user_of(conn).await.is_none());
        assert!(registry.online_users().await.is_empty());
        assert_eq!(registry.unregister(conn).await, None);
    }

    #[tokio::test]
    async fn test_user_owns_a_set_of_connections() {
        let registry = PresenceRegistry::new(8);
        let user = UserId::new();
        let (a, _rx_a) = registry.register().await;
        let (b, _rx_b) = registry.register().await;

        assert_eq!(registry.bind(a, user).await, Bound::Ok { previous: None });
        assert_eq!(registry.bind(b, user).await, Bound::Ok { previous: None });
        assert_eq!(registry.connections_of(user).await, 2);
        assert_eq!(registry.senders_for_user(user).await.len(), 2);

        let first = registry.unregister(a).await.unwrap();
        assert_eq!(first, Departure { user, remaining: 1 });
        assert!(!first.was_last());
        assert!(registry.is_online(user).await);

        let last = registry.unregister(b).await.unwrap();
        assert!(last.was_last());
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn test_rebind_moves_connection() {
        let registry = PresenceRegistry::new(8);
        let (alice, bob) = (UserId::new(), UserId::new());
        let (conn, _rx) = registry.register().await;

        registry.bind(conn, alice).await;
        assert_eq!(registry.bind(conn, alice).await, Bound::Ok { previous: None });

        let moved = registry.bind(conn, bob).await;
        assert_eq!(
            moved,
            Bound::Ok {
                previous: Some(Departure {
                    user: alice,
                    remaining: 0
                })
            }
        );
        assert!(!registry.is_online(alice).await);
        assert_eq!(registry.user_of(conn).await, Some(bob));
    }

    #[tokio::test]
    async fn test_unbind_user_keeps_connections_open() {
        let registry = PresenceRegistry::new(8);
        let (alice, bob) = (UserId::new(), UserId::new());
        let (a, _rx_a) = registry.register().await;
        let (b, _rx_b) = registry.register().await;
        let (c, _rx_c) = registry.register().await;
        registry.bind(a, alice).await;
        registry.bind(b, alice).await;
        registry.bind(c, bob).await;

        let mut unbound: Vec<_> = registry
            .unbind_user(alice)
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        unbound.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(unbound, expected);

        assert!(!registry.is_online(alice).await);
        assert!(registry.user_of(a).await.is_none());
        assert_eq!(registry.user_of(c).await, Some(bob));
        assert_eq!(registry.connection_count().await, 3);
        assert_eq!(registry.unregister(a).await, None);
        assert!(registry.unbind_user(alice).await.is_empty());
    }

    #[tokio::test]
    async fn test_bind_unknown_connection() {
        let registry = PresenceRegistry::new(8);
        assert_eq!(
            registry.bind(ConnectionId::new(), UserId::new()).await,
            Bound::Unknown
        );
    }

    #[tokio::test]
    async fn test_group_rooms_follow_connection_lifetime() {
        let registry = PresenceRegistry::new(8);
        let group = GroupId::new();
        let (a, _rx_a) = registry.register().await;
        let (b, _rx_b) = registry.register().await;

        assert!(registry.subscribe_group(a, group).await);
        assert!(registry.subscribe_group(b, group).await);
        assert_eq!(registry.senders_for_group(group).await.len(), 2);

        assert!(registry.unsubscribe_group(a, group).await);
        assert!(!registry.unsubscribe_group(a, group).await);
        assert_eq!(registry.senders_for_group(group).await.len(), 1);

        registry.unregister(b).await;
        assert!(registry.senders_for_group(group).await.is_empty());
        assert!(!registry.subscribe_group(b, group).await);
    }
}
