//! Connection lifecycle and the durable online flag.
//!
//! A user is online while at least one of their connections is bound.
//! Every join writes `is_online = true` and announces `userOnline`; only the
//! disconnect of the user's last connection writes `is_online = false` with
//! `last_seen` and announces `userOffline`. Store failures are logged and
//! swallowed: the realtime connection never fails because of them.

use std::sync::Arc;

use tracing::{info, warn};

use socialbook_shared::{ConnectionId, UserId};

use super::events::ServerEvent;
use super::registry::{Bound, PresenceRegistry};
use super::router::EventRouter;
use crate::clock::Clock;
use crate::state::SharedDatabase;

#[derive(Clone)]
pub struct PresenceTracker {
    registry: Arc<PresenceRegistry>,
    router: EventRouter,
    db: SharedDatabase,
    clock: Arc<dyn Clock>,
}

impl PresenceTracker {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        router: EventRouter,
        db: SharedDatabase,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            router,
            db,
            clock,
        }
    }

    /// Bind `connection` to an already-authenticated `user`. Returns `false`
    /// if the connection closed before the bind.
    pub async fn join(&self, connection: ConnectionId, user: UserId) -> bool {
        let previous = match self.registry.bind(connection, user).await {
            Bound::Unknown => return false,
            Bound::Ok { previous } => previous,
        };

        if let Some(departure) = previous.filter(|d| d.was_last()) {
            self.went_offline(departure.user).await;
        }

        {
            let db = self.db.lock().await;
            if let Err(e) = db.mark_online(user) {
                warn!(user = %user, error = %e, "Failed to mark user online");
            }
        }

        let connections = self.registry.connections_of(user).await;
        info!(user = %user, connections, "User online");
        self.router.broadcast(ServerEvent::UserOnline(user)).await;
        true
    }

    /// Forget a closed connection.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let Some(departure) = self.registry.unregister(connection).await else {
            return;
        };
        if departure.was_last() {
            self.went_offline(departure.user).await;
        }
    }

    /// Unbind every connection of `user` after their account was banned or
    /// deleted. The sockets stay open but are told why and can no longer act
    /// as `user`; a later `join` fails authentication.
    pub async fn evict(&self, user: UserId, reason: &str) {
        let unbound = self.registry.unbind_user(user).await;
        if unbound.is_empty() {
            return;
        }
        for (_, tx) in &unbound {
            let _ = tx.try_send(ServerEvent::error(reason));
        }
        info!(user = %user, connections = unbound.len(), reason, "Evicted user connections");
        self.went_offline(user).await;
    }

    async fn went_offline(&self, user: UserId) {
        let last_seen = self.clock.now();
        {
            let db = self.db.lock().await;
            // A join writes its online flag under this lock after binding, so
            // a rebind that won the race is visible here.
            if self.registry.is_online(user).await {
                return;
            }
            if let Err(e) = db.mark_offline(user, last_seen) {
                warn!(user = %user, error = %e, "Failed to mark user offline");
            }
        }
        info!(user = %user, "User offline");
        self.router.broadcast(ServerEvent::UserOffline(user)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tokio::sync::Mutex;

    use socialbook_store::{Database, NewUser};

    use crate::clock::ManualClock;

    struct Fixture {
        registry: Arc<PresenceRegistry>,
        presence: PresenceTracker,
        db: SharedDatabase,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(PresenceRegistry::new(16));
        let router = EventRouter::new(registry.clone());
        let db: SharedDatabase = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let clock = ManualClock::new(Utc::now());
        let presence =
            PresenceTracker::new(registry.clone(), router, db.clone(), Arc::new(clock.clone()));
        Fixture {
            registry,
            presence,
            db,
            clock,
        }
    }

    async fn create_user(db: &SharedDatabase) -> UserId {
        db.lock()
            .await
            .create_user(
                &NewUser {
                    first_name: "Test".into(),
                    last_name: "User".into(),
                    email: format!("{}@example.com", UserId::new()),
                    password_hash: "x".into(),
                    avatar: String::new(),
                    is_admin: false,
                    is_owner: false,
                },
                Utc::now(),
            )
            .unwrap()
            .id
    }

    async fn is_online(db: &SharedDatabase, user: UserId) -> bool {
        db.lock().await.get_user(user).unwrap().is_online
    }

    #[tokio::test]
    async fn test_offline_only_after_last_connection() {
        let f = fixture();
        let user = create_user(&f.db).await;

        let mut conns = Vec::new();
        for _ in 0..3 {
            let (conn, rx) = f.registry.register().await;
            assert!(f.presence.join(conn, user).await);
            conns.push((conn, rx));
        }
        assert!(is_online(&f.db, user).await);

        let (last, _) = conns.pop().unwrap();
        for (conn, _) in conns.drain(..) {
            f.presence.disconnect(conn).await;
            assert!(is_online(&f.db, user).await);
        }

        f.clock.advance(Duration::minutes(10));
        let disconnected_at = f.clock.now();
        f.presence.disconnect(last).await;

        let stored = f.db.lock().await.get_user(user).unwrap();
        assert!(!stored.is_online);
        assert!(stored.last_seen >= disconnected_at - Duration::microseconds(1));
    }

    #[tokio::test]
    async fn test_join_and_leave_are_announced() {
        let f = fixture();
        let user = create_user(&f.db).await;
        let (_watcher, mut watcher_rx) = f.registry.register().await;

        let (conn, _rx) = f.registry.register().await;
        f.presence.join(conn, user).await;
        assert_eq!(watcher_rx.try_recv().unwrap(), ServerEvent::UserOnline(user));

        f.presence.disconnect(conn).await;
        assert_eq!(watcher_rx.try_recv().unwrap(), ServerEvent::UserOffline(user));
    }

    #[tokio::test]
    async fn test_second_tab_does_not_announce_offline() {
        let f = fixture();
        let user = create_user(&f.db).await;
        let (_watcher, mut watcher_rx) = f.registry.register().await;

        let (a, _rx_a) = f.registry.register().await;
        let (b, _rx_b) = f.registry.register().await;
        f.presence.join(a, user).await;
        f.presence.join(b, user).await;
        f.presence.disconnect(a).await;

        assert_eq!(watcher_rx.try_recv().unwrap(), ServerEvent::UserOnline(user));
        assert_eq!(watcher_rx.try_recv().unwrap(), ServerEvent::UserOnline(user));
        assert!(watcher_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unbound_disconnect_is_noop() {
        let f = fixture();
        let (_watcher, mut watcher_rx) = f.registry.register().await;
        let (conn, _rx) = f.registry.register().await;

        f.presence.disconnect(conn).await;
        assert!(watcher_rx.try_recv().is_err());
        assert_eq!(f.registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_store_errors_do_not_break_presence() {
        let f = fixture();
        let user = create_user(&f.db).await;
        f.db.lock()
            .await
            .conn()
            .execute_batch("ALTER TABLE users RENAME TO users_archived")
            .unwrap();
        assert!(f.db.lock().await.mark_online(user).is_err());

        let (_watcher, mut watcher_rx) = f.registry.register().await;
        let (conn, _rx) = f.registry.register().await;

        assert!(f.presence.join(conn, user).await);
        assert!(f.registry.is_online(user).await);
        assert_eq!(watcher_rx.try_recv().unwrap(), ServerEvent::UserOnline(user));

        f.presence.disconnect(conn).await;
        assert!(!f.registry.is_online(user).await);
        assert_eq!(f.registry.connection_count().await, 1);
        assert_eq!(watcher_rx.try_recv().unwrap(), ServerEvent::UserOffline(user));
    }

    #[tokio::test]
    async fn test_rejoin_while_offline_write_waits_keeps_user_online() {
        let f = fixture();
        let user = create_user(&f.db).await;
        let (_watcher, mut watcher_rx) = f.registry.register().await;
        let (a, _rx_a) = f.registry.register().await;
        let (b, _rx_b) = f.registry.register().await;

        f.presence.join(a, user).await;
        assert_eq!(watcher_rx.try_recv().unwrap(), ServerEvent::UserOnline(user));
        assert!(f.registry.unregister(a).await.unwrap().was_last());

        // The offline write queues behind the store lock while a new tab binds.
        let guard = f.db.lock().await;
        let presence = f.presence.clone();
        let pending = tokio::spawn(async move { presence.went_offline(user).await });
        tokio::task::yield_now().await;
        f.registry.bind(b, user).await;
        drop(guard);
        pending.await.unwrap();

        assert!(is_online(&f.db, user).await);
        assert!(watcher_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_evict_unbinds_every_tab() {
        let f = fixture();
        let user = create_user(&f.db).await;
        let (_watcher, mut watcher_rx) = f.registry.register().await;
        let (a, mut rx_a) = f.registry.register().await;
        let (b, mut rx_b) = f.registry.register().await;
        f.presence.join(a, user).await;
        f.presence.join(b, user).await;
        while watcher_rx.try_recv().is_ok() {}

        f.presence.evict(user, "Account banned").await;

        assert!(!f.registry.is_online(user).await);
        assert!(f.registry.user_of(a).await.is_none());
        assert_eq!(f.registry.connection_count().await, 3);
        assert!(!is_online(&f.db, user).await);
        assert_eq!(watcher_rx.try_recv().unwrap(), ServerEvent::UserOffline(user));
        for rx in [&mut rx_a, &mut rx_b] {
            let mut events = Vec::new();
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
            assert!(events.contains(&ServerEvent::error("Account banned")));
        }

        // Closing an evicted socket later announces nothing more.
        f.presence.disconnect(a).await;
        assert!(watcher_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_after_close_is_rejected() {
        let f = fixture();
        let user = create_user(&f.db).await;
        let (conn, _rx) = f.registry.register().await;
        f.presence.disconnect(conn).await;

        assert!(!f.presence.join(conn, user).await);
        assert!(!is_online(&f.db, user).await);
    }
}
