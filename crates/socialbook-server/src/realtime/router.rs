//! Addressed delivery of [`ServerEvent`]s: one user, one group room, one
//! connection, or everyone.
//!
//! Delivery is fire-and-forget. Each connection has a bounded queue; when it
//! is full or the connection is gone the event is dropped for that
//! connection only. Clients recover missed state by fetching over REST.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use socialbook_shared::{ConnectionId, GroupId, UserId};

use super::events::ServerEvent;
use super::registry::{EventSender, PresenceRegistry};

#[derive(Clone)]
pub struct EventRouter {
    registry: Arc<PresenceRegistry>,
}

impl EventRouter {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver to every connection bound to `user`. Returns how many
    /// connections accepted the event.
    pub async fn to_user(&self, user: UserId, event: ServerEvent) -> usize {
        let targets = self.registry.senders_for_user(user).await;
        deliver(&targets, &event)
    }

    pub async fn to_users(&self, users: &[UserId], event: ServerEvent) -> usize {
        let mut delivered = 0;
        for user in users {
            delivered += self.to_user(*user, event.clone()).await;
        }
        delivered
    }

    /// Deliver to every connection subscribed to `group`'s room.
    pub async fn to_group(&self, group: GroupId, event: ServerEvent) -> usize {
        let targets = self.registry.senders_for_group(group).await;
        deliver(&targets, &event)
    }

    pub async fn to_connection(&self, id: ConnectionId, event: ServerEvent) -> usize {
        match self.registry.sender_for_connection(id).await {
            Some(tx) => deliver(&[(id, tx)], &event),
            None => 0,
        }
    }

    /// Deliver to every open connection.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let targets = self.registry.all_senders().await;
        deliver(&targets, &event)
    }
}

fn deliver(targets: &[(ConnectionId, EventSender)], event: &ServerEvent) -> usize {
    let mut delivered = 0;
    for (id, tx) in targets {
        match tx.try_send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                debug!(connection = %id, event = event.name(), "Dropping event for slow connection");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %id, event = event.name(), "Dropping event for closed connection");
            }
        }
    }
    delivered
}
