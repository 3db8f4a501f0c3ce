use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use socialbook_shared::SessionKeys;
use socialbook_store::Database;

use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::realtime::{EventRouter, PresenceRegistry, PresenceTracker};

/// The one SQLite handle, shared by request handlers, presence and the
/// retention tasks. Never hold the guard across an `.await`.
pub type SharedDatabase = Arc<Mutex<Database>>;

/// Process-scoped services, created once in `main` and cloned into every
/// handler.
#[derive(Clone)]
pub struct AppState {
    pub db: SharedDatabase,
    pub sessions: Arc<SessionKeys>,
    pub registry: Arc<PresenceRegistry>,
    pub events: EventRouter,
    pub presence: PresenceTracker,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        db: Database,
        sessions: SessionKeys,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Self {
        let db: SharedDatabase = Arc::new(Mutex::new(db));
        let registry = Arc::new(PresenceRegistry::new(config.connection_buffer));
        let events = EventRouter::new(registry.clone());
        let presence = PresenceTracker::new(registry.clone(), events.clone(), db.clone(), clock.clone());

        Self {
            db,
            sessions: Arc::new(sessions),
            registry,
            events,
            presence,
            clock,
            config: Arc::new(config),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::SystemClock;

    /// Fresh in-memory state with a random signing key.
    pub(crate) fn test_state() -> AppState {
        test_state_with_clock(Arc::new(SystemClock))
    }

    pub(crate) fn test_state_with_clock(clock: Arc<dyn Clock>) -> AppState {
        let config = ServerConfig::default();
        AppState::new(
            Database::open_in_memory().unwrap(),
            SessionKeys::generate(config.session_ttl),
            clock,
            config,
        )
    }
}
