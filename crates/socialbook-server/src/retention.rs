//! Background deletion of expired ephemeral data.
//!
//! Two independent schedules share one [`RetentionSweeper`]:
//! - the group sweep removes group messages older than the retention
//!   window, first after a short startup delay and then on a long interval;
//! - the TTL monitor physically deletes direct messages and stories whose
//!   `expires_at` has passed. Reads already hide those records, so this
//!   only reclaims space.
//!
//! Both call plain methods that can be driven directly with a controlled
//! clock. Failures are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use socialbook_store::groups::retention_cutoff;
use socialbook_store::StoreError;

use crate::clock::Clock;
use crate::state::SharedDatabase;

#[derive(Clone)]
pub struct RetentionSweeper {
    db: SharedDatabase,
    clock: Arc<dyn Clock>,
}

/// Counts from one TTL monitor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expired {
    pub messages: usize,
    pub stories: usize,
}

impl RetentionSweeper {
    pub fn new(db: SharedDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Delete every group message created before `now - 48h`, across all
    /// groups. Idempotent.
    pub async fn sweep_group_messages(&self) -> Result<usize, StoreError> {
        let cutoff = retention_cutoff(self.clock.now());
        let removed = self.db.lock().await.prune_group_messages_before(cutoff)?;
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Swept expired group messages");
        } else {
            debug!(cutoff = %cutoff, "Group sweep found nothing to remove");
        }
        Ok(removed)
    }

    /// Delete direct messages and stories past their `expires_at`.
    pub async fn expire_ttl_records(&self) -> Result<Expired, StoreError> {
        let now = self.clock.now();
        let expired = {
            let db = self.db.lock().await;
            Expired {
                messages: db.purge_expired_messages(now)?,
                stories: db.purge_expired_stories(now)?,
            }
        };
        if expired != Expired::default() {
            info!(
                messages = expired.messages,
                stories = expired.stories,
                "Purged expired records"
            );
        }
        Ok(expired)
    }

    /// Start both schedules on the current runtime.
    pub fn spawn(
        self,
        initial_delay: Duration,
        sweep_interval: Duration,
        ttl_interval: Duration,
    ) -> RetentionTasks {
        let sweeper = self.clone();
        let group_sweep = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + initial_delay, sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = sweeper.sweep_group_messages().await {
                    warn!(error = %e, "Group message sweep failed");
                }
            }
        });

        let ttl_monitor = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ttl_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.expire_ttl_records().await {
                    warn!(error = %e, "TTL monitor pass failed");
                }
            }
        });

        info!(
            initial_delay_secs = initial_delay.as_secs(),
            sweep_interval_secs = sweep_interval.as_secs(),
            ttl_interval_secs = ttl_interval.as_secs(),
            "Retention tasks started"
        );

        RetentionTasks {
            group_sweep,
            ttl_monitor,
        }
    }
}

pub struct RetentionTasks {
    group_sweep: JoinHandle<()>,
    ttl_monitor: JoinHandle<()>,
}

impl RetentionTasks {
    pub fn abort(&self) {
        self.group_sweep.abort();
        self.ttl_monitor.abort();
    }
}
