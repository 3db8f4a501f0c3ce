//! # socialbook-server
//!
//! Backend for the SocialBook social network.
//!
//! This binary provides:
//! - **REST API** (axum) for accounts, posts, direct and group messages,
//!   stories, friend requests, notifications and moderation
//! - **Realtime gateway** over WebSocket: presence, per-user and per-group
//!   event delivery, typing indicators and call signaling
//! - **Retention tasks** that prune expired group messages, direct messages
//!   and stories

mod api;
mod auth;
mod clock;
mod config;
mod error;
mod realtime;
mod retention;
mod state;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use socialbook_shared::SessionKeys;
use socialbook_store::Database;

use crate::clock::SystemClock;
use crate::config::ServerConfig;
use crate::retention::RetentionSweeper;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,socialbook_server=debug")),
        )
        .init();

    info!("Starting SocialBook server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store (runs migrations)
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;

    // No connection survives a restart, so nobody is online yet.
    let stale = db.reset_online_flags()?;
    if stale > 0 {
        info!(count = stale, "Cleared stale online flags");
    }

    // -----------------------------------------------------------------------
    // 4. Session signing key
    // -----------------------------------------------------------------------
    let sessions = match &config.session_signing_key {
        Some(secret) => SessionKeys::from_secret_bytes(secret, config.session_ttl),
        None => {
            warn!("SESSION_SIGNING_KEY not set; generated an ephemeral key, tokens will not survive a restart");
            SessionKeys::generate(config.session_ttl)
        }
    };

    // -----------------------------------------------------------------------
    // 5. Shared state and owner bootstrap
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let (initial_delay, sweep_interval, ttl_interval) =
        (config.sweep_initial_delay, config.sweep_interval, config.ttl_interval);

    let app_state = AppState::new(db, sessions, Arc::new(SystemClock), config);

    if let Some(owner) = api::bootstrap_owner(&app_state).await? {
        info!(user = %owner.id, email = %owner.email, "Bootstrapped owner account");
    }

    // -----------------------------------------------------------------------
    // 6. Spawn background tasks
    // -----------------------------------------------------------------------
    let retention = RetentionSweeper::new(app_state.db.clone(), app_state.clock.clone())
        .spawn(initial_delay, sweep_interval, ttl_interval);

    // -----------------------------------------------------------------------
    // 7. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "HTTP server failed");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    retention.abort();
    result
}
